//! NeuroEvolution of Augmenting Topologies for simulated robots.
//!
//! A population of [`Genome`]s is repeatedly decoded into controllers,
//! evaluated by running them inside a deterministic, single-threaded
//! [`SimulationEngine`], and evolved through selection, mutation and
//! crossover aligned by historical innovation numbers.
//!
//! The pieces, leaf first:
//! - [`genomics`]: genes, genomes, the [`InnovationRegistry`] and the
//!   mutation/crossover operators.
//! - [`simulation`]: the per-step simulation engine and the traits an
//!   environment plugin implements.
//! - [`evaluation`]: controller decoding and multi-trial fitness evaluation.
//! - [`scheduler`]: a bounded worker pool running a whole generation's
//!   evaluations.
//! - [`populations`]: the generational [`EvolutionCycle`], speciation,
//!   statistics and checkpoints.
//!
//! A neural-network controller decoder is supplied by the `oxievo-nn` crate.
//!
//! # Example usage: a dummy evaluation
//! ```
//! use oxievo::evaluation::{Evaluate, Fitness};
//! use oxievo::genomics::{GeneticConfig, Genome};
//! use oxievo::populations::{EvolutionConfig, EvolutionCycle};
//! use oxievo::scheduler::{SchedulerConfig, TaskScheduler};
//! use oxievo::TrialFailure;
//!
//! // Rewards genomes with many genes; a real evaluator runs simulations.
//! struct GeneCount;
//!
//! impl Evaluate for GeneCount {
//!     fn evaluate_sample(&self, genome: &Genome, _: usize, _: u64) -> Result<Fitness, TrialFailure> {
//!         Ok(Fitness::Scalar(genome.len() as f32))
//!     }
//! }
//!
//! let genetic_config = GeneticConfig {
//!     input_count: 2,
//!     output_count: 1,
//!     weight_bound: 5.0,
//!     weight_mutation_power: 0.5,
//!     weight_reset_chance: 0.1,
//!     weight_mutation_proportion: 1.0,
//!     excess_gene_factor: 1.0,
//!     disjoint_gene_factor: 1.0,
//!     common_weight_factor: 0.4,
//!     ..GeneticConfig::zero()
//! };
//! let config = EvolutionConfig {
//!     population_size: 20,
//!     generations: 3,
//!     samples_per_genome: 1,
//!     weight_mutation_rate: 0.7,
//!     add_node_rate: 0.1,
//!     add_link_rate: 0.1,
//!     crossover_rate: 0.1,
//!     compatibility_threshold: 3.0,
//!     truncation_fraction: 0.2,
//!     ..EvolutionConfig::zero()
//! };
//!
//! let scheduler = TaskScheduler::new(SchedulerConfig { workers: 2, fatal_task_failures: false }).unwrap();
//! let mut cycle = EvolutionCycle::new(config, genetic_config, 42).unwrap();
//! while !cycle.is_done() {
//!     let stats = cycle.evolve(&scheduler, &GeneCount).unwrap();
//!     println!("{}", stats);
//! }
//! ```

mod errors;
pub mod evaluation;
pub mod genomics;
pub mod populations;
pub mod scheduler;
pub mod simulation;

pub use errors::{ConfigurationError, Error, Result, TrialFailure};
pub use evaluation::{Evaluate, Evaluator, Fitness};
pub use genomics::{Gene, Genome, InnovationRegistry};
pub use populations::EvolutionCycle;
pub use scheduler::{TaskResult, TaskScheduler};
pub use simulation::SimulationEngine;

/// Identifier type used to designate historically
/// identical mutations for the purposes of
/// genome comparison and genetic tracking.
pub type Innovation = usize;

/// Node identifier. A node's id is the innovation
/// number of the node gene that introduced it.
pub type NodeId = Innovation;

/// Genome identifier, unique within a run.
pub type GenomeId = usize;

/// The seedable random source used everywhere
/// reproducibility matters.
pub type SeededRng = rand_chacha::ChaCha8Rng;
