//! The generational loop. A population of genomes is
//! grouped into species, evaluated through the
//! [`TaskScheduler`], and replaced by offspring of the
//! best performers of each species.
mod checkpoint;
mod config;
pub mod logging;
mod offspring;
mod species;

pub use checkpoint::{Checkpoint, CheckpointError};
pub use config::EvolutionConfig;
pub use offspring::Operation;
pub use species::{Species, SpeciesID};

use crate::evaluation::{Evaluate, Fitness, WORST_FITNESS};
use crate::genomics::{GeneticConfig, Genome, InnovationRegistry};
use crate::scheduler::{make_batch, Granularity, TaskScheduler};
use crate::{ConfigurationError, Error, GenomeId, Result, SeededRng};
use logging::{EvolutionLogger, GenerationStats, SpeciesStats, Stats};
use offspring::OffspringFactory;
use species::fitness_of;

use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

/// A population evolving generation by generation.
///
/// All randomness is drawn from a chain of generation
/// seeds started from the run's master seed, so two cycles
/// built with the same configuration and seed, evaluated
/// by a deterministic evaluator, evolve identically
/// regardless of the number of scheduler workers.
#[derive(Clone, Debug)]
pub struct EvolutionCycle {
    config: EvolutionConfig,
    genetic_config: GeneticConfig,
    registry: InnovationRegistry,
    genomes: Vec<Genome>,
    species: Vec<Species>,
    generation: usize,
    master_seed: u64,
    generation_seed: u64,
    next_genome_id: GenomeId,
    historical_species_count: usize,
    champion: Option<Genome>,
}

impl EvolutionCycle {
    /// Creates the initial population: every genome is
    /// the canonical minimal structure (every input
    /// connected to every output) with random parameters.
    ///
    /// # Errors
    /// Returns an error if either configuration is invalid.
    pub fn new(
        config: EvolutionConfig,
        genetic_config: GeneticConfig,
        master_seed: u64,
    ) -> std::result::Result<EvolutionCycle, ConfigurationError> {
        config.validate()?;
        genetic_config.validate()?;

        let mut registry = InnovationRegistry::new();
        let templates = registry.initialize_innovations(
            config.population_size,
            genetic_config.input_count,
            genetic_config.output_count,
            genetic_config.feature_selection,
            genetic_config.extra_features,
        )?;
        let mut rng = SeededRng::seed_from_u64(master_seed);
        let genomes = templates
            .iter()
            .map(|template| Genome::from_template(template, template.id(), &mut rng))
            .collect();

        Ok(EvolutionCycle {
            next_genome_id: config.population_size,
            config,
            genetic_config,
            registry,
            genomes,
            species: Vec::new(),
            generation: 0,
            master_seed,
            generation_seed: rng.gen(),
            historical_species_count: 0,
            champion: None,
        })
    }

    /// Rebuilds a cycle from a checkpoint. The configurations
    /// are supplied anew, so tunable knobs may change between
    /// runs; the population size may not.
    ///
    /// # Errors
    /// Returns an error if either configuration is invalid,
    /// the checkpoint's population does not match the configured
    /// size, or one of its genomes is malformed.
    pub fn resume(
        checkpoint: Checkpoint,
        config: EvolutionConfig,
        genetic_config: GeneticConfig,
    ) -> Result<EvolutionCycle> {
        config.validate()?;
        genetic_config.validate()?;
        if checkpoint.population.len() != config.population_size {
            return Err(ConfigurationError::invalid(
                "population_size",
                format!(
                    "checkpoint holds {} genomes, configured for {}",
                    checkpoint.population.len(),
                    config.population_size
                ),
            )
            .into());
        }
        for genome in &checkpoint.population {
            genome.validate()?;
        }
        info!(generation = checkpoint.generation, "resuming from checkpoint");

        Ok(EvolutionCycle {
            config,
            genetic_config,
            registry: checkpoint.registry,
            genomes: checkpoint.population,
            species: checkpoint.species,
            generation: checkpoint.generation,
            master_seed: checkpoint.master_seed,
            generation_seed: checkpoint.generation_seed,
            next_genome_id: checkpoint.next_genome_id,
            historical_species_count: checkpoint.historical_species_count,
            champion: checkpoint.champion,
        })
    }

    /// Captures the state needed to resume at the
    /// current generation.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            generation: self.generation,
            master_seed: self.master_seed,
            generation_seed: self.generation_seed,
            next_genome_id: self.next_genome_id,
            historical_species_count: self.historical_species_count,
            population: self.genomes.clone(),
            species: self.species.iter().map(Species::emptied).collect(),
            registry: self.registry.clone(),
            champion: self.champion.clone(),
        }
    }

    /// Whether the configured number of generations
    /// has been evolved.
    pub fn is_done(&self) -> bool {
        self.generation >= self.config.generations
    }

    /// Evaluates the current generation and replaces it
    /// with its offspring.
    ///
    /// Tasks that fail leave their genome with the worst
    /// fitness; the generation still completes.
    ///
    /// # Errors
    /// Returns an error if evolution is already finished,
    /// or the scheduler fails as a whole.
    pub fn evolve<E: Evaluate + ?Sized>(
        &mut self,
        scheduler: &TaskScheduler,
        evaluator: &E,
    ) -> Result<GenerationStats> {
        if self.is_done() {
            return Err(Error::EvolutionFinished(self.generation));
        }
        let mut rng = SeededRng::seed_from_u64(self.generation_seed);
        let next_generation_seed: u64 = rng.gen();
        let evaluation_seed: u64 = rng.gen();

        let failed_tasks = self.evaluate(scheduler, evaluator, evaluation_seed)?;
        self.speciate();
        for species in &mut self.species {
            species.rank(&self.genomes);
        }
        let champion = self.champion_index();
        self.champion = Some(self.genomes[champion].clone());
        let stats = self.statistics(champion, failed_tasks);

        let allotted = self.allot_offspring(champion);
        let (offspring, next_genome_id) = OffspringFactory::new(
            &self.genomes,
            &self.species,
            champion,
            &mut self.registry,
            &self.genetic_config,
            &self.config,
            &mut rng,
            self.next_genome_id,
        )
        .generate_offspring(&allotted);

        let mut allotted = allotted.into_iter();
        self.species.retain(|_| allotted.next().unwrap_or(0) > 0);
        self.genomes = offspring;
        self.next_genome_id = next_genome_id;
        self.generation_seed = next_generation_seed;
        self.generation += 1;

        info!(
            generation = stats.generation,
            best = stats.fitness.best,
            mean = stats.fitness.mean,
            species = stats.species.len(),
            "generation evolved"
        );
        Ok(stats)
    }

    /// Evolves until done, logging every generation.
    /// Returns the final champion.
    pub fn run<E: Evaluate + ?Sized>(
        &mut self,
        scheduler: &TaskScheduler,
        evaluator: &E,
        logger: &mut EvolutionLogger,
    ) -> Result<Option<&Genome>> {
        while !self.is_done() {
            let stats = self.evolve(scheduler, evaluator)?;
            logger.log(self, &stats);
        }
        Ok(self.champion.as_ref())
    }

    /// Submits every genome to the scheduler and assigns the
    /// merged fitness. Returns the number of failed tasks.
    fn evaluate<E: Evaluate + ?Sized>(
        &mut self,
        scheduler: &TaskScheduler,
        evaluator: &E,
        evaluation_seed: u64,
    ) -> Result<usize> {
        let samples = self.config.samples_per_genome;
        let tasks_per_genome = match self.config.granularity {
            Granularity::PerGenome => 1,
            Granularity::PerSample => samples,
        };

        let mut per_genome: Vec<Vec<(Fitness, usize)>> = vec![Vec::new(); self.genomes.len()];
        let mut failed_tasks = 0;
        {
            let batch = make_batch(&self.genomes, samples, self.config.granularity, evaluation_seed);
            for outcome in scheduler.submit(&batch, evaluator)? {
                match outcome {
                    Ok(result) => {
                        for (sample, failure) in result.failed_samples() {
                            debug!(genome = result.genome_id(), sample, %failure, "trial failed");
                        }
                        per_genome[result.task_id() / tasks_per_genome]
                            .push((result.fitness().clone(), result.successes()));
                    }
                    Err(_) => failed_tasks += 1,
                }
            }
        }

        for (genome, results) in self.genomes.iter_mut().zip(per_genome) {
            let fitness = Fitness::weighted_mean(results.iter().map(|(f, w)| (f, *w)))
                .unwrap_or(Fitness::Scalar(WORST_FITNESS));
            genome.set_fitness(fitness)?;
        }
        if failed_tasks > 0 {
            warn!(failed_tasks, generation = self.generation, "tasks scored as worst fitness");
        }
        Ok(failed_tasks)
    }

    /// Assigns every genome to the first species whose
    /// representative is within the compatibility threshold,
    /// founding new species as needed. Species left without
    /// members go extinct.
    fn speciate(&mut self) {
        let mut species: Vec<Species> = self.species.iter().map(Species::emptied).collect();
        let mut new_species_count = 0;
        for (index, genome) in self.genomes.iter().enumerate() {
            let compatible = species.iter_mut().find(|s| {
                s.compatibility_distance(genome, &self.genetic_config)
                    < self.config.compatibility_threshold
            });
            match compatible {
                Some(s) => s.add_member(index),
                None => {
                    let mut founded = Species::new(
                        SpeciesID(self.historical_species_count, new_species_count),
                        genome.clone(),
                    );
                    founded.add_member(index);
                    species.push(founded);
                    new_species_count += 1;
                }
            }
        }
        if new_species_count > 0 {
            self.historical_species_count += 1;
        }
        species.retain(|s| !s.is_empty());
        self.species = species;
    }

    /// Population index of the best genome, the first one on ties.
    fn champion_index(&self) -> usize {
        let mut best = 0;
        for (index, genome) in self.genomes.iter().enumerate() {
            if fitness_of(genome) > fitness_of(&self.genomes[best]) {
                best = index;
            }
        }
        best
    }

    fn statistics(&self, champion: usize, failed_tasks: usize) -> GenerationStats {
        let empty = Stats {
            best: WORST_FITNESS,
            worst: WORST_FITNESS,
            mean: WORST_FITNESS,
            median: WORST_FITNESS,
        };
        GenerationStats {
            generation: self.generation,
            fitness: Stats::from(self.genomes.iter().map(fitness_of)).unwrap_or(empty),
            champion: self.genomes[champion].id(),
            species: self
                .species
                .iter()
                .map(|s| SpeciesStats {
                    id: s.id(),
                    size: s.len(),
                    fitness: Stats::from(s.members().iter().map(|&i| fitness_of(&self.genomes[i])))
                        .unwrap_or(empty),
                    champion: s.representative().id(),
                    time_stagnated: s.time_stagnated(),
                })
                .collect(),
            failed_tasks,
        }
    }

    /// Allot the number of offspring for each species,
    /// proportional to mean member fitness and stagnation
    /// status, summing to the population size. The
    /// champion's species always gets at least one.
    /// Without any positive adjusted fitness, offspring
    /// are allotted in proportion to species sizes.
    fn allot_offspring(&self, champion: usize) -> Vec<usize> {
        let size = self.config.population_size;
        let fitnesses: Vec<f32> = self
            .species
            .iter()
            .map(|s| {
                let fitness = s.mean_fitness(&self.genomes).max(0.0);
                if s.is_stagnated(&self.config) {
                    fitness * (1.0 - self.config.stagnation_penalty)
                } else {
                    fitness
                }
            })
            .collect();
        let fitness_sum: f32 = fitnesses.iter().sum();
        let shares: Vec<f32> = if fitness_sum > 0.0 && fitness_sum.is_finite() {
            fitnesses
                .iter()
                .map(|f| f / fitness_sum * size as f32)
                .collect()
        } else {
            debug!(
                species = self.species.len(),
                "no species has positive adjusted fitness, allotting by size"
            );
            self.species.iter().map(|s| s.len() as f32).collect()
        };

        let mut allotted = round_retain_sum(&shares);
        let mut total: usize = allotted.iter().sum();
        while total != size {
            let largest = argmax(&allotted);
            if total > size {
                allotted[largest] -= 1;
                total -= 1;
            } else {
                allotted[argmax_f32(&shares)] += 1;
                total += 1;
            }
        }

        if let Some(home) = self
            .species
            .iter()
            .position(|s| s.members().first() == Some(&champion))
        {
            if allotted[home] == 0 {
                let largest = argmax(&allotted);
                allotted[largest] -= 1;
                allotted[home] += 1;
            }
        }
        allotted
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The genomes of the current (not yet evaluated) generation.
    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    /// The species of the last evaluated generation. Member
    /// indices refer to that generation's population.
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// The best genome of the last evaluated generation.
    pub fn champion(&self) -> Option<&Genome> {
        self.champion.as_ref()
    }

    pub fn registry(&self) -> &InnovationRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn genetic_config(&self) -> &GeneticConfig {
        &self.genetic_config
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }
}

fn argmax(values: &[usize]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn argmax_f32(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Rounds all values to positive whole numbers
/// while preserving their order and sum, assuming it is also whole.
/// Rounding is done in the manner that minimizes
/// the average error to the original set of values.
fn round_retain_sum(values: &[f32]) -> Vec<usize> {
    let total_sum = values.iter().sum::<f32>().round() as usize;
    let mut truncated: Vec<(usize, usize, f32)> = values
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let u = f.floor();
            let e = f - u;
            (i, u as usize, e)
        })
        .collect();
    let truncated_sum: usize = truncated.iter().map(|(_, u, _)| *u).sum();
    let remainder = total_sum.saturating_sub(truncated_sum).min(truncated.len());
    // Sort in decreasing order of error
    truncated.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    for (_, u, _) in &mut truncated[..remainder] {
        *u += 1;
    }
    truncated.sort_by_key(|(i, ..)| *i);
    truncated.iter().map(|(_, u, _)| *u).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::add_node;

    #[test]
    fn round_retain_sum() {
        let v = [5.2, 9.5, 2.8, 1.3, 2.2, 2.7, 6.3, 1.0000001, 0.9999999];
        let w = super::round_retain_sum(&v);
        assert_eq!(w.iter().sum::<usize>(), 32);
        assert_eq!(w, [5, 10, 3, 1, 2, 3, 6, 1, 1]);
    }

    fn genetic_config() -> GeneticConfig {
        GeneticConfig {
            input_count: 2,
            output_count: 1,
            weight_bound: 2.0,
            weight_mutation_power: 0.5,
            weight_mutation_proportion: 1.0,
            excess_gene_factor: 1.0,
            disjoint_gene_factor: 1.0,
            common_weight_factor: 0.4,
            ..GeneticConfig::zero()
        }
    }

    fn config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 12,
            generations: 4,
            samples_per_genome: 2,
            weight_mutation_rate: 0.6,
            add_node_rate: 0.2,
            add_link_rate: 0.1,
            crossover_rate: 0.1,
            compatibility_threshold: 1.0,
            truncation_fraction: 0.5,
            elitism: 1,
            ..EvolutionConfig::zero()
        }
    }

    #[test]
    fn initial_population() {
        let cycle = EvolutionCycle::new(config(), genetic_config(), 9).unwrap();
        assert_eq!(cycle.generation(), 0);
        assert_eq!(cycle.genomes().len(), 12);
        for (i, genome) in cycle.genomes().iter().enumerate() {
            assert_eq!(genome.id(), i);
            // Two inputs, bias, one output, two links.
            assert_eq!(genome.len(), 6);
            assert!(genome.fitness().is_none());
        }
        assert!(cycle.champion().is_none());
    }

    #[test]
    fn invalid_configuration_rejected() {
        let config = EvolutionConfig {
            crossover_rate: 0.9,
            ..config()
        };
        assert!(matches!(
            EvolutionCycle::new(config, genetic_config(), 0),
            Err(ConfigurationError::OperationRates(_))
        ));
    }

    #[test]
    fn speciation_partitions_population() {
        let mut cycle = EvolutionCycle::new(config(), genetic_config(), 5).unwrap();
        cycle.speciate();
        let mut members: Vec<usize> = cycle.species().iter().flat_map(|s| s.members().to_vec()).collect();
        members.sort_unstable();
        assert_eq!(members, (0..12).collect::<Vec<_>>());
        assert!(cycle.species().iter().all(|s| s.id().0 == 0));
    }

    #[test]
    fn allotment_sums_to_population_size() {
        let mut cycle = EvolutionCycle::new(
            EvolutionConfig {
                compatibility_threshold: 0.0,
                ..config()
            },
            genetic_config(),
            5,
        )
        .unwrap();
        // A zero threshold puts every genome in its own species.
        cycle.speciate();
        assert_eq!(cycle.species().len(), 12);
        for (i, genome) in cycle.genomes.iter_mut().enumerate() {
            genome.set_fitness(Fitness::Scalar(i as f32)).unwrap();
        }
        for species in &mut cycle.species {
            species.rank(&cycle.genomes);
        }
        let champion = cycle.champion_index();
        assert_eq!(champion, 11);
        let allotted = cycle.allot_offspring(champion);
        assert_eq!(allotted.iter().sum::<usize>(), 12);
        assert_eq!(allotted[0], 0);
        assert!(allotted[11] >= 1);
    }

    #[test]
    fn partition_depends_on_gene_factors() {
        let species_count = |factor: f32| {
            let mut cycle = EvolutionCycle::new(
                EvolutionConfig {
                    compatibility_threshold: 3.0,
                    ..config()
                },
                GeneticConfig {
                    excess_gene_factor: factor,
                    disjoint_gene_factor: factor,
                    ..genetic_config()
                },
                3,
            )
            .unwrap();
            let base = cycle.genomes[0].clone();
            let grown = add_node(&base, &mut cycle.registry, &mut SeededRng::seed_from_u64(1)).unwrap();
            // Three unmatched genes out of nine, equal common weights.
            cycle.genomes = vec![base.clone(), grown, base];
            cycle.speciate();
            cycle.species().len()
        };
        assert_eq!(species_count(1.0), 1);
        assert_eq!(species_count(40.0), 2);
    }

    #[test]
    fn fully_penalized_species_allotted_by_size() {
        let mut cycle = EvolutionCycle::new(
            EvolutionConfig {
                compatibility_threshold: 0.0,
                stagnation_threshold: 1,
                stagnation_penalty: 1.0,
                ..config()
            },
            genetic_config(),
            5,
        )
        .unwrap();
        cycle.speciate();
        for (i, genome) in cycle.genomes.iter_mut().enumerate() {
            genome.set_fitness(Fitness::Scalar(i as f32)).unwrap();
        }
        for _ in 0..2 {
            for species in &mut cycle.species {
                species.rank(&cycle.genomes);
            }
        }
        assert!(cycle.species().iter().all(|s| s.is_stagnated(cycle.config())));
        let allotted = cycle.allot_offspring(cycle.champion_index());
        assert_eq!(allotted, vec![1; 12]);
    }
}
