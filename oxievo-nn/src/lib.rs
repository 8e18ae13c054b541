//! # OxiEvo-NN
//! Neural-network controllers for the `oxievo` crate.
//!
//! Provides a [`NetworkDecoder`] implementing `oxievo`'s
//! `ControllerDecoder`, turning genomes into [`Network`]s:
//! arbitrarily-structured recurrent networks with steepened
//! sigmoid neurons, in a discrete-time or a continuous-time
//! variant.
//!
//! [`Network`]: crate::networks::Network
//!
//! # Example usage: decoding a mutated genome
//! ```
//! use oxievo::evaluation::{Controller, ControllerDecoder};
//! use oxievo::genomics::{add_link, GeneticConfig, Genome, InnovationRegistry};
//! use oxievo::SeededRng;
//! use oxievo_nn::{NetworkDecoder, NetworkKind};
//! use rand::SeedableRng;
//!
//! let config = GeneticConfig {
//!     input_count: 2,
//!     output_count: 1,
//!     weight_bound: 1.0,
//!     ..GeneticConfig::zero()
//! };
//! let mut registry = InnovationRegistry::new();
//! let mut rng = SeededRng::seed_from_u64(0);
//! let templates = registry.initialize_innovations(1, 2, 1, false, 0).unwrap();
//! let genome = Genome::from_template(&templates[0], 0, &mut rng);
//! let genome = add_link(&genome, &mut registry, &config, &mut rng).unwrap();
//!
//! let decoder = NetworkDecoder::new(NetworkKind::Continuous { time_step: 0.1 });
//! let mut network = decoder.decode(&genome).unwrap();
//! let outputs = network.act(&[0.5, -0.5]);
//! assert_eq!(outputs.len(), 1);
//! assert!((0.0..=1.0).contains(&outputs[0]));
//! ```

mod decoder;
pub mod networks;

pub use decoder::{DecodeError, NetworkDecoder};
pub use networks::{Network, NetworkKind};
