use crate::scheduler::Granularity;
use crate::ConfigurationError;

use serde::{Deserialize, Serialize};

/// Configuration data for population generation
/// and evolution.
///
/// # Note
/// All quantities expressing probabilities
/// should be in the range [0.0, 1.0]. The four
/// operation rates must add up to one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Size of the population.
    pub population_size: usize,
    /// Number of generations to evolve.
    pub generations: usize,
    /// Trials per genome and generation.
    pub samples_per_genome: usize,
    /// One scheduler task per genome, or per sample.
    pub granularity: Granularity,
    /// Chance an offspring is a weight mutation of its parent.
    pub weight_mutation_rate: f32,
    /// Chance an offspring is a node addition mutation of its parent.
    pub add_node_rate: f32,
    /// Chance an offspring is a link addition mutation of its parent.
    pub add_link_rate: f32,
    /// Chance an offspring is the crossover of two parents.
    pub crossover_rate: f32,
    /// Genetic distance threshold, at or beyond which
    /// genomes are considered as belonging to
    /// different species.
    pub compatibility_threshold: f32,
    /// Top % of each species which can participate
    /// in mating.
    pub truncation_fraction: f32,
    /// Top n of each species which is copied
    /// as-is to the next generation.
    pub elitism: usize,
    /// Chance that a crossover's second parent is
    /// taken from a different species.
    pub interspecies_mating_chance: f32,
    /// Number of generations without a fitness increase
    /// before a species is considered _stagnated_.
    /// Zero disables stagnation.
    pub stagnation_threshold: usize,
    /// Offspring allotment penalty for stagnation.
    /// Stagnated species will receive this percentage
    /// fewer offspring. If every species is stagnated and
    /// fully penalized, offspring are allotted by species
    /// size instead.
    pub stagnation_penalty: f32,
}

impl EvolutionConfig {
    /// Returns a "zero-valued" default configuration.
    ///
    /// # Note
    /// This value is not suitable for use in most experiments.
    /// It is meant as a way to abbreviate configuration
    /// instantiation, or to fill in unused values.
    ///
    /// # Examples
    /// ```
    /// use oxievo::populations::EvolutionConfig;
    ///
    /// let config = EvolutionConfig {
    ///     population_size: 50,
    ///     generations: 100,
    ///     samples_per_genome: 10,
    ///     weight_mutation_rate: 1.0,
    ///     ..EvolutionConfig::zero()
    /// };
    /// assert!(config.validate().is_ok());
    /// ```
    pub const fn zero() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 0,
            generations: 0,
            samples_per_genome: 0,
            granularity: Granularity::PerGenome,
            weight_mutation_rate: 0.0,
            add_node_rate: 0.0,
            add_link_rate: 0.0,
            crossover_rate: 0.0,
            compatibility_threshold: 0.0,
            truncation_fraction: 0.0,
            elitism: 0,
            interspecies_mating_chance: 0.0,
            stagnation_threshold: 0,
            stagnation_penalty: 0.0,
        }
    }

    /// Checks counts, probabilities and operation rates.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.population_size == 0 {
            return Err(ConfigurationError::MissingParameter("population_size"));
        }
        if self.samples_per_genome == 0 {
            return Err(ConfigurationError::MissingParameter("samples_per_genome"));
        }
        for (name, chance) in [
            ("weight_mutation_rate", self.weight_mutation_rate),
            ("add_node_rate", self.add_node_rate),
            ("add_link_rate", self.add_link_rate),
            ("crossover_rate", self.crossover_rate),
            ("truncation_fraction", self.truncation_fraction),
            ("interspecies_mating_chance", self.interspecies_mating_chance),
            ("stagnation_penalty", self.stagnation_penalty),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigurationError::invalid(
                    name,
                    format!("{} is not a probability", chance),
                ));
            }
        }
        let rates = self.operation_rates().iter().sum::<f32>();
        if (rates - 1.0).abs() > 1e-4 {
            return Err(ConfigurationError::OperationRates(rates));
        }
        if !(self.compatibility_threshold >= 0.0) {
            return Err(ConfigurationError::invalid(
                "compatibility_threshold",
                "must be non-negative",
            ));
        }
        Ok(())
    }

    /// Rates of weight mutation, node addition,
    /// link addition and crossover, in that order.
    pub(crate) fn operation_rates(&self) -> [f32; 4] {
        [
            self.weight_mutation_rate,
            self.add_node_rate,
            self.add_link_rate,
            self.crossover_rate,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 10,
            generations: 5,
            samples_per_genome: 1,
            weight_mutation_rate: 0.8,
            add_node_rate: 0.02,
            add_link_rate: 0.1,
            crossover_rate: 0.08,
            ..EvolutionConfig::zero()
        }
    }

    #[test]
    fn rates_must_sum_to_one() {
        assert!(valid().validate().is_ok());
        let config = EvolutionConfig {
            crossover_rate: 0.5,
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OperationRates(_))
        ));
    }

    #[test]
    fn missing_sizes() {
        let config = EvolutionConfig {
            population_size: 0,
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::MissingParameter("population_size"))
        );
        let config = EvolutionConfig {
            samples_per_genome: 0,
            ..valid()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::MissingParameter("samples_per_genome"))
        );
    }
}
