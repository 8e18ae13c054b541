use crate::ConfigurationError;

use serde::{Deserialize, Serialize};

/// Configuration data for genome generation
/// and inter-genome operations.
///
/// # Note
/// All quantities expressing probabilities
/// should be in the range [0.0, 1.0]; [`validate`]
/// rejects those that are not.
///
/// [`validate`]: GeneticConfig::validate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneticConfig {
    /// Number of inputs (sensors) in a genome.
    pub input_count: usize,
    /// Number of outputs (actuators) in a genome.
    pub output_count: usize,
    /// Whether genomes carry one feature gene per input
    /// scaling that input.
    pub feature_selection: bool,
    /// Additional feature genes beyond the inputs,
    /// only with feature selection.
    pub extra_features: usize,
    /// Maximum magnitude of a link's weight.
    pub weight_bound: f32,
    /// Magnitude of bound on weight perturbation uniform distribution.
    pub weight_mutation_power: f32,
    /// Chance of a selected weight being reset instead of perturbed.
    pub weight_reset_chance: f32,
    /// Fraction of link genes touched by one weight mutation.
    pub weight_mutation_proportion: f32,
    /// Whether weight mutation also mutates node decays
    /// (continuous-time networks).
    pub mutate_decays: bool,
    /// Magnitude of bound on decay perturbation. Decays stay in `[0, 1]`.
    pub decay_mutation_power: f32,
    /// Chance that a link disabled in either parent
    /// is re-enabled in the child.
    pub reenable_chance: f32,
    /// Whether link addition may connect a node to itself.
    pub allow_self_links: bool,
    /// Weight of excess genes in genetic distance.
    pub excess_gene_factor: f32,
    /// Weight of disjoint genes in genetic distance.
    pub disjoint_gene_factor: f32,
    /// Weight of the common gene weight average in genetic distance.
    pub common_weight_factor: f32,
}

impl GeneticConfig {
    /// Returns a "zero-valued" default configuration.
    ///
    /// # Note
    /// This value is not suitable for use in most experiments
    /// (it does not even pass validation, having no inputs).
    /// It is meant as a way to fill in unused values during
    /// configuration instantiation.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::GeneticConfig;
    ///
    /// let config = GeneticConfig {
    ///     input_count: 3,
    ///     output_count: 2,
    ///     ..GeneticConfig::zero()
    /// };
    /// assert!(config.validate().is_ok());
    /// ```
    pub const fn zero() -> GeneticConfig {
        GeneticConfig {
            input_count: 0,
            output_count: 0,
            feature_selection: false,
            extra_features: 0,
            weight_bound: 0.0,
            weight_mutation_power: 0.0,
            weight_reset_chance: 0.0,
            weight_mutation_proportion: 0.0,
            mutate_decays: false,
            decay_mutation_power: 0.0,
            reenable_chance: 0.0,
            allow_self_links: false,
            excess_gene_factor: 0.0,
            disjoint_gene_factor: 0.0,
            common_weight_factor: 0.0,
        }
    }

    /// Checks that every count is present and
    /// every chance is a probability.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.input_count == 0 {
            return Err(ConfigurationError::MissingParameter("input_count"));
        }
        if self.output_count == 0 {
            return Err(ConfigurationError::MissingParameter("output_count"));
        }
        if self.extra_features > 0 && !self.feature_selection {
            return Err(ConfigurationError::invalid(
                "extra_features",
                "extra features require feature selection",
            ));
        }
        for (name, chance) in [
            ("weight_reset_chance", self.weight_reset_chance),
            ("weight_mutation_proportion", self.weight_mutation_proportion),
            ("reenable_chance", self.reenable_chance),
        ] {
            if !(0.0..=1.0).contains(&chance) {
                return Err(ConfigurationError::invalid(
                    name,
                    format!("{} is not a probability", chance),
                ));
            }
        }
        for (name, value) in [
            ("weight_bound", self.weight_bound),
            ("weight_mutation_power", self.weight_mutation_power),
            ("decay_mutation_power", self.decay_mutation_power),
            ("excess_gene_factor", self.excess_gene_factor),
            ("disjoint_gene_factor", self.disjoint_gene_factor),
            ("common_weight_factor", self.common_weight_factor),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigurationError::invalid(
                    name,
                    format!("{} is not a non-negative number", value),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_missing_inputs() {
        assert_eq!(
            GeneticConfig::zero().validate(),
            Err(ConfigurationError::MissingParameter("input_count"))
        );
        assert_eq!(
            GeneticConfig {
                input_count: 1,
                ..GeneticConfig::zero()
            }
            .validate(),
            Err(ConfigurationError::MissingParameter("output_count"))
        );
    }

    #[test]
    fn rejects_bad_chances() {
        let config = GeneticConfig {
            input_count: 1,
            output_count: 1,
            reenable_chance: 1.5,
            ..GeneticConfig::zero()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidParameter {
                name: "reenable_chance",
                ..
            })
        ));
    }

    #[test]
    fn extra_features_need_selection() {
        let config = GeneticConfig {
            input_count: 1,
            output_count: 1,
            extra_features: 2,
            ..GeneticConfig::zero()
        };
        assert!(config.validate().is_err());
        assert!(GeneticConfig {
            feature_selection: true,
            ..config
        }
        .validate()
        .is_ok());
    }
}
