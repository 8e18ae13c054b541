use crate::genomics::{FitnessAlreadyAssigned, StructuralError};
use crate::populations::CheckpointError;
use crate::scheduler::SchedulerError;

use thiserror::Error;

/// Missing or invalid setup. Fatal: a run with
/// an invalid configuration never starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A required parameter was not given (or is zero).
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    /// A parameter is out of its valid range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// The offspring operation probabilities must add up to one.
    #[error("operation rates sum to {0}, expected 1.0")]
    OperationRates(f32),
    /// A simulation world was built without robots.
    #[error("simulation world has no robots")]
    NoRobots,
    /// No plugin was registered under the requested name.
    #[error("no plugin registered as `{0}`")]
    UnknownPlugin(String),
    /// Two plugins were registered under the same name.
    #[error("plugin `{0}` registered twice")]
    DuplicatePlugin(String),
}

impl ConfigurationError {
    pub(crate) fn invalid<S: Into<String>>(name: &'static str, reason: S) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// A single simulation trial that could not complete.
/// Recorded against the genome and sample that produced it;
/// never aborts a generation on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrialFailure {
    /// The genome could not be decoded into a controller.
    #[error("controller decoding failed: {0}")]
    Decode(String),
    /// A robot's controller step failed.
    #[error("controller of robot {robot} failed: {reason}")]
    Controller { robot: usize, reason: String },
    /// A robot's actuators could not be applied.
    #[error("actuators of robot {robot} failed: {reason}")]
    Actuator { robot: usize, reason: String },
    /// The environment could not be set up for this sample.
    #[error("environment failure: {0}")]
    Environment(String),
    /// The world handed to the engine was not wired up correctly.
    #[error("simulation wiring: {0}")]
    Wiring(#[from] ConfigurationError),
    /// The evaluation observer did not report a fitness.
    #[error("evaluation observer reported no fitness")]
    MissingFitness,
    /// The sample's fitness has a different shape than the others.
    #[error("fitness shape mismatch in sample {0}")]
    FitnessShape(usize),
}

/// Errors surfaced to the caller of an evolutionary run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),
    #[error("scheduler failure: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("fitness error: {0}")]
    Fitness(#[from] FitnessAlreadyAssigned),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("evolution finished after {0} generations")]
    EvolutionFinished(usize),
}

/// Result type alias for evolutionary runs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_names_failing_component() {
        let err: Error = ConfigurationError::MissingParameter("input_count").into();
        assert_eq!(
            err.to_string(),
            "configuration error: missing required parameter `input_count`"
        );
    }

    #[test]
    fn wiring_failure_wraps_configuration() {
        let failure: TrialFailure = ConfigurationError::NoRobots.into();
        assert_eq!(failure, TrialFailure::Wiring(ConfigurationError::NoRobots));
        assert!(failure.to_string().contains("no robots"));
    }
}
