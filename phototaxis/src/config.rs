use crate::arena::ArenaSettings;
use oxievo::genomics::GeneticConfig;
use oxievo::populations::logging::ReportingLevel;
use oxievo::populations::EvolutionConfig;
use oxievo::scheduler::SchedulerConfig;
use oxievo_nn::NetworkKind;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

/// Everything one experiment run needs, read from a RON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Registered name of the scenario to run.
    pub scenario: String,
    /// Master seed of the run.
    pub seed: u64,
    pub evolution: EvolutionConfig,
    /// Input and output counts are taken from the scenario.
    pub genetics: GeneticConfig,
    pub scheduler: SchedulerConfig,
    pub network: NetworkKind,
    /// Network activations per control step.
    pub passes: usize,
    /// Simulated seconds per step.
    pub time_delta: f64,
    pub arena: ArenaSettings,
    /// Where checkpoints are written and resumed from.
    pub checkpoint: Option<PathBuf>,
    /// Generations between checkpoints; zero writes only the last.
    pub checkpoint_every: usize,
    pub reporting_level: ReportingLevel,
}

impl ExperimentConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<ExperimentConfig> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}
