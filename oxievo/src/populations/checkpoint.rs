use super::Species;
use crate::genomics::{Genome, InnovationRegistry};
use crate::GenomeId;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::Path;

/// Failure to write or read a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed checkpoint: {0}")]
    Format(#[from] ron::Error),
}

/// Everything needed to resume a run at the start
/// of a generation.
///
/// Species members are not stored; the population
/// is re-speciated against the stored representatives.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub generation: usize,
    pub master_seed: u64,
    /// Seed of the generation about to be evaluated.
    pub generation_seed: u64,
    pub next_genome_id: GenomeId,
    pub historical_species_count: usize,
    pub population: Vec<Genome>,
    pub species: Vec<Species>,
    pub registry: InnovationRegistry,
    pub champion: Option<Genome>,
}

impl Checkpoint {
    /// Serializes the checkpoint as RON.
    pub fn to_ron(&self) -> Result<String, CheckpointError> {
        Ok(ron::ser::to_string_pretty(self, PrettyConfig::new())?)
    }

    pub fn from_ron(text: &str) -> Result<Checkpoint, CheckpointError> {
        Ok(ron::from_str(text)?)
    }

    /// Writes the checkpoint to `path`, replacing any previous file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Checkpoint, CheckpointError> {
        Checkpoint::from_ron(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_text_is_an_error() {
        assert!(matches!(
            Checkpoint::from_ron("Checkpoint(generation: \"three\")"),
            Err(CheckpointError::Format(_))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            Checkpoint::load("/nonexistent/oxievo/checkpoint.ron"),
            Err(CheckpointError::Io(_))
        ));
    }
}
