use super::{EvolutionCycle, SpeciesID};
use crate::genomics::Genome;
use crate::GenomeId;

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt;

/// Defines different possible reporting levels for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportingLevel {
    /// Clones species representatives (their last champions).
    SpeciesChampions,
    /// Clones only the population champion.
    PopulationChampion,
    /// Clones no genomes.
    NoGenomes,
}

/// A struct for reporting basic statistical data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub best: f32,
    pub worst: f32,
    pub mean: f32,
    pub median: f32,
}

impl Stats {
    /// Returns statistics about numbers in a sequence,
    /// or `None` if it is empty.
    ///
    /// # Examples
    /// ```
    /// use oxievo::populations::logging::Stats;
    ///
    /// let stats = Stats::from([-2.0, -1.0, 0.5, 1.0, 1.5, 3.0]).unwrap();
    /// assert_eq!(stats.best, 3.0);
    /// assert_eq!(stats.worst, -2.0);
    /// assert_eq!(stats.mean, 0.5);
    /// assert_eq!(stats.median, 0.75);
    /// ```
    pub fn from<I: IntoIterator<Item = f32>>(data: I) -> Option<Stats> {
        let mut data: Vec<f32> = data.into_iter().collect();
        if data.is_empty() {
            return None;
        }
        data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = data.len() / 2;
        let median = if data.len() % 2 == 0 {
            (data[mid - 1] + data[mid]) / 2.0
        } else {
            data[mid]
        };
        Some(Stats {
            best: data[data.len() - 1],
            worst: data[0],
            mean: data.iter().sum::<f32>() / data.len() as f32,
            median,
        })
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "best {:.4}, worst {:.4}, mean {:.4}, median {:.4}",
            self.best, self.worst, self.mean, self.median
        )
    }
}

/// Statistics of one species in one generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesStats {
    pub id: SpeciesID,
    pub size: usize,
    pub fitness: Stats,
    pub champion: GenomeId,
    pub time_stagnated: usize,
}

/// The summary of one evaluated generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub fitness: Stats,
    pub champion: GenomeId,
    pub species: Vec<SpeciesStats>,
    /// Tasks that produced no result and were scored as worst.
    pub failed_tasks: usize,
}

impl fmt::Display for GenerationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "generation {}: {} (champion {}, {} species, {} failed tasks)",
            self.generation,
            self.fitness,
            self.champion,
            self.species.len(),
            self.failed_tasks
        )?;
        for species in &self.species {
            writeln!(
                f,
                "\tspecies {:?}: {} members, {}, stagnated {}",
                species.id, species.size, species.fitness, species.time_stagnated
            )?;
        }
        Ok(())
    }
}

/// A reporting-level dependant store
/// of genomes from a population.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GenerationMemberRecord {
    /// Species IDs, species champions, and stagnation level.
    SpeciesChampions(Vec<(SpeciesID, Genome, usize)>),
    /// Only population champion.
    PopulationChampion(Genome),
    /// Empty.
    None,
}

/// A snapshot of an evaluated generation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub stats: GenerationStats,
    pub sample: GenerationMemberRecord,
}

/// A log of the evolution of a population over time.
#[derive(Clone, Debug)]
pub struct EvolutionLogger {
    reporting_level: ReportingLevel,
    logs: Vec<Log>,
}

impl EvolutionLogger {
    /// Returns a logger with the appropiate reporting level.
    pub fn new(reporting_level: ReportingLevel) -> EvolutionLogger {
        EvolutionLogger {
            reporting_level,
            logs: vec![],
        }
    }

    /// Stores the statistics of the generation `cycle`
    /// has just evaluated, along with the genomes the
    /// reporting level asks for.
    pub fn log(&mut self, cycle: &EvolutionCycle, stats: &GenerationStats) {
        let sample = match self.reporting_level {
            ReportingLevel::SpeciesChampions => GenerationMemberRecord::SpeciesChampions(
                cycle
                    .species()
                    .iter()
                    .map(|s| (s.id(), s.representative().clone(), s.time_stagnated()))
                    .collect(),
            ),
            ReportingLevel::PopulationChampion => match cycle.champion() {
                Some(champion) => GenerationMemberRecord::PopulationChampion(champion.clone()),
                None => GenerationMemberRecord::None,
            },
            ReportingLevel::NoGenomes => GenerationMemberRecord::None,
        };
        self.logs.push(Log {
            stats: stats.clone(),
            sample,
        });
    }

    /// Iterate over all logged snapshots.
    pub fn iter(&self) -> impl Iterator<Item = &Log> {
        self.logs.iter()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_and_even() {
        let stats = Stats::from([5.0, 1.0, 3.0]).unwrap();
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.mean, 3.0);
        let stats = Stats::from([4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.median, 2.5);
        assert!(Stats::from(Vec::new()).is_none());
    }

    #[test]
    fn display_lists_species() {
        let fitness = Stats::from([1.0, 2.0]).unwrap();
        let stats = GenerationStats {
            generation: 4,
            fitness,
            champion: 17,
            species: vec![SpeciesStats {
                id: SpeciesID(1, 0),
                size: 2,
                fitness,
                champion: 17,
                time_stagnated: 0,
            }],
            failed_tasks: 0,
        };
        let text = stats.to_string();
        assert!(text.starts_with("generation 4: best 2.0000"));
        assert!(text.contains("species SpeciesID(1, 0): 2 members"));
    }
}
