use crate::evaluation::WORST_FITNESS;
use crate::genomics::{GeneticConfig, Genome};
use crate::populations::EvolutionConfig;

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;

/// Species identifier. Specifies
/// the generation in which the species
/// was born, and the count of other species
/// generated in the _same generation_ before
/// the one identified (i.e, if it was the
/// third species born in generation 5, it
/// will be species [5, 2]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpeciesID(pub usize, pub usize);

/// Species are collections of reproductively
/// compatible (within a certain [genetic distance])
/// genomes. Membership is determined by calculating
/// the genetic distance to a _representative_: the
/// species' champion of the previous generation, or
/// its founding genome.
///
/// Members are indices into the population and are
/// recomputed from scratch every generation.
///
/// Species will stagnate after [`stagnation_threshold`]
/// generations without improving the species' best fitness,
/// and will thereafter be penalized during reproduction.
///
/// [genetic distance]: EvolutionConfig::compatibility_threshold
/// [`stagnation_threshold`]: EvolutionConfig::stagnation_threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    id: SpeciesID,
    representative: Genome,
    #[serde(skip)]
    members: Vec<usize>,
    stagnation: usize,
    /// Best fitness ever reached; `None` until first ranked.
    max_fitness: Option<f32>,
}

impl Species {
    /// Creates a new, empty species with the
    /// specified ID and representative.
    pub fn new(id: SpeciesID, representative: Genome) -> Species {
        Species {
            id,
            representative,
            members: Vec::new(),
            stagnation: 0,
            max_fitness: None,
        }
    }

    pub fn id(&self) -> SpeciesID {
        self.id
    }

    pub fn representative(&self) -> &Genome {
        &self.representative
    }

    /// Returns the population indices of the species' members,
    /// best first once the generation has been ranked.
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the number of generations the species
    /// has been stagnated.
    pub fn time_stagnated(&self) -> usize {
        self.stagnation
    }

    /// Returns the genetic distance between the species'
    /// representative and `genome`.
    pub fn compatibility_distance(&self, genome: &Genome, config: &GeneticConfig) -> f32 {
        Genome::compatibility_distance(&self.representative, genome, config)
    }

    pub(super) fn add_member(&mut self, index: usize) {
        self.members.push(index);
    }

    /// The same species, emptied for the next speciation.
    pub(super) fn emptied(&self) -> Species {
        Species {
            members: Vec::new(),
            ..self.clone()
        }
    }

    /// Returns the mean fitness of the species' members.
    pub fn mean_fitness(&self, genomes: &[Genome]) -> f32 {
        if self.members.is_empty() {
            return WORST_FITNESS;
        }
        self.members
            .iter()
            .map(|&i| fitness_of(&genomes[i]))
            .sum::<f32>()
            / self.members.len() as f32
    }

    /// Returns the currently best-performing member.
    pub fn champion<'a>(&self, genomes: &'a [Genome]) -> Option<&'a Genome> {
        self.members
            .iter()
            .map(|&i| &genomes[i])
            .fold(None, |best: Option<&Genome>, genome| match best {
                Some(b) if fitness_of(b) >= fitness_of(genome) => Some(b),
                _ => Some(genome),
            })
    }

    /// Sorts members by decreasing fitness (ties by population
    /// order), updates the stagnation record and makes the
    /// champion the representative for the next generation.
    pub(super) fn rank(&mut self, genomes: &[Genome]) {
        self.members.sort_by(|&a, &b| {
            fitness_of(&genomes[b])
                .partial_cmp(&fitness_of(&genomes[a]))
                .unwrap_or(Ordering::Equal)
        });
        if let Some(&best) = self.members.first() {
            let best_fitness = fitness_of(&genomes[best]);
            if self.max_fitness.map_or(true, |max| best_fitness > max) {
                self.max_fitness = Some(best_fitness);
                self.stagnation = 0;
            } else {
                self.stagnation += 1;
            }
            self.representative = genomes[best].clone();
        }
    }

    pub(super) fn is_stagnated(&self, config: &EvolutionConfig) -> bool {
        config.stagnation_threshold > 0 && self.stagnation >= config.stagnation_threshold
    }

    pub(super) fn count_elite(&self, config: &EvolutionConfig) -> usize {
        self.members.len().min(config.elitism)
    }

    /// Number of top members eligible as parents; at least one.
    pub(super) fn count_survivors(&self, config: &EvolutionConfig) -> usize {
        ((self.members.len() as f32 * config.truncation_fraction).ceil() as usize)
            .clamp(1, self.members.len().max(1))
    }
}

/// A genome's primary fitness, unevaluated genomes being the worst.
pub(super) fn fitness_of(genome: &Genome) -> f32 {
    genome.fitness().unwrap_or(WORST_FITNESS)
}
