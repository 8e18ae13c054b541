use super::species::Species;
use super::EvolutionConfig;
use crate::genomics::{self, GeneticConfig, Genome, InnovationRegistry};
use crate::GenomeId;

use rand::Rng;
use tracing::{debug, warn};

/// The genetic operation producing an offspring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    MutateWeights,
    AddNode,
    AddLink,
    Crossover,
}

impl Operation {
    const ALL: [Operation; 4] = [
        Operation::MutateWeights,
        Operation::AddNode,
        Operation::AddLink,
        Operation::Crossover,
    ];

    /// Picks an operation with probability proportional to its rate.
    pub(super) fn choose<R: Rng + ?Sized>(config: &EvolutionConfig, rng: &mut R) -> Operation {
        let rates = config.operation_rates();
        let mut roll = rng.gen::<f32>() * rates.iter().sum::<f32>();
        for (operation, rate) in Operation::ALL.iter().zip(rates) {
            if roll < rate {
                return *operation;
            }
            roll -= rate;
        }
        // Rounding left the roll past the last rate.
        Operation::ALL
            .iter()
            .zip(rates)
            .rev()
            .find(|(_, rate)| *rate > 0.0)
            .map_or(Operation::MutateWeights, |(operation, _)| *operation)
    }
}

/// Auxiliary type for offspring generation.
/// Handles all the tasks of generating a population's
/// offspring according to the specified configs
/// and allotted offspring.
pub(super) struct OffspringFactory<'a, R: Rng + ?Sized> {
    genomes: &'a [Genome],
    species: &'a [Species],
    champion: usize,
    registry: &'a mut InnovationRegistry,
    genetic_config: &'a GeneticConfig,
    config: &'a EvolutionConfig,
    rng: &'a mut R,
    next_genome_id: GenomeId,
}

impl<'a, R: Rng + ?Sized> OffspringFactory<'a, R> {
    /// `species` must be ranked, and `champion` is the
    /// population index of the population champion.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        genomes: &'a [Genome],
        species: &'a [Species],
        champion: usize,
        registry: &'a mut InnovationRegistry,
        genetic_config: &'a GeneticConfig,
        config: &'a EvolutionConfig,
        rng: &'a mut R,
        next_genome_id: GenomeId,
    ) -> OffspringFactory<'a, R> {
        OffspringFactory {
            genomes,
            species,
            champion,
            registry,
            genetic_config,
            config,
            rng,
            next_genome_id,
        }
    }

    /// Generate the allotted offspring, species by species.
    /// Returns the new population and the next free genome id.
    pub(super) fn generate_offspring(mut self, allotted_offspring: &[usize]) -> (Vec<Genome>, GenomeId) {
        let mut offspring = Vec::with_capacity(allotted_offspring.iter().sum());
        let all_species = self.species;
        for (species_index, &allotted) in allotted_offspring.iter().enumerate() {
            let species = &all_species[species_index];
            let mut elite = species.count_elite(self.config).min(allotted);
            if species.members().first() == Some(&self.champion) {
                elite = elite.max(1).min(allotted);
            }

            self.add_species_elite(&mut offspring, species, elite);
            self.add_mated_offspring(&mut offspring, species_index, allotted - elite);
        }
        (offspring, self.next_genome_id)
    }

    /// Copies the top "elite" members of the species
    /// unchanged. Elites keep their ids.
    fn add_species_elite(&self, offspring: &mut Vec<Genome>, species: &Species, elite: usize) {
        offspring.extend(
            species.members()[..elite]
                .iter()
                .map(|&i| self.genomes[i].with_id(self.genomes[i].id())),
        );
    }

    /// Chooses parents among the species' survivors and
    /// applies one genetic operation per offspring slot.
    fn add_mated_offspring(&mut self, offspring: &mut Vec<Genome>, species_index: usize, count: usize) {
        // Copied out so that the borrows don't overlap with
        // the mutable registry and rng.
        let genomes = self.genomes;
        let all_species = self.species;
        let species = &all_species[species_index];
        let eligible_parents = &species.members()[..species.count_survivors(self.config)];

        for _ in 0..count {
            let parent_index = eligible_parents[self.rng.gen_range(0..eligible_parents.len())];
            let parent = &genomes[parent_index];
            let operation = Operation::choose(self.config, self.rng);

            let child = match operation {
                Operation::Crossover => {
                    let mate = self.choose_second_parent(species_index, eligible_parents);
                    genomics::crossover(parent, mate, self.genetic_config, self.rng)
                }
                _ if parent_index == self.champion => self.mutate_weights(parent),
                Operation::AddNode => genomics::add_node(parent, self.registry, self.rng)
                    .unwrap_or_else(|error| {
                        debug!(genome = parent.id(), %error, "falling back to weight mutation");
                        self.mutate_weights(parent)
                    }),
                Operation::AddLink => {
                    genomics::add_link(parent, self.registry, self.genetic_config, self.rng)
                        .unwrap_or_else(|error| {
                            debug!(genome = parent.id(), %error, "falling back to weight mutation");
                            self.mutate_weights(parent)
                        })
                }
                Operation::MutateWeights => self.mutate_weights(parent),
            };

            let child = match child.validate() {
                Ok(()) => child,
                Err(error) => {
                    warn!(genome = parent.id(), ?operation, %error, "regenerating malformed offspring");
                    self.mutate_weights(parent)
                }
            };
            offspring.push(child.with_id(self.next_genome_id));
            self.next_genome_id += 1;
        }
    }

    fn mutate_weights(&mut self, parent: &Genome) -> Genome {
        genomics::mutate_weights(parent, self.genetic_config, self.rng)
    }

    /// Choose a mate from the current species' survivors,
    /// or from another randomly selected species.
    fn choose_second_parent(&mut self, species_index: usize, eligible_parents: &[usize]) -> &'a Genome {
        let genomes = self.genomes;
        if self.species.len() > 1 && self.rng.gen::<f32>() < self.config.interspecies_mating_chance {
            let mut other = self.rng.gen_range(0..self.species.len() - 1);
            if other >= species_index {
                other += 1;
            }
            let other_species = &self.species[other];
            let survivors = &other_species.members()[..other_species.count_survivors(self.config)];
            &genomes[survivors[self.rng.gen_range(0..survivors.len())]]
        } else {
            &genomes[eligible_parents[self.rng.gen_range(0..eligible_parents.len())]]
        }
    }
}
