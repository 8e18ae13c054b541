//! Genomes are the focus of evolution.
//! They are an ordered collection of node, link and feature
//! genes that can be decoded into a controller. Genomes are
//! progressively mutated, thus adding complexity and functionality.

mod config;
mod errors;
mod genes;
mod history;
mod mutations;

pub use config::GeneticConfig;
pub use errors::{FitnessAlreadyAssigned, MutationError, StructuralError};
pub use genes::{FeatureGene, Gene, GeneParams, LinkGene, NodeGene, NodeRole};
pub use history::{InnovationRegistry, StructuralKey};
pub use mutations::{add_link, add_node, crossover, mutate_weights};

use crate::evaluation::Fitness;
use crate::{GenomeId, Innovation, NodeId};

use rand::Rng;
use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An ordered collection of genes with a fixed identity.
///
/// Gene order is insertion order and is stable across
/// copies. Suports Serde for convenient genome saving and loading.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Genome {
    id: GenomeId,
    genes: Vec<Gene>,
    fitness: Option<Fitness>,
}

impl Genome {
    /// Creates a genome from a list of genes, without validation.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::{Gene, Genome, LinkGene, NodeGene, NodeRole};
    ///
    /// let genome = Genome::from_genes(0, vec![
    ///     Gene::Node(NodeGene::new(0, NodeRole::Input, 0.0, 0.0)),
    ///     Gene::Node(NodeGene::new(1, NodeRole::Output, 0.0, 0.0)),
    ///     Gene::Link(LinkGene::new(2, 0, 1, 1.0)),
    /// ]);
    /// assert!(genome.validate().is_ok());
    /// ```
    pub fn from_genes(id: GenomeId, genes: Vec<Gene>) -> Genome {
        Genome {
            id,
            genes,
            fitness: None,
        }
    }

    /// Creates a new individual from a template, copying its
    /// topology and innovation numbers and drawing fresh
    /// parameters for every gene.
    pub fn from_template<R: Rng + ?Sized>(template: &Genome, id: GenomeId, rng: &mut R) -> Genome {
        Genome::from_genes(
            id,
            template
                .genes
                .iter()
                .map(|gene| gene.clone_with_innovation(&GeneParams::sample(rng)))
                .collect(),
        )
    }

    /// Returns a copy of the genome under a new
    /// id, with no fitness assigned.
    pub fn with_id(&self, id: GenomeId) -> Genome {
        Genome {
            id,
            genes: self.genes.clone(),
            fitness: None,
        }
    }

    /// Appends a gene. Fails if a gene with the
    /// same innovation number is already present.
    pub fn add_gene(&mut self, gene: Gene) -> Result<(), StructuralError> {
        if self.gene(gene.innovation()).is_some() {
            return Err(StructuralError::DuplicateInnovation(gene.innovation()));
        }
        self.genes.push(gene);
        Ok(())
    }

    /// Appends a gene the caller knows to be new to the genome.
    pub(crate) fn push_gene(&mut self, gene: Gene) {
        debug_assert!(self.gene(gene.innovation()).is_none());
        self.genes.push(gene);
    }

    pub fn id(&self) -> GenomeId {
        self.id
    }

    /// Returns an iterator over the genes, in insertion order.
    pub fn genes(&self) -> impl Iterator<Item = &Gene> {
        self.genes.iter()
    }

    pub(crate) fn genes_mut(&mut self) -> impl Iterator<Item = &mut Gene> {
        self.genes.iter_mut()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeGene> {
        self.genes.iter().filter_map(Gene::as_node)
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkGene> {
        self.genes.iter().filter_map(Gene::as_link)
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureGene> {
        self.genes.iter().filter_map(Gene::as_feature)
    }

    /// Returns the gene with the given innovation number.
    pub fn gene(&self, innovation: Innovation) -> Option<&Gene> {
        self.genes.iter().find(|g| g.innovation() == innovation)
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&NodeGene> {
        self.nodes().find(|n| n.id() == id)
    }

    /// Whether a link (enabled or not) connects `from` to `to`.
    pub fn has_link(&self, from: NodeId, to: NodeId) -> bool {
        self.links().any(|l| l.endpoints() == (from, to))
    }

    /// Returns the highest innovation number in the genome.
    pub fn max_innovation(&self) -> Option<Innovation> {
        self.genes.iter().map(Gene::innovation).max()
    }

    /// Number of genes of every kind.
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Returns the genome's primary fitness, if evaluated.
    pub fn fitness(&self) -> Option<f32> {
        self.fitness.as_ref().map(Fitness::primary)
    }

    /// Returns the genome's full fitness, if evaluated.
    pub fn objectives(&self) -> Option<&Fitness> {
        self.fitness.as_ref()
    }

    /// Assigns the genome's fitness. A genome is evaluated
    /// at most once per generation, so a second assignment
    /// is an error.
    ///
    /// # Examples
    /// ```
    /// use oxievo::evaluation::Fitness;
    /// use oxievo::genomics::Genome;
    ///
    /// let mut genome = Genome::from_genes(3, vec![]);
    /// assert!(genome.set_fitness(Fitness::Scalar(1.5)).is_ok());
    /// assert!(genome.set_fitness(Fitness::Scalar(2.0)).is_err());
    /// assert_eq!(genome.fitness(), Some(1.5));
    /// ```
    pub fn set_fitness(&mut self, fitness: Fitness) -> Result<(), FitnessAlreadyAssigned> {
        if self.fitness.is_some() {
            return Err(FitnessAlreadyAssigned(self.id));
        }
        self.fitness = Some(fitness);
        Ok(())
    }

    /// Checks that every link endpoint names a node gene of
    /// this genome, and that no innovation number or link
    /// endpoint pair appears twice.
    pub fn validate(&self) -> Result<(), StructuralError> {
        let mut innovations = BTreeSet::new();
        for gene in &self.genes {
            if !innovations.insert(gene.innovation()) {
                return Err(StructuralError::DuplicateInnovation(gene.innovation()));
            }
        }

        let nodes: BTreeSet<NodeId> = self.nodes().map(NodeGene::id).collect();
        let mut endpoints = BTreeMap::new();
        for link in self.links() {
            for node in [link.from(), link.to()] {
                if !nodes.contains(&node) {
                    return Err(StructuralError::DanglingLink {
                        link: link.innovation(),
                        node,
                    });
                }
            }
            if let Some(first) = endpoints.insert(link.endpoints(), link.innovation()) {
                return Err(StructuralError::DuplicateEndpoints {
                    first,
                    second: link.innovation(),
                    from: link.from(),
                    to: link.to(),
                });
            }
        }
        Ok(())
    }

    /// Returns the compatibility distance between two genomes:
    ///
    /// `(excess * C1 + disjoint * C2) / N + mean_weight_diff * C3`,
    ///
    /// where `N` is the gene count of the larger genome. A gene
    /// is excess when its innovation number is above the other
    /// genome's highest, and disjoint otherwise. The weight
    /// difference is averaged over matched weighted genes.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::{Gene, GeneticConfig, Genome, LinkGene, NodeGene, NodeRole};
    ///
    /// let config = GeneticConfig {
    ///     excess_gene_factor: 1.0,
    ///     disjoint_gene_factor: 1.0,
    ///     common_weight_factor: 0.5,
    ///     ..GeneticConfig::zero()
    /// };
    /// let nodes = vec![
    ///     Gene::Node(NodeGene::new(0, NodeRole::Input, 0.0, 0.0)),
    ///     Gene::Node(NodeGene::new(1, NodeRole::Output, 0.0, 0.0)),
    /// ];
    /// let mut a = Genome::from_genes(0, nodes.clone());
    /// a.add_gene(Gene::Link(LinkGene::new(2, 0, 1, 1.0))).unwrap();
    /// let mut b = Genome::from_genes(1, nodes);
    /// b.add_gene(Gene::Link(LinkGene::new(2, 0, 1, -1.0))).unwrap();
    /// b.add_gene(Gene::Link(LinkGene::new(3, 1, 1, 0.0))).unwrap();
    ///
    /// // One excess gene over 4 genes, weight difference of 2.
    /// assert_eq!(Genome::compatibility_distance(&a, &b, &config), 1.0 / 4.0 + 2.0 * 0.5);
    /// ```
    pub fn compatibility_distance(first: &Genome, second: &Genome, config: &GeneticConfig) -> f32 {
        let first_genes: BTreeMap<Innovation, &Gene> =
            first.genes.iter().map(|g| (g.innovation(), g)).collect();
        let second_genes: BTreeMap<Innovation, &Gene> =
            second.genes.iter().map(|g| (g.innovation(), g)).collect();

        let (excess_first, disjoint_first) = Self::count_unmatched(&first_genes, &second_genes);
        let (excess_second, disjoint_second) = Self::count_unmatched(&second_genes, &first_genes);

        let weight_diffs: Vec<f32> = first_genes
            .iter()
            .filter_map(|(innovation, gene)| {
                let other = second_genes.get(innovation)?;
                Some((gene.weight()? - other.weight()?).abs())
            })
            .collect();
        let weight_diff = if weight_diffs.is_empty() {
            0.0
        } else {
            weight_diffs.iter().sum::<f32>() / weight_diffs.len() as f32
        };

        let size = first.len().max(second.len()).max(1) as f32;
        (config.excess_gene_factor * (excess_first + excess_second) as f32
            + config.disjoint_gene_factor * (disjoint_first + disjoint_second) as f32)
            / size
            + config.common_weight_factor * weight_diff
    }

    /// Counts `(excess, disjoint)` genes of `genes` relative to `other`.
    fn count_unmatched(
        genes: &BTreeMap<Innovation, &Gene>,
        other: &BTreeMap<Innovation, &Gene>,
    ) -> (usize, usize) {
        let other_max = other.keys().next_back().copied();
        genes
            .keys()
            .filter(|innovation| !other.contains_key(innovation))
            .fold((0, 0), |(excess, disjoint), &innovation| {
                if other_max.map_or(true, |max| innovation > max) {
                    (excess + 1, disjoint)
                } else {
                    (excess, disjoint + 1)
                }
            })
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Genome {}", self.id)?;
        if let Some(fitness) = self.fitness() {
            write!(f, " (fitness {:.3})", fitness)?;
        }
        write!(f, " [")?;
        for (i, gene) in self.genes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", gene)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(innovation: Innovation, role: NodeRole) -> Gene {
        Gene::Node(NodeGene::new(innovation, role, 0.0, 0.0))
    }

    fn link(innovation: Innovation, from: NodeId, to: NodeId, weight: f32) -> Gene {
        Gene::Link(LinkGene::new(innovation, from, to, weight))
    }

    fn minimal() -> Genome {
        Genome::from_genes(
            0,
            vec![
                node(0, NodeRole::Input),
                node(1, NodeRole::Bias),
                node(2, NodeRole::Output),
                link(3, 0, 2, 0.5),
            ],
        )
    }

    #[test]
    fn validate_dangling_link() {
        let mut genome = minimal();
        genome.add_gene(link(4, 0, 9, 1.0)).unwrap();
        assert_eq!(
            genome.validate(),
            Err(StructuralError::DanglingLink { link: 4, node: 9 })
        );
    }

    #[test]
    fn validate_duplicates() {
        let mut genome = minimal();
        assert_eq!(
            genome.add_gene(link(3, 1, 2, 1.0)),
            Err(StructuralError::DuplicateInnovation(3))
        );

        let duplicated = Genome::from_genes(1, vec![node(0, NodeRole::Input), node(0, NodeRole::Input)]);
        assert_eq!(
            duplicated.validate(),
            Err(StructuralError::DuplicateInnovation(0))
        );

        genome.add_gene(link(5, 0, 2, 1.0)).unwrap();
        assert!(matches!(
            genome.validate(),
            Err(StructuralError::DuplicateEndpoints { first: 3, second: 5, .. })
        ));
    }

    #[test]
    fn fitness_once() {
        let mut genome = minimal();
        assert_eq!(genome.fitness(), None);
        genome.set_fitness(Fitness::Scalar(2.0)).unwrap();
        assert_eq!(
            genome.set_fitness(Fitness::Scalar(3.0)),
            Err(FitnessAlreadyAssigned(0))
        );
        assert_eq!(genome.with_id(7).fitness(), None);
        assert_eq!(genome.with_id(7).id(), 7);
    }

    #[test]
    fn from_template_keeps_innovations() {
        use crate::SeededRng;
        use rand::SeedableRng;

        let template = minimal();
        let mut rng = SeededRng::seed_from_u64(1);
        let individual = Genome::from_template(&template, 4, &mut rng);

        assert_eq!(individual.id(), 4);
        assert!(individual
            .genes()
            .map(Gene::innovation)
            .eq(template.genes().map(Gene::innovation)));
        assert!(individual.links().all(|l| l.enabled() && l.weight().abs() <= 1.0));
    }

    /// Nine shared genes; the second genome has an extra
    /// link whose innovation lies inside the first's range.
    fn pair_with_interior_extra() -> (Genome, Genome) {
        let mut genes = vec![
            node(0, NodeRole::Input),
            node(1, NodeRole::Input),
            node(2, NodeRole::Bias),
            node(3, NodeRole::Output),
            link(4, 0, 3, 0.5),
            link(5, 1, 3, 0.5),
            link(6, 2, 3, 0.5),
            node(7, NodeRole::Hidden),
        ];
        let mut a = genes.clone();
        a.push(link(9, 0, 7, 0.5));
        genes.push(link(8, 7, 3, 0.5));
        genes.push(link(9, 0, 7, 0.5));
        (Genome::from_genes(0, a), Genome::from_genes(1, genes))
    }

    #[test]
    fn distance_counts_disjoint() {
        let (a, b) = pair_with_interior_extra();
        assert_eq!((a.len(), b.len()), (9, 10));

        let config = GeneticConfig {
            excess_gene_factor: 1.0,
            disjoint_gene_factor: 1.0,
            common_weight_factor: 0.4,
            ..GeneticConfig::zero()
        };
        assert!((Genome::compatibility_distance(&a, &b, &config) - 0.1).abs() < 1e-6);

        let config = GeneticConfig {
            disjoint_gene_factor: 40.0,
            ..config
        };
        assert!((Genome::compatibility_distance(&a, &b, &config) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn distance_is_symmetric_and_zero_for_self() {
        let (a, b) = pair_with_interior_extra();
        let config = GeneticConfig {
            excess_gene_factor: 2.0,
            disjoint_gene_factor: 3.0,
            common_weight_factor: 0.4,
            ..GeneticConfig::zero()
        };
        assert_eq!(Genome::compatibility_distance(&a, &a, &config), 0.0);
        assert_eq!(
            Genome::compatibility_distance(&a, &b, &config),
            Genome::compatibility_distance(&b, &a, &config)
        );
    }
}
