//! Offspring operators. Each takes its parents by reference
//! and returns a new genome carrying a parent's id,
//! with no fitness assigned; callers renumber the child.

use crate::evaluation::WORST_FITNESS;
use crate::genomics::{
    Gene, GeneticConfig, Genome, InnovationRegistry, LinkGene, MutationError, NodeGene, NodeRole,
    StructuralKey,
};
use crate::NodeId;

use rand::Rng;

use std::collections::BTreeMap;

/// Perturbs or resets a proportion of the genome's link and
/// feature weights. When decay mutation is enabled, half of
/// the mutations act on hidden and output node decays instead.
///
/// Perturbations are uniform over ±`weight_mutation_power` and
/// clamped to ±`weight_bound`; resets draw uniformly from that range.
///
/// # Examples
/// ```
/// use oxievo::genomics::{mutate_weights, GeneticConfig, InnovationRegistry};
/// use rand::SeedableRng;
///
/// let config = GeneticConfig {
///     input_count: 2,
///     output_count: 1,
///     weight_bound: 1.0,
///     weight_mutation_power: 0.5,
///     weight_mutation_proportion: 1.0,
///     ..GeneticConfig::zero()
/// };
/// let mut registry = InnovationRegistry::new();
/// let template = registry.initialize_innovations(1, 2, 1, false, 0).unwrap().remove(0);
/// let mut rng = oxievo::SeededRng::seed_from_u64(3);
///
/// let child = mutate_weights(&template, &config, &mut rng);
/// assert!(child.links().all(|l| l.weight().abs() <= 0.5));
/// ```
pub fn mutate_weights<R: Rng + ?Sized>(genome: &Genome, config: &GeneticConfig, rng: &mut R) -> Genome {
    let mut child = genome.with_id(genome.id());
    let mutate_decays = config.mutate_decays && rng.gen_bool(0.5);

    for gene in child.genes_mut() {
        if rng.gen::<f32>() >= config.weight_mutation_proportion {
            continue;
        }
        let reset = rng.gen::<f32>() < config.weight_reset_chance;
        match gene {
            Gene::Link(link) if !mutate_decays => {
                let weight = if reset {
                    rng.gen_range(-config.weight_bound..=config.weight_bound)
                } else {
                    let nudge =
                        rng.gen_range(-config.weight_mutation_power..=config.weight_mutation_power);
                    (link.weight() + nudge).clamp(-config.weight_bound, config.weight_bound)
                };
                link.set_weight(weight);
            }
            Gene::Feature(feature) if !mutate_decays => {
                let weight = if reset {
                    rng.gen_range(0.0..1.0)
                } else {
                    let nudge =
                        rng.gen_range(-config.weight_mutation_power..=config.weight_mutation_power);
                    (feature.weight() + nudge).clamp(0.0, 1.0)
                };
                feature.set_weight(weight);
            }
            Gene::Node(node) if mutate_decays && node.role().accepts_links() => {
                let decay = if reset {
                    rng.gen_range(0.0..1.0)
                } else {
                    let nudge =
                        rng.gen_range(-config.decay_mutation_power..=config.decay_mutation_power);
                    (node.parameter() + nudge).clamp(0.0, 1.0)
                };
                node.set_parameter(decay);
            }
            _ => {}
        }
    }
    child
}

/// Splits a randomly chosen enabled link in two, inserting a
/// new hidden node between its endpoints. The split link is
/// disabled; the incoming link has weight 1 and the outgoing
/// link inherits the split link's weight.
///
/// If the genome already contains the node this split would
/// normally create (it split the same link before), the next
/// duplicate ordinal is used, so the new node is always new
/// to the genome.
pub fn add_node<R: Rng + ?Sized>(
    genome: &Genome,
    registry: &mut InnovationRegistry,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    let candidates: Vec<&LinkGene> = genome.links().filter(|l| l.enabled()).collect();
    if candidates.is_empty() {
        return Err(MutationError::NoEnabledLink);
    }
    let split = candidates[rng.gen_range(0..candidates.len())].clone();

    let node_id = (0..)
        .map(|duplicate| {
            registry.next_innovation(StructuralKey::Node {
                split: split.innovation(),
                duplicate,
            })
        })
        .find(|&id| genome.gene(id).is_none())
        .ok_or(MutationError::NoEnabledLink)?;

    let incoming = registry.next_innovation(StructuralKey::Link {
        from: split.from(),
        to: node_id,
    });
    let outgoing = registry.next_innovation(StructuralKey::Link {
        from: node_id,
        to: split.to(),
    });

    let mut child = genome.with_id(genome.id());
    for gene in child.genes_mut() {
        if let Some(link) = gene.as_link_mut() {
            if link.endpoints() == split.endpoints() {
                link.set_enabled(false);
            }
        }
    }
    let genes = [
        Gene::Node(NodeGene::new(
            node_id,
            NodeRole::Hidden,
            0.0,
            rng.gen_range(0.0..1.0),
        )),
        Gene::Link(LinkGene::new(incoming, split.from(), node_id, 1.0)),
        Gene::Link(LinkGene::new(outgoing, node_id, split.to(), split.weight())),
    ];
    for gene in genes {
        child.push_gene(gene);
    }
    Ok(child)
}

/// Connects a randomly chosen pair of unconnected nodes. The
/// target must be a hidden or output node; self-links are only
/// considered if `allow_self_links` is set. The new link's
/// weight is uniform over ±`weight_bound`.
pub fn add_link<R: Rng + ?Sized>(
    genome: &Genome,
    registry: &mut InnovationRegistry,
    config: &GeneticConfig,
    rng: &mut R,
) -> Result<Genome, MutationError> {
    let targets: Vec<NodeId> = genome
        .nodes()
        .filter(|n| n.role().accepts_links())
        .map(NodeGene::id)
        .collect();
    let candidates: Vec<(NodeId, NodeId)> = genome
        .nodes()
        .flat_map(|from| targets.iter().map(move |&to| (from.id(), to)))
        .filter(|&(from, to)| config.allow_self_links || from != to)
        .filter(|&(from, to)| !genome.has_link(from, to))
        .collect();
    if candidates.is_empty() {
        return Err(MutationError::FullyConnected);
    }

    let (from, to) = candidates[rng.gen_range(0..candidates.len())];
    let innovation = registry.next_innovation(StructuralKey::Link { from, to });
    let weight = rng.gen_range(-config.weight_bound..=config.weight_bound);

    let mut child = genome.with_id(genome.id());
    child.push_gene(Gene::Link(LinkGene::new(innovation, from, to, weight)));
    Ok(child)
}

/// Mates two genomes, aligning their genes by innovation number.
///
/// Matched genes are taken from either parent at random; a link
/// disabled in either parent stays disabled unless re-enabled with
/// `reenable_chance`. Unmatched genes are inherited from the fitter
/// parent, or from both when their fitness is equal. Unevaluated
/// parents count as having the worst fitness.
///
/// The child carries the fitter parent's id.
pub fn crossover<R: Rng + ?Sized>(
    first: &Genome,
    second: &Genome,
    config: &GeneticConfig,
    rng: &mut R,
) -> Genome {
    let first_fitness = first.fitness().unwrap_or(WORST_FITNESS);
    let second_fitness = second.fitness().unwrap_or(WORST_FITNESS);
    let (fitter, other) = if second_fitness > first_fitness {
        (second, first)
    } else {
        (first, second)
    };
    let equal = first_fitness == second_fitness;

    let other_genes: BTreeMap<_, _> = other.genes().map(|g| (g.innovation(), g)).collect();
    let mut genes = Vec::with_capacity(fitter.len().max(other.len()));
    for gene in fitter.genes() {
        match other_genes.get(&gene.innovation()) {
            Some(&homologous) => {
                let mut chosen = if rng.gen_bool(0.5) {
                    gene.clone()
                } else {
                    homologous.clone()
                };
                let disabled = [gene, homologous]
                    .iter()
                    .any(|g| g.as_link().map_or(false, |l| !l.enabled()));
                if let Some(link) = chosen.as_link_mut() {
                    link.set_enabled(!disabled || rng.gen::<f32>() < config.reenable_chance);
                }
                genes.push(chosen);
            }
            None => genes.push(gene.clone()),
        }
    }
    if equal {
        genes.extend(
            other
                .genes()
                .filter(|g| fitter.gene(g.innovation()).is_none())
                .cloned(),
        );
    }

    Genome::from_genes(fitter.id(), genes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Fitness;
    use crate::SeededRng;

    use rand::SeedableRng;

    fn config() -> GeneticConfig {
        GeneticConfig {
            input_count: 2,
            output_count: 1,
            weight_bound: 2.0,
            weight_mutation_power: 0.5,
            weight_reset_chance: 0.1,
            weight_mutation_proportion: 1.0,
            ..GeneticConfig::zero()
        }
    }

    fn setup() -> (InnovationRegistry, Genome, SeededRng) {
        let mut registry = InnovationRegistry::new();
        let template = registry
            .initialize_innovations(1, 2, 1, false, 0)
            .unwrap()
            .remove(0);
        let mut rng = SeededRng::seed_from_u64(11);
        let genome = Genome::from_template(&template, 0, &mut rng);
        (registry, genome, rng)
    }

    #[test]
    fn weight_mutation_keeps_structure() {
        let (_, genome, mut rng) = setup();
        let child = mutate_weights(&genome, &config(), &mut rng);
        assert!(child
            .genes()
            .map(Gene::innovation)
            .eq(genome.genes().map(Gene::innovation)));
        assert!(child.links().all(|l| l.weight().abs() <= 2.0));
        assert_ne!(
            child.links().map(LinkGene::weight).collect::<Vec<_>>(),
            genome.links().map(LinkGene::weight).collect::<Vec<_>>()
        );
    }

    #[test]
    fn decay_mutation_stays_in_unit_range() {
        let (_, genome, mut rng) = setup();
        let config = GeneticConfig {
            mutate_decays: true,
            decay_mutation_power: 0.8,
            ..config()
        };
        let mut current = genome;
        for _ in 0..50 {
            current = mutate_weights(&current, &config, &mut rng);
            assert!(current
                .nodes()
                .all(|n| (0.0..=1.0).contains(&n.parameter())));
        }
    }

    #[test]
    fn node_addition_splits_link() {
        let (mut registry, genome, mut rng) = setup();
        let next = registry.next_free();
        let child = add_node(&genome, &mut registry, &mut rng).unwrap();

        assert_eq!(child.len(), genome.len() + 3);
        assert!(child.validate().is_ok());
        assert_eq!(child.links().filter(|l| !l.enabled()).count(), 1);

        let hidden: Vec<_> = child
            .nodes()
            .filter(|n| n.role() == NodeRole::Hidden)
            .collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].id(), next);
        assert_eq!(registry.next_free(), next + 3);
    }

    #[test]
    fn same_split_same_innovations() {
        let (mut registry, genome, _) = setup();
        // Single enabled link, so both mutations split the same one.
        let mut single = genome.with_id(0);
        for gene in single.genes_mut() {
            if let Some(link) = gene.as_link_mut() {
                if link.from() == 1 {
                    link.set_enabled(false);
                }
            }
        }

        let a = add_node(&single, &mut registry, &mut SeededRng::seed_from_u64(1)).unwrap();
        let b = add_node(&single, &mut registry, &mut SeededRng::seed_from_u64(2)).unwrap();
        let innovations = |g: &Genome| g.genes().map(Gene::innovation).collect::<Vec<_>>();
        assert_eq!(innovations(&a), innovations(&b));

        // Splitting the same link again within one genome yields a fresh node.
        let mut resplit = a.with_id(0);
        for gene in resplit.genes_mut() {
            if let Some(link) = gene.as_link_mut() {
                link.set_enabled(link.from() == 0 && link.to() == 3);
            }
        }
        let c = add_node(&resplit, &mut registry, &mut SeededRng::seed_from_u64(3)).unwrap();
        assert!(c.validate().is_ok());
        assert_eq!(c.nodes().filter(|n| n.role() == NodeRole::Hidden).count(), 2);
    }

    #[test]
    fn node_addition_needs_enabled_link() {
        let (mut registry, genome, mut rng) = setup();
        let mut disabled = genome.with_id(0);
        for gene in disabled.genes_mut() {
            if let Some(link) = gene.as_link_mut() {
                link.set_enabled(false);
            }
        }
        assert_eq!(
            add_node(&disabled, &mut registry, &mut rng),
            Err(MutationError::NoEnabledLink)
        );
    }

    #[test]
    fn link_addition_until_fully_connected() {
        let (mut registry, genome, mut rng) = setup();
        // Sources: 2 inputs + bias + output; only the output accepts links.
        // Input links already exist, so bias->output is the only option.
        let child = add_link(&genome, &mut registry, &config(), &mut rng).unwrap();
        assert!(child.has_link(2, 3));
        assert!(child.validate().is_ok());
        assert_eq!(
            add_link(&child, &mut registry, &config(), &mut rng),
            Err(MutationError::FullyConnected)
        );

        let self_links = GeneticConfig {
            allow_self_links: true,
            ..config()
        };
        let looped = add_link(&child, &mut registry, &self_links, &mut rng).unwrap();
        assert!(looped.has_link(3, 3));
    }

    #[test]
    fn crossover_aligns_homologous_genes() {
        let (mut registry, genome, mut rng) = setup();
        let mut small = genome.with_id(0);
        let mut large = add_node(&genome, &mut registry, &mut rng).unwrap();
        large = add_link(&large, &mut registry, &config(), &mut rng).unwrap();
        let large = {
            let mut g = mutate_weights(&large, &config(), &mut rng).with_id(1);
            g.set_fitness(Fitness::Scalar(1.0)).unwrap();
            g
        };
        small.set_fitness(Fitness::Scalar(2.0)).unwrap();

        for seed in 0..20 {
            let child = crossover(&small, &large, &config(), &mut SeededRng::seed_from_u64(seed));
            assert!(child.validate().is_ok());
            // Fitter parent is the small one: no structure from the large one.
            assert_eq!(child.len(), small.len());
            for gene in child.genes() {
                let innovation = gene.innovation();
                assert_eq!(child.genes().filter(|g| g.innovation() == innovation).count(), 1);
                let candidates = [small.gene(innovation), large.gene(innovation)];
                assert!(candidates
                    .iter()
                    .flatten()
                    .any(|parent| parent.weight() == gene.weight()));
            }
        }
    }

    #[test]
    fn crossover_equal_fitness_takes_both() {
        let (mut registry, genome, mut rng) = setup();
        let a = add_node(&genome, &mut registry, &mut rng).unwrap();
        let b = add_link(&genome, &mut registry, &config(), &mut rng).unwrap().with_id(1);

        let child = crossover(&a, &b, &config(), &mut rng);
        assert_eq!(child.len(), genome.len() + 3 + 1);
        assert!(child.validate().is_ok());
        assert_eq!(child.fitness(), None);
    }
}
