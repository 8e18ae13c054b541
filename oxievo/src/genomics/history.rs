use crate::genomics::{FeatureGene, Gene, Genome, LinkGene, NodeGene, NodeRole};
use crate::{ConfigurationError, Innovation, NodeId};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use std::collections::hash_map::{Entry, HashMap};

/// The structural event an innovation number stands for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum StructuralKey {
    /// The `index`th node of the given role in the initial topology.
    Template { role: NodeRole, index: usize },
    /// A link between two nodes.
    Link { from: NodeId, to: NodeId },
    /// A node created by splitting the link with innovation `split`.
    /// `duplicate` counts how many times the same genome lineage
    /// had to re-split that link.
    Node { split: Innovation, duplicate: usize },
    /// The feature gene scaling input (or extra feature) `index`.
    Feature { index: usize },
}

/// An `InnovationRegistry` keeps track of structural innovations
/// in a run, in order to make sure identical mutations
/// are assigned the same innovation numbers.
///
/// Numbers are issued from a single counter, strictly increasing
/// in issuance order, and are never rolled back. The registry is
/// serialized as its ordered issuance log.
///
/// # Examples
/// ```
/// use oxievo::genomics::{InnovationRegistry, StructuralKey};
///
/// let mut registry = InnovationRegistry::new();
/// let key = StructuralKey::Link { from: 0, to: 3 };
///
/// let first = registry.next_innovation(key);
/// let other = registry.next_innovation(StructuralKey::Link { from: 1, to: 3 });
///
/// assert_eq!(registry.next_innovation(key), first);
/// assert!(other > first);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "IssuanceLog", into = "IssuanceLog")]
pub struct InnovationRegistry {
    next: Innovation,
    innovations: HashMap<StructuralKey, Innovation, RandomState>,
    issued: Vec<StructuralKey>,
}

#[derive(Clone, Serialize, Deserialize)]
struct IssuanceLog {
    issued: Vec<StructuralKey>,
}

impl From<IssuanceLog> for InnovationRegistry {
    fn from(log: IssuanceLog) -> Self {
        let mut registry = InnovationRegistry::new();
        for key in log.issued {
            registry.next_innovation(key);
        }
        registry
    }
}

impl From<InnovationRegistry> for IssuanceLog {
    fn from(registry: InnovationRegistry) -> Self {
        IssuanceLog {
            issued: registry.issued,
        }
    }
}

impl InnovationRegistry {
    /// Creates an empty registry.
    pub fn new() -> InnovationRegistry {
        InnovationRegistry::default()
    }

    /// Returns the innovation number previously issued
    /// for `key`, or issues and records the next one.
    pub fn next_innovation(&mut self, key: StructuralKey) -> Innovation {
        match self.innovations.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let innovation = self.next;
                entry.insert(innovation);
                self.issued.push(key);
                self.next += 1;
                innovation
            }
        }
    }

    /// Returns the innovation number issued
    /// for `key`, without issuing a new one.
    pub fn innovation_of(&self, key: &StructuralKey) -> Option<Innovation> {
        self.innovations.get(key).copied()
    }

    /// Returns the number the next new key will receive.
    pub fn next_free(&self) -> Innovation {
        self.next
    }

    /// Returns the issuance log; the key at
    /// position `i` received innovation number `i`.
    pub fn issued(&self) -> &[StructuralKey] {
        &self.issued
    }

    /// Issues the innovations of the canonical minimal topology
    /// and returns `population_size` structurally identical
    /// templates with all parameters set to zero.
    ///
    /// Numbers are issued in the order: one node per input,
    /// the bias node, one node per output, one link per
    /// (input, output) pair, and with feature selection one
    /// feature per input followed by the extra features.
    /// Calling this again on the same registry reuses the
    /// same numbers.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::InnovationRegistry;
    ///
    /// let mut registry = InnovationRegistry::new();
    /// let templates = registry.initialize_innovations(4, 2, 1, false, 0).unwrap();
    ///
    /// assert_eq!(templates.len(), 4);
    /// // 2 inputs + bias + 1 output + 2 links.
    /// assert_eq!(templates[0].len(), 6);
    /// assert_eq!(registry.next_free(), 6);
    /// ```
    pub fn initialize_innovations(
        &mut self,
        population_size: usize,
        inputs: usize,
        outputs: usize,
        feature_selection: bool,
        extra_features: usize,
    ) -> Result<Vec<Genome>, ConfigurationError> {
        if population_size == 0 {
            return Err(ConfigurationError::MissingParameter("population_size"));
        }
        if inputs == 0 {
            return Err(ConfigurationError::MissingParameter("input_count"));
        }
        if outputs == 0 {
            return Err(ConfigurationError::MissingParameter("output_count"));
        }

        let mut genes = Vec::new();
        let node = |registry: &mut Self, role, index| {
            let innovation = registry.next_innovation(StructuralKey::Template { role, index });
            NodeGene::new(innovation, role, 0.0, 0.0)
        };
        let input_nodes: Vec<_> = (0..inputs).map(|i| node(self, NodeRole::Input, i)).collect();
        let bias_node = node(self, NodeRole::Bias, 0);
        let output_nodes: Vec<_> = (0..outputs)
            .map(|o| node(self, NodeRole::Output, o))
            .collect();

        let mut links = Vec::with_capacity(inputs * outputs);
        for input in &input_nodes {
            for output in &output_nodes {
                let key = StructuralKey::Link {
                    from: input.id(),
                    to: output.id(),
                };
                links.push(LinkGene::new(
                    self.next_innovation(key),
                    input.id(),
                    output.id(),
                    0.0,
                ));
            }
        }

        genes.extend(input_nodes.into_iter().map(Gene::Node));
        genes.push(Gene::Node(bias_node));
        genes.extend(output_nodes.into_iter().map(Gene::Node));
        genes.extend(links.into_iter().map(Gene::Link));
        if feature_selection {
            for index in 0..inputs + extra_features {
                let innovation = self.next_innovation(StructuralKey::Feature { index });
                genes.push(Gene::Feature(FeatureGene::new(innovation, index, 0.0)));
            }
        }

        let template = Genome::from_genes(0, genes);
        Ok((0..population_size)
            .map(|id| template.with_id(id))
            .collect())
    }
}
