use crate::{GenomeId, Innovation, NodeId};

use thiserror::Error;

/// A genome whose genes do not form a valid network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// A link names a node that is not in the genome.
    #[error("link {link} refers to missing node {node}")]
    DanglingLink { link: Innovation, node: NodeId },
    /// The same innovation number appears twice.
    #[error("duplicate gene with innovation {0}")]
    DuplicateInnovation(Innovation),
    /// Two link genes connect the same pair of nodes.
    #[error("links {first} and {second} share endpoints {from} -> {to}")]
    DuplicateEndpoints {
        first: Innovation,
        second: Innovation,
        from: NodeId,
        to: NodeId,
    },
}

/// A genome's fitness was set twice in the same generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fitness of genome {0} already assigned")]
pub struct FitnessAlreadyAssigned(pub GenomeId);

/// A structural mutation that could not be carried out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// Node addition needs an enabled link to split.
    #[error("node mutation on genome without enabled links")]
    NoEnabledLink,
    /// Link addition found no unconnected pair of nodes.
    #[error("link mutation on fully-connected genome")]
    FullyConnected,
}
