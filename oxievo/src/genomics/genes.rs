use crate::{Innovation, NodeId};

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Function of a node within the network it encodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum NodeRole {
    Input,
    Hidden,
    Output,
    Bias,
}

impl NodeRole {
    /// Whether links may point into nodes of this role.
    pub fn accepts_links(self) -> bool {
        matches!(self, NodeRole::Hidden | NodeRole::Output)
    }
}

/// A network node. The node's id is the
/// innovation number of the gene that created it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct NodeGene {
    innovation: Innovation,
    role: NodeRole,
    bias: f32,
    parameter: f32,
}

impl NodeGene {
    /// Returns a new node gene with the specified parameters.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::{NodeGene, NodeRole};
    ///
    /// let node = NodeGene::new(7, NodeRole::Hidden, 0.5, 0.0);
    /// assert_eq!(node.id(), 7);
    /// ```
    pub fn new(innovation: Innovation, role: NodeRole, bias: f32, parameter: f32) -> NodeGene {
        NodeGene {
            innovation,
            role,
            bias,
            parameter,
        }
    }

    pub fn innovation(&self) -> Innovation {
        self.innovation
    }

    /// Returns the node's id.
    pub fn id(&self) -> NodeId {
        self.innovation
    }

    /// Returns the node's role.
    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Returns the node's activation bias.
    pub fn bias(&self) -> f32 {
        self.bias
    }

    /// Sets the node's activation bias.
    pub fn set_bias(&mut self, bias: f32) {
        self.bias = bias;
    }

    /// Returns the node's free parameter, used as the
    /// decay rate by continuous-time networks.
    pub fn parameter(&self) -> f32 {
        self.parameter
    }

    /// Sets the node's free parameter.
    pub fn set_parameter(&mut self, parameter: f32) {
        self.parameter = parameter;
    }
}

/// A weighted connection between two nodes.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct LinkGene {
    innovation: Innovation,
    from: NodeId,
    to: NodeId,
    weight: f32,
    enabled: bool,
}

impl LinkGene {
    /// Returns a new _enabled_ link gene with the specified parameters.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::LinkGene;
    ///
    /// let link = LinkGene::new(42, 3, 9, 2.0);
    /// assert_eq!(link.endpoints(), (3, 9));
    /// assert!(link.enabled());
    /// ```
    pub fn new(innovation: Innovation, from: NodeId, to: NodeId, weight: f32) -> LinkGene {
        LinkGene {
            innovation,
            from,
            to,
            weight,
            enabled: true,
        }
    }

    pub fn innovation(&self) -> Innovation {
        self.innovation
    }

    /// Returns the link's source node.
    pub fn from(&self) -> NodeId {
        self.from
    }

    /// Returns the link's target node.
    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Returns the link's `(source, target)` pair.
    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.from, self.to)
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    /// Whether the link is expressed in the phenotype.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Scales one sensor input. Only present when
/// feature selection is enabled.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct FeatureGene {
    innovation: Innovation,
    index: usize,
    weight: f32,
}

impl FeatureGene {
    pub fn new(innovation: Innovation, index: usize, weight: f32) -> FeatureGene {
        FeatureGene {
            innovation,
            index,
            weight,
        }
    }

    pub fn innovation(&self) -> Innovation {
        self.innovation
    }

    /// Returns the index of the input this feature scales.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }
}

/// Genes are the principal components of genomes.
/// Two genes with the same innovation number in any
/// two genomes are homologous.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Gene {
    Node(NodeGene),
    Link(LinkGene),
    Feature(FeatureGene),
}

impl Gene {
    /// Returns the gene's innovation number.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::{Gene, LinkGene};
    ///
    /// let gene = Gene::Link(LinkGene::new(42, 3, 9, 2.0));
    /// assert_eq!(gene.innovation(), 42);
    /// ```
    pub fn innovation(&self) -> Innovation {
        match self {
            Gene::Node(node) => node.innovation,
            Gene::Link(link) => link.innovation,
            Gene::Feature(feature) => feature.innovation,
        }
    }

    /// Copies the innovation number and topology of
    /// `self`, taking the numeric parameters from `params`.
    /// Copied links are always enabled.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::{Gene, GeneParams, LinkGene};
    ///
    /// let template = Gene::Link(LinkGene::new(5, 0, 3, 0.0));
    /// let params = GeneParams { weight: -0.25, ..GeneParams::default() };
    ///
    /// let gene = template.clone_with_innovation(&params);
    /// assert_eq!(gene.innovation(), 5);
    /// assert_eq!(gene.weight(), Some(-0.25));
    /// ```
    pub fn clone_with_innovation(&self, params: &GeneParams) -> Gene {
        match self {
            Gene::Node(node) => Gene::Node(NodeGene {
                bias: params.bias,
                parameter: params.parameter,
                ..node.clone()
            }),
            Gene::Link(link) => Gene::Link(LinkGene {
                weight: params.weight,
                enabled: true,
                ..link.clone()
            }),
            Gene::Feature(feature) => Gene::Feature(FeatureGene {
                weight: params.feature_weight,
                ..feature.clone()
            }),
        }
    }

    /// Returns the gene's weight, if it carries one.
    pub fn weight(&self) -> Option<f32> {
        match self {
            Gene::Node(_) => None,
            Gene::Link(link) => Some(link.weight),
            Gene::Feature(feature) => Some(feature.weight),
        }
    }

    pub fn as_node(&self) -> Option<&NodeGene> {
        match self {
            Gene::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&LinkGene> {
        match self {
            Gene::Link(link) => Some(link),
            _ => None,
        }
    }

    pub fn as_feature(&self) -> Option<&FeatureGene> {
        match self {
            Gene::Feature(feature) => Some(feature),
            _ => None,
        }
    }

    pub(crate) fn as_link_mut(&mut self) -> Option<&mut LinkGene> {
        match self {
            Gene::Link(link) => Some(link),
            _ => None,
        }
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gene::Node(node) => write!(
                f,
                "{}:{:?}(b={:.3}, p={:.3})",
                node.innovation, node.role, node.bias, node.parameter
            ),
            Gene::Link(link) => write!(
                f,
                "{}{}[{}->{}, {:.3}]{}",
                if link.enabled { "" } else { "(" },
                link.innovation,
                link.from,
                link.to,
                link.weight,
                if link.enabled { "" } else { ")" },
            ),
            Gene::Feature(feature) => write!(
                f,
                "{}:f{}[{:.3}]",
                feature.innovation, feature.index, feature.weight
            ),
        }
    }
}

/// Fresh numeric parameters for a gene copied from a template.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct GeneParams {
    pub bias: f32,
    pub parameter: f32,
    pub weight: f32,
    pub feature_weight: f32,
}

impl GeneParams {
    /// Draws parameters for a newly created individual:
    /// bias and link weight uniform in `[-1, 1]`, node
    /// parameter and feature weight uniform in `[0, 1)`.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> GeneParams {
        GeneParams {
            bias: rng.gen_range(-1.0..=1.0),
            parameter: rng.gen_range(0.0..1.0),
            weight: rng.gen_range(-1.0..=1.0),
            feature_weight: rng.gen_range(0.0..1.0),
        }
    }
}
