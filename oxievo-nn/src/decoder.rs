use crate::networks::{Network, NetworkKind};
use oxievo::evaluation::ControllerDecoder;
use oxievo::genomics::Genome;
use oxievo::{GenomeId, Innovation, NodeId};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A genome that cannot be turned into a network.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("genome {0} has no output nodes")]
    NoOutputs(GenomeId),
    #[error("link {link} refers to missing node {node}")]
    DanglingLink { link: Innovation, node: NodeId },
    #[error("genome {genome} has {found} {what} nodes, the robot has {expected}")]
    Shape {
        genome: GenomeId,
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Decodes genomes into [`Network`] controllers.
///
/// # Examples
/// ```
/// use oxievo::evaluation::{Controller, ControllerDecoder};
/// use oxievo::genomics::InnovationRegistry;
/// use oxievo_nn::{NetworkDecoder, NetworkKind};
///
/// let mut registry = InnovationRegistry::new();
/// let template = registry.initialize_innovations(1, 4, 2, false, 0).unwrap().remove(0);
///
/// let decoder = NetworkDecoder::new(NetworkKind::Discrete).expecting(4, 2);
/// let mut network = decoder.decode(&template).unwrap();
/// assert_eq!(network.act(&[1.0, 0.0, 0.0, 1.0]).len(), 2);
///
/// let mismatched = NetworkDecoder::new(NetworkKind::Discrete).expecting(3, 2);
/// assert!(mismatched.decode(&template).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkDecoder {
    pub kind: NetworkKind,
    /// Activations per control step.
    pub passes: usize,
    /// Required (input, output) counts, if any.
    pub shape: Option<(usize, usize)>,
}

impl NetworkDecoder {
    /// A decoder activating networks once per step,
    /// accepting genomes of any shape.
    pub fn new(kind: NetworkKind) -> NetworkDecoder {
        NetworkDecoder {
            kind,
            passes: 1,
            shape: None,
        }
    }

    pub fn with_passes(self, passes: usize) -> NetworkDecoder {
        NetworkDecoder { passes, ..self }
    }

    /// Rejects genomes whose input or output counts
    /// differ from the robot's sensors and actuators.
    pub fn expecting(self, inputs: usize, outputs: usize) -> NetworkDecoder {
        NetworkDecoder {
            shape: Some((inputs, outputs)),
            ..self
        }
    }
}

impl ControllerDecoder for NetworkDecoder {
    type Controller = Network;
    type Error = DecodeError;

    fn decode(&self, genome: &Genome) -> Result<Network, DecodeError> {
        let network = Network::new(genome, self.kind, self.passes)?;
        if let Some((inputs, outputs)) = self.shape {
            for (what, expected, found) in [
                ("input", inputs, network.input_count()),
                ("output", outputs, network.output_count()),
            ] {
                if expected != found {
                    return Err(DecodeError::Shape {
                        genome: genome.id(),
                        what,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxievo::evaluation::Controller;
    use oxievo::genomics::{add_node, InnovationRegistry};
    use oxievo::SeededRng;

    use rand::SeedableRng;

    fn template(registry: &mut InnovationRegistry) -> Genome {
        registry
            .initialize_innovations(1, 2, 1, false, 0)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn shape_mismatch_names_the_side() {
        let mut registry = InnovationRegistry::new();
        let genome = template(&mut registry);
        let decoder = NetworkDecoder::new(NetworkKind::Discrete).expecting(2, 3);
        assert_eq!(
            decoder.decode(&genome).unwrap_err().to_string(),
            "genome 0 has 1 output nodes, the robot has 3"
        );
    }

    #[test]
    fn rewire_replaces_structure() {
        let mut registry = InnovationRegistry::new();
        let genome = template(&mut registry);
        let mut rng = SeededRng::seed_from_u64(1);
        let grown = add_node(&genome, &mut registry, &mut rng).unwrap();

        let decoder = NetworkDecoder::new(NetworkKind::Continuous { time_step: 0.1 }).with_passes(2);
        let mut network = decoder.decode(&genome).unwrap();
        assert_eq!(network.node_ids().len(), 4);
        network.act(&[1.0, 1.0]);

        decoder.rewire(&mut network, &grown).unwrap();
        assert_eq!(network.node_ids().len(), 5);
        assert_eq!(network.kind(), NetworkKind::Continuous { time_step: 0.1 });
    }

    #[test]
    fn decoder_config_deserializes() {
        let decoder: NetworkDecoder = serde_json::from_str(
            r#"{"kind": {"Continuous": {"time_step": 0.05}}, "passes": 3, "shape": [4, 2]}"#,
        )
        .unwrap();
        assert_eq!(
            decoder,
            NetworkDecoder::new(NetworkKind::Continuous { time_step: 0.05 })
                .with_passes(3)
                .expecting(4, 2)
        );
    }
}
