//! A Network is a near-isomorphism of a Genome
//! generated as its phenotype, with disabled links
//! being ignored. Links are converted into connections,
//! and node genes into network nodes.
//!
//! Networks are activated once per control step. In
//! the discrete-time variant each node takes its new
//! activation immediately; in the continuous-time
//! variant it relaxes toward it with a per-node time
//! constant encoded by the node gene's parameter.
mod connection;

use crate::DecodeError;
use connection::Connection;
use oxievo::evaluation::Controller;
use oxievo::genomics::{Genome, NodeRole};
use oxievo::NodeId;

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;

/// Slope of the steepened sigmoid used by every neuron.
pub const SIGMOID_SLOPE: f32 = 4.9;

/// How neuron activations evolve in time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Activations are replaced on every pass.
    Discrete,
    /// Activations follow `da/dt = (σ(x) - a) / τ`,
    /// integrated with a fixed `time_step`.
    Continuous { time_step: f32 },
}

/// An arbitrarily-structured, possibly recurrent, neural network.
///
/// Nodes are laid out as inputs, bias, outputs and hidden
/// nodes, each group sorted by node id.
#[derive(Clone, Debug)]
pub struct Network {
    kind: NetworkKind,
    input_count: usize,
    bias_count: usize,
    output_count: usize,
    passes: usize,
    node_ids: Box<[NodeId]>,
    input_scales: Box<[f32]>,
    biases: Box<[f32]>,
    time_constants: Box<[f32]>,
    input_sums: Box<[f32]>,
    activation_levels: Box<[f32]>,
    connections: Box<[Box<[Connection]>]>,
}

impl Network {
    /// Generates a new network from the passed genome,
    /// activated `passes` times per control step.
    ///
    /// Feature genes scale the input of the same index;
    /// features beyond the genome's inputs have no effect
    /// on the network.
    ///
    /// # Errors
    /// Returns an error if the genome has no output nodes
    /// or an enabled link names a missing node.
    ///
    /// # Examples
    /// ```
    /// use oxievo::genomics::InnovationRegistry;
    /// use oxievo_nn::networks::{Network, NetworkKind};
    ///
    /// let mut registry = InnovationRegistry::new();
    /// let template = registry.initialize_innovations(1, 3, 2, false, 0).unwrap().remove(0);
    ///
    /// let network = Network::new(&template, NetworkKind::Discrete, 1).unwrap();
    /// assert_eq!(network.input_count(), 3);
    /// assert_eq!(network.output_count(), 2);
    /// ```
    pub fn new(genome: &Genome, kind: NetworkKind, passes: usize) -> Result<Network, DecodeError> {
        let mut input_nodes = vec![];
        let mut bias_nodes = vec![];
        let mut output_nodes = vec![];
        let mut hidden_nodes = vec![];

        for node in genome.nodes() {
            match node.role() {
                NodeRole::Input => &mut input_nodes,
                NodeRole::Bias => &mut bias_nodes,
                NodeRole::Output => &mut output_nodes,
                NodeRole::Hidden => &mut hidden_nodes,
            }
            .push(node);
        }
        if output_nodes.is_empty() {
            return Err(DecodeError::NoOutputs(genome.id()));
        }
        // Sorting by id makes the resulting network
        // independent of gene order.
        for group in [
            &mut input_nodes,
            &mut bias_nodes,
            &mut output_nodes,
            &mut hidden_nodes,
        ] {
            group.sort_unstable_by_key(|n| n.id());
        }
        let nodes: Vec<_> = input_nodes
            .iter()
            .chain(&bias_nodes)
            .chain(&output_nodes)
            .chain(&hidden_nodes)
            .copied()
            .collect();

        let node_index_from_id: HashMap<_, _, RandomState> =
            nodes.iter().enumerate().map(|(i, n)| (n.id(), i)).collect();
        let mut connections = vec![vec![]; nodes.len()];
        for link in genome.links().filter(|l| l.enabled()) {
            let index = |node| {
                node_index_from_id
                    .get(&node)
                    .copied()
                    .ok_or(DecodeError::DanglingLink {
                        link: link.innovation(),
                        node,
                    })
            };
            let (from, to) = (index(link.from())?, index(link.to())?);
            connections[from].push(Connection::new(to, link.weight()));
        }

        let mut input_scales = vec![1.0; input_nodes.len()];
        for feature in genome.features() {
            if let Some(scale) = input_scales.get_mut(feature.index()) {
                *scale = feature.weight();
            }
        }

        let mut network = Network {
            kind,
            input_count: input_nodes.len(),
            bias_count: bias_nodes.len(),
            output_count: output_nodes.len(),
            passes: passes.max(1),
            node_ids: nodes.iter().map(|n| n.id()).collect(),
            input_scales: input_scales.into(),
            biases: nodes.iter().map(|n| n.bias()).collect(),
            time_constants: nodes.iter().map(|n| time_constant(n.parameter())).collect(),
            input_sums: vec![0.0; nodes.len()].into(),
            activation_levels: vec![0.0; nodes.len()].into(),
            connections: connections.into_iter().map(|v| v.into()).collect(),
        };
        network.clear_state();
        Ok(network)
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn kind(&self) -> NetworkKind {
        self.kind
    }

    /// Ids of the network's nodes, in activation order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Fires all nodes, propagating all activations
    /// (including set inputs), and then computing
    /// new activation levels.
    pub fn activate(&mut self) {
        self.fire_nodes();
        self.compute_activations();
    }

    /// Propagates each node's signal through all its
    /// outgoing connections.
    fn fire_nodes(&mut self) {
        for (activation, output_connections) in self
            .activation_levels
            .iter()
            .zip(self.connections.iter())
        {
            for connection in output_connections.iter() {
                self.input_sums[connection.output] += *activation * connection.weight;
            }
        }
    }

    /// Computes each neuron's activation level
    /// from its input sum.
    fn compute_activations(&mut self) {
        let first_neuron = self.input_count + self.bias_count;
        for (((input_sum, activation_level), bias), tau) in self.input_sums[first_neuron..]
            .iter_mut()
            .zip(&mut self.activation_levels[first_neuron..])
            .zip(&self.biases[first_neuron..])
            .zip(&self.time_constants[first_neuron..])
        {
            let target = sigmoid(*input_sum + bias);
            *activation_level = match self.kind {
                NetworkKind::Discrete => target,
                NetworkKind::Continuous { time_step } => {
                    *activation_level + (target - *activation_level) * (time_step / tau).min(1.0)
                }
            };
            *input_sum = 0.0;
        }
    }

    /// Clears the activation state of all nodes.
    /// Bias nodes always fire at 1.
    pub fn clear_state(&mut self) {
        for (input_sum, activation) in self
            .input_sums
            .iter_mut()
            .zip(self.activation_levels.iter_mut())
        {
            *input_sum = 0.0;
            *activation = 0.0;
        }
        let bias = self.input_count..self.input_count + self.bias_count;
        for activation in &mut self.activation_levels[bias] {
            *activation = 1.0;
        }
    }

    /// Sets the activation level of each input node to the
    /// corresponding value, scaled by its feature weight.
    /// Missing values leave their inputs at zero; surplus
    /// values are ignored.
    pub fn set_inputs(&mut self, values: &[f32]) {
        let inputs = &mut self.activation_levels[..self.input_count];
        inputs.iter_mut().for_each(|level| *level = 0.0);
        for ((level, value), scale) in inputs.iter_mut().zip(values).zip(self.input_scales.iter()) {
            *level = value * scale;
        }
    }

    /// Returns the current output node activation levels.
    pub fn outputs(&self) -> Vec<f32> {
        let first_output = self.input_count + self.bias_count;
        self.activation_levels[first_output..first_output + self.output_count].to_vec()
    }
}

impl Controller for Network {
    fn act(&mut self, sensors: &[f32]) -> Vec<f32> {
        self.set_inputs(sensors);
        for _ in 0..self.passes {
            self.activate();
        }
        self.outputs()
    }

    fn reset(&mut self) {
        self.clear_state();
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, connections) in self.node_ids.iter().zip(self.connections.iter()) {
            writeln!(f, "{}: {:?}", id, connections)?;
        }
        Ok(())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-SIGMOID_SLOPE * x).exp())
}

/// Maps a parameter in [0, 1] to a time constant in [0.1, 10].
fn time_constant(parameter: f32) -> f32 {
    10f32.powf(2.0 * parameter.clamp(0.0, 1.0) - 1.0)
}
