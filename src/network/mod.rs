//! Network topology and the packed weight/bias layout that every compute
//! backend addresses. See SPEC_FULL.md §3 for the normative layout.

pub mod init;
pub mod io;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use init::WeightInitializer;

/// Scalar activation function attached to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Sigmoid,
    ReLU,
    Tanh,
    LeakyReLU,
    Identity,
    Threshold,
    SoftPlus,
    ArcTan,
}

impl Activation {
    /// Stable numeric id used by the binary format and the device-side
    /// `LayerConfigBuffer`. Do not reorder — it is part of the wire format.
    pub fn id(self) -> u32 {
        match self {
            Activation::Sigmoid => 0,
            Activation::ReLU => 1,
            Activation::Tanh => 2,
            Activation::LeakyReLU => 3,
            Activation::Identity => 4,
            Activation::Threshold => 5,
            Activation::SoftPlus => 6,
            Activation::ArcTan => 7,
        }
    }

    pub fn from_id(id: u32) -> EngineResult<Self> {
        Ok(match id {
            0 => Activation::Sigmoid,
            1 => Activation::ReLU,
            2 => Activation::Tanh,
            3 => Activation::LeakyReLU,
            4 => Activation::Identity,
            5 => Activation::Threshold,
            6 => Activation::SoftPlus,
            7 => Activation::ArcTan,
            other => {
                return Err(EngineError::InvalidArgument(format!(
                    "unknown activation id {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerConfig {
    pub activation: Activation,
    pub neuron_count: u32,
}

/// A dense feed-forward network: immutable topology plus a mutable packed
/// weight/bias buffer. See SPEC_FULL.md §3 for the packed layout contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub description: Option<String>,
    pub input_count: u32,
    pub layers: Vec<LayerConfig>,
    pub data: Vec<f32>,
}

/// Binary serialization format version. Bump only if the wire layout changes.
pub const BINARY_VERSION: u32 = 1;

impl Network {
    /// Number of weights feeding into layer `layer_id` (0-based): the input
    /// count for layer 0, or the previous layer's neuron count otherwise.
    pub fn weights_per_neuron(&self, layer_id: usize) -> u32 {
        if layer_id == 0 {
            self.input_count
        } else {
            self.layers[layer_id - 1].neuron_count
        }
    }

    /// Offset, in floats, to the start of layer `layer_id`'s packed weights.
    pub fn layer_weight_offset(&self, layer_id: usize) -> u64 {
        let mut offset = 0u64;
        for i in 0..layer_id {
            let neurons = self.layers[i].neuron_count as u64;
            let weights_per_neuron = self.weights_per_neuron(i) as u64;
            offset += neurons * (weights_per_neuron + 1);
        }
        offset
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn output_count(&self) -> u32 {
        self.layers.last().map(|l| l.neuron_count).unwrap_or(0)
    }

    pub fn max_neurons_per_layer(&self) -> u32 {
        self.layers.iter().map(|l| l.neuron_count).max().unwrap_or(0)
    }

    /// Total number of packed floats the layout of SPEC_FULL.md §3 requires.
    pub fn expected_data_len(input_count: u32, layers: &[LayerConfig]) -> u64 {
        let mut total = 0u64;
        let mut prev = input_count as u64;
        for layer in layers {
            let neurons = layer.neuron_count as u64;
            total += neurons * (prev + 1);
            prev = neurons;
        }
        total
    }

    /// Regenerates the packed weight/bias buffer in layer-then-neuron order.
    /// The draw order (weight-then-bias, neuron-by-neuron, layer-by-layer)
    /// is mandatory: it is what makes a seeded initializer reproducible.
    pub fn generate_random_weights(&mut self, initializer: &mut dyn WeightInitializer) {
        let mut idx = 0usize;
        for layer_id in 0..self.layers.len() {
            let weights_per_neuron = self.weights_per_neuron(layer_id) as usize;
            let neurons = self.layers[layer_id].neuron_count as usize;
            for _ in 0..neurons {
                for _ in 0..weights_per_neuron {
                    self.data[idx] = initializer.random_weight(weights_per_neuron as u32);
                    idx += 1;
                }
                self.data[idx] = initializer.random_bias();
                idx += 1;
            }
        }
    }
}

pub struct NetworkFactory;

impl NetworkFactory {
    /// Validates topology, computes the packed data length per SPEC_FULL.md
    /// §3, and allocates `data` zero-initialized (or from `initial_data` if
    /// supplied, provided it matches the computed length exactly).
    pub fn build(
        name: impl Into<String>,
        input_count: u32,
        layers: Vec<LayerConfig>,
        initial_data: Option<Vec<f32>>,
    ) -> EngineResult<Network> {
        if input_count < 1 {
            return Err(EngineError::InvalidArgument(
                "input_count must be >= 1".into(),
            ));
        }
        if layers.is_empty() {
            return Err(EngineError::InvalidArgument(
                "a network needs at least one layer".into(),
            ));
        }
        for layer in &layers {
            if layer.neuron_count < 1 {
                return Err(EngineError::InvalidArgument(
                    "every layer needs at least one neuron".into(),
                ));
            }
        }

        let expected_len = Network::expected_data_len(input_count, &layers);
        let data = match initial_data {
            Some(d) => {
                if d.len() as u64 != expected_len {
                    return Err(EngineError::InvalidArgument(format!(
                        "initial_data has {} floats, expected {expected_len}",
                        d.len()
                    )));
                }
                d
            }
            None => vec![0.0f32; expected_len as usize],
        };

        Ok(Network {
            name: name.into(),
            description: None,
            input_count,
            layers,
            data,
        })
    }
}

/// Device-side mirror of the topology: `[input_count, 0, neurons_0,
/// activation_0, neurons_1, activation_1, ...]`. The leading pseudo-layer
/// keeps every entry two-wide, which is what offset arithmetic on the
/// device wants.
#[derive(Debug, Clone)]
pub struct LayerConfigBuffer(pub Vec<u32>);

impl LayerConfigBuffer {
    pub fn from_network(network: &Network) -> Self {
        let mut buf = Vec::with_capacity(2 + network.layers.len() * 2);
        buf.push(network.input_count);
        buf.push(0);
        for layer in &network.layers {
            buf.push(layer.neuron_count);
            buf.push(layer.activation.id());
        }
        LayerConfigBuffer(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layers() -> Vec<LayerConfig> {
        vec![
            LayerConfig { activation: Activation::Sigmoid, neuron_count: 4 },
            LayerConfig { activation: Activation::ReLU, neuron_count: 15 },
            LayerConfig { activation: Activation::Sigmoid, neuron_count: 2 },
        ]
    }

    #[test]
    fn layout_law_matches_formula() {
        let net = NetworkFactory::build("t", 5, sample_layers(), None).unwrap();
        let expected: u64 = 4 * (5 + 1) + 15 * (4 + 1) + 2 * (15 + 1);
        assert_eq!(net.data.len() as u64, expected);
        assert_eq!(Network::expected_data_len(5, &net.layers), expected);
    }

    #[test]
    fn rejects_empty_layers() {
        let err = NetworkFactory::build("t", 5, vec![], None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_zero_input_count() {
        let err = NetworkFactory::build("t", 0, sample_layers(), None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn layer_offsets_are_cumulative() {
        let net = NetworkFactory::build("t", 5, sample_layers(), None).unwrap();
        assert_eq!(net.layer_weight_offset(0), 0);
        assert_eq!(net.layer_weight_offset(1), 4 * (5 + 1));
        assert_eq!(net.layer_weight_offset(2), 4 * (5 + 1) + 15 * (4 + 1));
    }

    #[test]
    fn layer_config_buffer_layout() {
        let net = NetworkFactory::build("t", 5, sample_layers(), None).unwrap();
        let buf = LayerConfigBuffer::from_network(&net);
        assert_eq!(buf.0[0], 5);
        assert_eq!(buf.0[1], 0);
        assert_eq!(buf.0[2], 4);
        assert_eq!(buf.0[3], Activation::Sigmoid.id());
    }
}
