//! Packed weight/bias layout law (SPEC_FULL.md §3): for every layer L,
//! `layer_weight_offset(L)` equals the cumulative Σ formula, and the total
//! tensor length a registered handle reports matches it exactly.

use std::sync::Arc;

use macadamy::device::cpu::CpuDevice;
use macadamy::network::{Activation, LayerConfig, Network, NetworkFactory};
use macadamy::NetworkResourceHandle;

fn three_layer_network() -> Network {
    let layers = vec![
        LayerConfig { activation: Activation::ReLU, neuron_count: 8 },
        LayerConfig { activation: Activation::Tanh, neuron_count: 5 },
        LayerConfig { activation: Activation::Sigmoid, neuron_count: 3 },
    ];
    NetworkFactory::build("layout", 10, layers, None).unwrap()
}

#[test]
fn layer_offsets_follow_cumulative_sum_formula() {
    let net = three_layer_network();
    let expected_0 = 0u64;
    let expected_1 = 8 * (10 + 1);
    let expected_2 = expected_1 + 5 * (8 + 1);

    assert_eq!(net.layer_weight_offset(0), expected_0);
    assert_eq!(net.layer_weight_offset(1), expected_1);
    assert_eq!(net.layer_weight_offset(2), expected_2);

    let total = expected_2 + 3 * (5 + 1);
    assert_eq!(net.data.len() as u64, total);
}

#[test]
fn registered_handle_tensor_length_matches_packed_layout() {
    let net = three_layer_network();
    let device = Arc::new(CpuDevice::new());
    let handle = NetworkResourceHandle::register(device, &net).unwrap();
    assert_eq!(handle.tensor_len_floats(), net.data.len() as u64);
    assert_eq!(handle.input_count(), net.input_count);
    assert_eq!(handle.output_count(), net.output_count());
}

#[test]
fn single_layer_network_has_no_offset() {
    let layers = vec![LayerConfig { activation: Activation::Identity, neuron_count: 4 }];
    let net = NetworkFactory::build("single", 3, layers, None).unwrap();
    assert_eq!(net.layer_weight_offset(0), 0);
    assert_eq!(net.data.len(), 4 * (3 + 1));
}
