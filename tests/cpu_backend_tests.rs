//! CPU backend correctness: hand-computed single-neuron evaluation, the
//! batched-evaluation law (`evaluate_batch` of N samples == N calls to
//! `evaluate`), and the CUDA numeric kernels staying textually in step with
//! `crate::math` (gated behind the `cuda` feature, skipped otherwise).

use std::sync::Arc;

use macadamy::device::cpu::CpuDevice;
use macadamy::network::{Activation, LayerConfig, NetworkFactory};
use macadamy::tasks::ComputeTasks;
use macadamy::NetworkResourceHandle;

#[test]
fn two_layer_network_matches_hand_computed_forward_pass() {
    // input -> 2 neurons (Identity) -> 1 neuron (Identity), fixed weights.
    let layers = vec![
        LayerConfig { activation: Activation::Identity, neuron_count: 2 },
        LayerConfig { activation: Activation::Identity, neuron_count: 1 },
    ];
    // layer 0: neuron0 = [w=1, b=0], neuron1 = [w=2, b=1]
    // layer 1: neuron0 = [w0=1, w1=1, b=0]
    let data = vec![1.0, 0.0, 2.0, 1.0, 1.0, 1.0, 0.0];
    let net = NetworkFactory::build("hand", 1, layers, Some(data)).unwrap();

    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &net).unwrap();

    let output = ComputeTasks::evaluate(&mut handle, &net, &[3.0]).unwrap();
    // layer0: [3.0, 2*3+1=7.0] -> layer1: 3.0 + 7.0 = 10.0
    assert!((output[0] - 10.0).abs() < 1e-5);
}

#[test]
fn batched_evaluation_matches_sequential_single_evaluations() {
    let layers = vec![
        LayerConfig { activation: Activation::Tanh, neuron_count: 4 },
        LayerConfig { activation: Activation::Sigmoid, neuron_count: 2 },
    ];
    let mut net = NetworkFactory::build("batch", 3, layers, None).unwrap();
    let mut init = macadamy::network::init::XavierInitializer::with_seed(123);
    net.generate_random_weights(&mut init);

    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &net).unwrap();

    let inputs: Vec<Vec<f32>> = vec![vec![0.1, 0.2, 0.3], vec![-0.5, 0.0, 0.7], vec![1.0, -1.0, 0.2]];
    let mut sequential = Vec::new();
    for sample in &inputs {
        sequential.extend(ComputeTasks::evaluate(&mut handle, &net, sample).unwrap());
    }

    let flat: Vec<f32> = inputs.iter().flatten().copied().collect();
    let batched = ComputeTasks::evaluate_batch(&mut handle, &net, &flat, inputs.len() as u32).unwrap();

    assert_eq!(sequential.len(), batched.len());
    for (a, b) in sequential.iter().zip(batched.iter()) {
        assert!((a - b).abs() < 1e-5, "sequential={a} batched={b}");
    }
}

#[test]
fn evaluate_rejects_wrong_input_length() {
    let layers = vec![LayerConfig { activation: Activation::Identity, neuron_count: 1 }];
    let net = NetworkFactory::build("wrong_len", 3, layers, None).unwrap();
    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &net).unwrap();

    let err = ComputeTasks::evaluate(&mut handle, &net, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, macadamy::EngineError::InvalidArgument(_)));
}

#[cfg(feature = "cuda")]
#[test]
fn cuda_kernel_source_is_nonempty() {
    assert!(macadamy::device::cuda::kernels::NUMERIC_KERNELS.contains("apply_gradients_kernel"));
}
