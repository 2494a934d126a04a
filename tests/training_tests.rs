//! End-to-end training: minibatch SGD via `ComputeTasks::train_minibatch`
//! directly (no orchestrator) must drive down mean squared error on an
//! easy regression task, and mutation must leave outputs unchanged at
//! zero range while perturbing them at nonzero range.

use std::sync::Arc;

use macadamy::device::cpu::CpuDevice;
use macadamy::network::init::XavierInitializer;
use macadamy::network::{Activation, LayerConfig, NetworkFactory};
use macadamy::tasks::ComputeTasks;
use macadamy::training::{CostFunction, Regularization, TrainingData, TrainingSuite};
use macadamy::NetworkResourceHandle;
use rand::SeedableRng;

fn identity_dataset() -> Vec<TrainingData> {
    // Learn y = x for x in a small fixed grid: trivial for a single linear
    // neuron, a good smoke test that gradients actually reduce loss.
    (0..20)
        .map(|i| {
            let x = (i as f32 - 10.0) / 10.0;
            TrainingData { input: vec![x], desired_output: vec![x] }
        })
        .collect()
}

fn mean_squared_error(
    handle: &mut NetworkResourceHandle,
    network: &macadamy::Network,
    data: &[TrainingData],
) -> f64 {
    let mut total = 0.0f64;
    for sample in data {
        let output = ComputeTasks::evaluate(handle, network, &sample.input).unwrap();
        let diff = output[0] as f64 - sample.desired_output[0] as f64;
        total += diff * diff;
    }
    total / data.len() as f64
}

#[test]
fn minibatch_training_reduces_mean_squared_error() {
    let layers = vec![LayerConfig { activation: Activation::Identity, neuron_count: 1 }];
    let mut network = NetworkFactory::build("identity", 1, layers, None).unwrap();
    let mut init = XavierInitializer::with_seed(7);
    network.generate_random_weights(&mut init);

    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &network).unwrap();

    let data = identity_dataset();
    let suite = TrainingSuite {
        training_data: data.clone(),
        mini_batch_size: Some(5),
        learning_rate: 0.5,
        epochs: 1,
        shuffle_training_data: false,
        cost_function: CostFunction::MeanSquared,
        regularization: Regularization::None,
        regularization_lambda: 0.0,
    };

    let before = mean_squared_error(&mut handle, &network, &data);

    handle.allocate_training_resources(5).unwrap();
    let mut begin = 0usize;
    while begin < data.len() {
        let end = (begin + 5).min(data.len());
        for _epoch in 0..200 {
            ComputeTasks::train_minibatch(&mut handle, &network, &suite, begin, end).unwrap();
        }
        begin = end;
    }
    handle.synchronize_network_data(&mut network).unwrap();

    let after = mean_squared_error(&mut handle, &network, &data);
    assert!(after < before, "expected error to drop: before={before} after={after}");
    assert!(after < 0.05, "expected near-convergence on a linear target, got {after}");
}

#[test]
fn zero_range_mutation_leaves_outputs_unchanged() {
    let layers = vec![LayerConfig { activation: Activation::Tanh, neuron_count: 3 }];
    let mut network = NetworkFactory::build("mutate_zero", 2, layers, None).unwrap();
    let mut init = XavierInitializer::with_seed(3);
    network.generate_random_weights(&mut init);

    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &network).unwrap();

    let input = [0.5, -0.2];
    let before = ComputeTasks::evaluate(&mut handle, &network, &input).unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    ComputeTasks::apply_random_mutation(&mut handle, &network, 0.0, 0.0, &mut rng).unwrap();

    let after = ComputeTasks::evaluate(&mut handle, &network, &input).unwrap();
    assert_eq!(before, after);
}

#[test]
fn nonzero_mutation_changes_at_least_one_output() {
    let layers = vec![LayerConfig { activation: Activation::Identity, neuron_count: 2 }];
    let mut network = NetworkFactory::build("mutate_nonzero", 2, layers, None).unwrap();
    let mut init = XavierInitializer::with_seed(11);
    network.generate_random_weights(&mut init);

    let device = Arc::new(CpuDevice::new());
    let mut handle = NetworkResourceHandle::register(device, &network).unwrap();

    let input = [0.5, -0.2];
    let before = ComputeTasks::evaluate(&mut handle, &network, &input).unwrap();

    let mut rng = rand::thread_rng();
    ComputeTasks::apply_random_mutation(&mut handle, &network, 1.0, 1.0, &mut rng).unwrap();

    let after = ComputeTasks::evaluate(&mut handle, &network, &input).unwrap();
    assert_ne!(before, after);
}
