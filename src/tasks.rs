//! `ComputeTasks` (SPEC_FULL.md §4.6): backend-agnostic orchestration of
//! kernel dispatches against a [`NetworkResourceHandle`]. Nothing here
//! touches a backend directly — every numeric step goes through the
//! `ComputeDevice` trait, which is what makes these functions identical
//! whether `handle.device()` is CPU or CUDA.

use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::device::{LayerDispatch, NextLayerDispatch};
use crate::errors::{EngineError, EngineResult};
use crate::network::Network;
use crate::resource_handle::NetworkResourceHandle;
use crate::training::TrainingSuite;

pub struct ComputeTasks;

impl ComputeTasks {
    pub fn evaluate(handle: &mut NetworkResourceHandle, network: &Network, input: &[f32]) -> EngineResult<Vec<f32>> {
        Self::evaluate_batch(handle, network, input, 1)
    }

    #[tracing::instrument(skip(handle, network, input))]
    pub fn evaluate_batch(
        handle: &mut NetworkResourceHandle,
        network: &Network,
        input: &[f32],
        batch: u32,
    ) -> EngineResult<Vec<f32>> {
        let expected = network.input_count as usize * batch as usize;
        if input.len() != expected {
            return Err(EngineError::InvalidArgument(format!(
                "evaluate_batch expected {expected} floats ({batch} x input_count), got {}",
                input.len()
            )));
        }

        handle.allocate_eval_resources(batch)?;
        let device = handle.device().clone();
        let (ping, pong) = handle.eval_buffers()?;

        device.queue_write(ping, &crate::device::f32_to_bytes(input), 0)?;

        let mut reading_ping = true;
        for (layer_id, layer) in network.layers.iter().enumerate() {
            let (src, dst) = if reading_ping { (ping, pong) } else { (pong, ping) };
            let dispatch = LayerDispatch {
                weights_offset: network.layer_weight_offset(layer_id),
                weights_per_neuron: network.weights_per_neuron(layer_id),
                neuron_count: layer.neuron_count,
                activation: layer.activation,
            };
            device.queue_evaluate_layer(handle.tensor.as_ref(), src, dst, dispatch, batch)?;
            reading_ping = !reading_ping;
        }

        device.submit()?;
        device.wait_idle()?;

        let output_buffer = if reading_ping { ping } else { pong };
        let output_len = network.output_count() as usize * batch as usize;
        let mut out = vec![0u8; output_len * 4];
        device.queue_read(output_buffer, &mut out, 0)?;
        device.wait_idle()?;
        Ok(crate::device::bytes_to_f32(&out))
    }

    /// Trains on `training_data[begin..end]`. Requires
    /// `allocate_training_resources` to already have been called for at
    /// least `end - begin` samples; the orchestrator does this once per
    /// epoch, not once per minibatch.
    #[tracing::instrument(skip(handle, network, suite))]
    pub fn train_minibatch(
        handle: &mut NetworkResourceHandle,
        network: &Network,
        suite: &TrainingSuite,
        begin: usize,
        end: usize,
    ) -> EngineResult<()> {
        if !(begin < end && end <= suite.training_data.len()) {
            return Err(EngineError::InvalidArgument(format!(
                "invalid minibatch range [{begin}, {end}) over {} samples",
                suite.training_data.len()
            )));
        }

        let device = handle.device().clone();
        let sample_count = (end - begin) as u32;
        let (training_input, desired_output, activations, zvalues, delta_a, delta_b, gradient) =
            handle.training_buffers()?;

        device.queue_fill(gradient, 0, 0, gradient.size_bytes())?;

        let input_count = network.input_count as usize;
        let output_count = network.output_count() as usize;
        let mut input_host = Vec::with_capacity(sample_count as usize * input_count);
        let mut desired_host = Vec::with_capacity(sample_count as usize * output_count);
        for sample in &suite.training_data[begin..end] {
            input_host.extend_from_slice(&sample.input);
            desired_host.extend_from_slice(&sample.desired_output);
        }
        device.queue_write(training_input, &crate::device::f32_to_bytes(&input_host), 0)?;
        device.queue_write(desired_output, &crate::device::f32_to_bytes(&desired_host), 0)?;

        let total_neurons: u64 = network.layers.iter().map(|l| l.neuron_count as u64).sum();
        let max_neurons = network.max_neurons_per_layer() as u64;
        // Column where layer L's slice starts within a sample's row in the
        // shared `activations`/`zvalues` buffers (they interleave every
        // layer, see crate::device::RowLayout).
        let neuron_offset = |layer_id: usize| -> u64 {
            network.layers[..layer_id].iter().map(|l| l.neuron_count as u64).sum()
        };
        let row_layout_for = |layer_id: usize| -> (crate::device::RowLayout, &dyn crate::device::Buffer) {
            if layer_id == 0 {
                (crate::device::RowLayout::dense(input_count as u64), training_input)
            } else {
                (
                    crate::device::RowLayout { offset: neuron_offset(layer_id - 1), stride: total_neurons },
                    activations,
                )
            }
        };

        // forward pass
        for (layer_id, layer) in network.layers.iter().enumerate() {
            let dispatch = LayerDispatch {
                weights_offset: network.layer_weight_offset(layer_id),
                weights_per_neuron: network.weights_per_neuron(layer_id),
                neuron_count: layer.neuron_count,
                activation: layer.activation,
            };
            let (prev_row, prev) = row_layout_for(layer_id);
            let out_row = crate::device::RowLayout { offset: neuron_offset(layer_id), stride: total_neurons };
            device.queue_train_forward_pass(
                handle.tensor.as_ref(),
                prev,
                activations,
                zvalues,
                dispatch,
                prev_row,
                out_row,
                sample_count,
            )?;
        }

        // backward pass, ping-ponging delta_a/delta_b by layer parity
        let layer_count = network.layer_count();
        for layer_id in (0..layer_count).rev() {
            let layer = &network.layers[layer_id];
            let is_output = layer_id == layer_count - 1;
            let dispatch = LayerDispatch {
                weights_offset: network.layer_weight_offset(layer_id),
                weights_per_neuron: network.weights_per_neuron(layer_id),
                neuron_count: layer.neuron_count,
                activation: layer.activation,
            };
            let next_layer = if is_output {
                NextLayerDispatch { weights_offset: 0, neuron_count: 0 }
            } else {
                NextLayerDispatch {
                    weights_offset: network.layer_weight_offset(layer_id + 1),
                    neuron_count: network.layers[layer_id + 1].neuron_count,
                }
            };
            let (delta_write, delta_read) = if layer_id % 2 == 0 { (delta_b, delta_a) } else { (delta_a, delta_b) };
            let (prev_row, prev_activations) = row_layout_for(layer_id);
            let layer_row = crate::device::RowLayout { offset: neuron_offset(layer_id), stride: total_neurons };

            device.queue_train_backward_pass(
                handle.tensor.as_ref(),
                prev_activations,
                activations,
                zvalues,
                delta_write,
                delta_read,
                gradient,
                desired_output,
                dispatch,
                next_layer,
                prev_row,
                layer_row,
                max_neurons,
                sample_count,
                suite.cost_function,
                is_output,
            )?;
        }

        let terms = suite.regularization_terms();
        let eta = suite.minibatch_learning_rate(end - begin);
        for (layer_id, layer) in network.layers.iter().enumerate() {
            let dispatch = LayerDispatch {
                weights_offset: network.layer_weight_offset(layer_id),
                weights_per_neuron: network.weights_per_neuron(layer_id),
                neuron_count: layer.neuron_count,
                activation: layer.activation,
            };
            device.queue_apply_gradients(handle.tensor.as_ref(), gradient, dispatch, terms.r1, terms.r2, eta)?;
        }

        device.submit()
    }

    /// Adds a uniform random perturbation in `[-weight_range, +weight_range]`
    /// to every weight/bias, via the same `apply_gradients` kernel every
    /// other mutation-free update path uses (η=-1 makes it additive).
    pub fn apply_random_mutation(
        handle: &mut NetworkResourceHandle,
        network: &Network,
        weight_range: f32,
        bias_range: f32,
        rng: &mut impl Rng,
    ) -> EngineResult<()> {
        handle.allocate_mutation_resources()?;
        let device = handle.device().clone();
        let mutation = handle.mutation_buffer()?;

        let weight_dist = Uniform::new_inclusive(-weight_range, weight_range);
        let bias_dist = Uniform::new_inclusive(-bias_range, bias_range);
        let mut host = Vec::with_capacity(network.data.len());
        for layer_id in 0..network.layer_count() {
            let w = network.weights_per_neuron(layer_id) as usize;
            for _ in 0..network.layers[layer_id].neuron_count {
                for _ in 0..w {
                    host.push(weight_dist.sample(rng));
                }
                host.push(bias_dist.sample(rng));
            }
        }

        device.queue_write(mutation, &crate::device::f32_to_bytes(&host), 0)?;

        for layer_id in 0..network.layer_count() {
            let layer = &network.layers[layer_id];
            let dispatch = LayerDispatch {
                weights_offset: network.layer_weight_offset(layer_id),
                weights_per_neuron: network.weights_per_neuron(layer_id),
                neuron_count: layer.neuron_count,
                activation: layer.activation,
            };
            device.queue_apply_gradients(handle.tensor.as_ref(), mutation, dispatch, 1.0, 0.0, -1.0)?;
        }

        device.submit()?;
        device.wait_idle()
    }
}
