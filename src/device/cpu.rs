//! The CPU `ComputeDevice` (SPEC_FULL.md §4.3): the reference backend every
//! other backend is tested against. Dispatches execute synchronously under
//! a lock, so `submit`/`wait_idle` are no-ops — by the time `queue_*`
//! returns, the result is already visible to a subsequent `queue_read`.
//! Per-layer kernels parallelize across the batch/sample dimension with
//! rayon when the `rayon` feature is enabled.

use std::any::Any;
use std::sync::Mutex;

use crate::device::{
    bytes_to_f32, f32_to_bytes, Buffer, BufferUsage, ComputeDevice, DType, LayerDispatch,
    NextLayerDispatch, RowLayout,
};
use crate::errors::{EngineError, EngineResult};
use crate::math;
use crate::training::CostFunction;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Debug)]
pub struct CpuBuffer {
    data: Mutex<Vec<u8>>,
    name: String,
}

impl Buffer for CpuBuffer {
    fn size_bytes(&self) -> u64 {
        self.data.lock().expect("cpu buffer lock poisoned").len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast<'a>(buffer: &'a dyn Buffer, stage: &str) -> EngineResult<&'a CpuBuffer> {
    buffer
        .as_any()
        .downcast_ref::<CpuBuffer>()
        .ok_or_else(|| EngineError::backend(stage, "buffer was not created by the CPU device"))
}

/// The reference CPU backend. Holds no device-specific state beyond an
/// advertised name — everything it needs lives in the buffers it hands out.
pub struct CpuDevice {
    name: String,
    compute_units: u32,
}

impl CpuDevice {
    pub fn new() -> Self {
        let compute_units = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        Self { name: "cpu".to_string(), compute_units }
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeDevice for CpuDevice {
    fn create_buffer(&self, size_bytes: u64, _usage: BufferUsage, name: &str) -> EngineResult<Box<dyn Buffer>> {
        Ok(Box::new(CpuBuffer {
            data: Mutex::new(vec![0u8; size_bytes as usize]),
            name: name.to_string(),
        }))
    }

    fn queue_write(&self, buffer: &dyn Buffer, src: &[u8], dst_offset: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_write")?;
        let mut data = buf.data.lock().expect("cpu buffer lock poisoned");
        let start = dst_offset as usize;
        let end = start + src.len();
        if end > data.len() {
            return Err(EngineError::InvalidArgument(format!(
                "queue_write out of bounds on buffer '{}': {end} > {}",
                buf.name,
                data.len()
            )));
        }
        data[start..end].copy_from_slice(src);
        Ok(())
    }

    fn queue_read(&self, buffer: &dyn Buffer, dst: &mut [u8], src_offset: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_read")?;
        let data = buf.data.lock().expect("cpu buffer lock poisoned");
        let start = src_offset as usize;
        let end = start + dst.len();
        if end > data.len() {
            return Err(EngineError::InvalidArgument(format!(
                "queue_read out of bounds on buffer '{}': {end} > {}",
                buf.name,
                data.len()
            )));
        }
        dst.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn queue_fill(&self, buffer: &dyn Buffer, pattern: u32, offset: u64, size: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_fill")?;
        let mut data = buf.data.lock().expect("cpu buffer lock poisoned");
        let pattern_bytes = pattern.to_le_bytes();
        let start = offset as usize;
        let end = start + size as usize;
        if end > data.len() {
            return Err(EngineError::InvalidArgument(format!(
                "queue_fill out of bounds on buffer '{}': {end} > {}",
                buf.name,
                data.len()
            )));
        }
        for (i, byte) in data[start..end].iter_mut().enumerate() {
            *byte = pattern_bytes[i % 4];
        }
        Ok(())
    }

    fn submit(&self) -> EngineResult<()> {
        Ok(())
    }

    fn wait_idle(&self) -> EngineResult<()> {
        Ok(())
    }

    fn queue_evaluate_layer(
        &self,
        tensor: &dyn Buffer,
        input: &dyn Buffer,
        output: &dyn Buffer,
        layer: LayerDispatch,
        batch_count: u32,
    ) -> EngineResult<()> {
        let tensor = downcast(tensor, "evaluate_layer")?;
        let input_buf = downcast(input, "evaluate_layer")?;
        let output_buf = downcast(output, "evaluate_layer")?;

        let weights = bytes_to_f32(&tensor.data.lock().expect("lock"));
        let input_vals = bytes_to_f32(&input_buf.data.lock().expect("lock"));
        let n = layer.neuron_count as usize;
        let w = layer.weights_per_neuron as usize;
        let offset = layer.weights_offset as usize;

        let compute_sample = |b: usize| -> Vec<f32> {
            let sample_in = &input_vals[b * w..(b + 1) * w];
            (0..n)
                .map(|neuron| {
                    let base = offset + neuron * (w + 1);
                    let mut z = weights[base + w];
                    for (k, x) in sample_in.iter().enumerate() {
                        z += weights[base + k] * x;
                    }
                    math::activation(layer.activation, z)
                })
                .collect()
        };

        #[cfg(feature = "rayon")]
        let per_sample: Vec<Vec<f32>> = (0..batch_count as usize).into_par_iter().map(compute_sample).collect();
        #[cfg(not(feature = "rayon"))]
        let per_sample: Vec<Vec<f32>> = (0..batch_count as usize).map(compute_sample).collect();

        let out: Vec<f32> = per_sample.into_iter().flatten().collect();
        let mut out_data = output_buf.data.lock().expect("lock");
        let out_bytes = f32_to_bytes(&out);
        out_data[..out_bytes.len()].copy_from_slice(&out_bytes);
        Ok(())
    }

    fn queue_train_forward_pass(
        &self,
        tensor: &dyn Buffer,
        prev_activations: &dyn Buffer,
        activations: &dyn Buffer,
        zvalues: &dyn Buffer,
        layer: LayerDispatch,
        prev_row: RowLayout,
        out_row: RowLayout,
        sample_count: u32,
    ) -> EngineResult<()> {
        let tensor = downcast(tensor, "train_forward_pass")?;
        let prev = downcast(prev_activations, "train_forward_pass")?;
        let act_out = downcast(activations, "train_forward_pass")?;
        let z_out = downcast(zvalues, "train_forward_pass")?;

        let weights = bytes_to_f32(&tensor.data.lock().expect("lock"));
        let prev_vals = bytes_to_f32(&prev.data.lock().expect("lock"));
        let n = layer.neuron_count as usize;
        let w = layer.weights_per_neuron as usize;
        let offset = layer.weights_offset as usize;
        let prev_stride = prev_row.stride as usize;
        let prev_offset = prev_row.offset as usize;

        let compute_sample = |b: usize| -> (Vec<f32>, Vec<f32>) {
            let row_start = b * prev_stride + prev_offset;
            let sample_in = &prev_vals[row_start..row_start + w];
            let mut z_row = Vec::with_capacity(n);
            let mut a_row = Vec::with_capacity(n);
            for neuron in 0..n {
                let base = offset + neuron * (w + 1);
                let mut z = weights[base + w];
                for (k, x) in sample_in.iter().enumerate() {
                    z += weights[base + k] * x;
                }
                z_row.push(z);
                a_row.push(math::activation(layer.activation, z));
            }
            (z_row, a_row)
        };

        #[cfg(feature = "rayon")]
        let rows: Vec<(Vec<f32>, Vec<f32>)> =
            (0..sample_count as usize).into_par_iter().map(compute_sample).collect();
        #[cfg(not(feature = "rayon"))]
        let rows: Vec<(Vec<f32>, Vec<f32>)> = (0..sample_count as usize).map(compute_sample).collect();

        let out_stride = out_row.stride as usize;
        let out_offset = out_row.offset as usize;
        let mut z_data = z_out.data.lock().expect("lock");
        let mut a_data = act_out.data.lock().expect("lock");
        for (b, (z_row, a_row)) in rows.into_iter().enumerate() {
            let start = (b * out_stride + out_offset) * 4;
            let z_bytes = f32_to_bytes(&z_row);
            z_data[start..start + z_bytes.len()].copy_from_slice(&z_bytes);
            let a_bytes = f32_to_bytes(&a_row);
            a_data[start..start + a_bytes.len()].copy_from_slice(&a_bytes);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn queue_train_backward_pass(
        &self,
        tensor: &dyn Buffer,
        prev_activations: &dyn Buffer,
        layer_activations: &dyn Buffer,
        layer_zvalues: &dyn Buffer,
        delta_write: &dyn Buffer,
        delta_read: &dyn Buffer,
        gradient: &dyn Buffer,
        desired_output: &dyn Buffer,
        layer: LayerDispatch,
        next_layer: NextLayerDispatch,
        prev_row: RowLayout,
        layer_row: RowLayout,
        delta_stride: u64,
        sample_count: u32,
        cost: CostFunction,
        is_output: bool,
    ) -> EngineResult<()> {
        let tensor_buf = downcast(tensor, "train_backward_pass")?;
        let prev_buf = downcast(prev_activations, "train_backward_pass")?;
        let act_buf = downcast(layer_activations, "train_backward_pass")?;
        let z_buf = downcast(layer_zvalues, "train_backward_pass")?;
        let delta_w_buf = downcast(delta_write, "train_backward_pass")?;
        let delta_r_buf = downcast(delta_read, "train_backward_pass")?;
        let gradient_buf = downcast(gradient, "train_backward_pass")?;
        let desired_buf = downcast(desired_output, "train_backward_pass")?;

        let weights = bytes_to_f32(&tensor_buf.data.lock().expect("lock"));
        let prev_vals = bytes_to_f32(&prev_buf.data.lock().expect("lock"));
        let activations = bytes_to_f32(&act_buf.data.lock().expect("lock"));
        let zvalues = bytes_to_f32(&z_buf.data.lock().expect("lock"));
        let desired = bytes_to_f32(&desired_buf.data.lock().expect("lock"));
        let prior_delta = if is_output { Vec::new() } else { bytes_to_f32(&delta_r_buf.data.lock().expect("lock")) };

        let n = layer.neuron_count as usize;
        let w = layer.weights_per_neuron as usize;
        let offset = layer.weights_offset as usize;
        let next_n = next_layer.neuron_count as usize;
        let next_offset = next_layer.weights_offset as usize;
        let output_count = layer.neuron_count as usize;
        let prev_stride = prev_row.stride as usize;
        let prev_offset = prev_row.offset as usize;
        let layer_stride = layer_row.stride as usize;
        let layer_offset = layer_row.offset as usize;
        let delta_stride = delta_stride as usize;

        let compute_sample = |b: usize| -> (Vec<f32>, Vec<f32>) {
            let row = b * layer_stride + layer_offset;
            let mut delta_row = Vec::with_capacity(n);
            for neuron in 0..n {
                let z = zvalues[row + neuron];
                let a = activations[row + neuron];
                let d = if is_output {
                    math::cost_delta(cost, layer.activation, z, a, desired[b * output_count + neuron])
                } else {
                    let mut sum = 0.0f32;
                    for next_neuron in 0..next_n {
                        let weight = weights[next_offset + next_neuron * (n + 1) + neuron];
                        sum += weight * prior_delta[b * delta_stride + next_neuron];
                    }
                    sum * math::activation_prime(layer.activation, z)
                };
                delta_row.push(d);
            }

            let prev_start = b * prev_stride + prev_offset;
            let sample_in = &prev_vals[prev_start..prev_start + w];
            let mut grad_row = Vec::with_capacity(n * (w + 1));
            for neuron in 0..n {
                for x in sample_in {
                    grad_row.push(delta_row[neuron] * x);
                }
                grad_row.push(delta_row[neuron]);
            }
            (delta_row, grad_row)
        };

        #[cfg(feature = "rayon")]
        let rows: Vec<(Vec<f32>, Vec<f32>)> =
            (0..sample_count as usize).into_par_iter().map(compute_sample).collect();
        #[cfg(not(feature = "rayon"))]
        let rows: Vec<(Vec<f32>, Vec<f32>)> = (0..sample_count as usize).map(compute_sample).collect();

        let mut grad_sum = vec![0.0f32; n * (w + 1)];
        let mut delta_data = delta_w_buf.data.lock().expect("lock");
        for (b, (delta_row, grad_row)) in rows.into_iter().enumerate() {
            let start = (b * delta_stride) * 4;
            let delta_bytes = f32_to_bytes(&delta_row);
            delta_data[start..start + delta_bytes.len()].copy_from_slice(&delta_bytes);
            for (acc, v) in grad_sum.iter_mut().zip(grad_row.iter()) {
                *acc += v;
            }
        }
        drop(delta_data);

        let mut gradient_data = gradient_buf.data.lock().expect("lock");
        let mut existing = bytes_to_f32(&gradient_data[offset * 4..(offset + grad_sum.len()) * 4]);
        for (acc, v) in existing.iter_mut().zip(grad_sum.iter()) {
            *acc += v;
        }
        let existing_bytes = f32_to_bytes(&existing);
        gradient_data[offset * 4..offset * 4 + existing_bytes.len()].copy_from_slice(&existing_bytes);
        Ok(())
    }

    fn queue_apply_gradients(
        &self,
        tensor: &dyn Buffer,
        gradient: &dyn Buffer,
        layer: LayerDispatch,
        r1: f32,
        r2: f32,
        learning_rate: f32,
    ) -> EngineResult<()> {
        let tensor_buf = downcast(tensor, "apply_gradients")?;
        let gradient_buf = downcast(gradient, "apply_gradients")?;

        let n = layer.neuron_count as usize;
        let w = layer.weights_per_neuron as usize;
        let offset = layer.weights_offset as usize;
        let len = n * (w + 1);

        let mut tensor_data = tensor_buf.data.lock().expect("lock");
        let gradient_data = gradient_buf.data.lock().expect("lock");

        let mut weights = bytes_to_f32(&tensor_data[offset * 4..(offset + len) * 4]);
        let grads = bytes_to_f32(&gradient_data[offset * 4..(offset + len) * 4]);
        // weights get the SGD step plus L1/L2 shrinkage; the bias only gets SGD.
        for neuron in 0..n {
            let base = neuron * (w + 1);
            for j in 0..w {
                let idx = base + j;
                let mut updated = r1 * weights[idx] - learning_rate * grads[idx];
                if r2 != 0.0 {
                    // three-way sign, not `f32::signum` (which returns 1.0 at
                    // +0.0): must agree with the CUDA kernel's branch.
                    let sign = if updated > 0.0 { 1.0 } else if updated < 0.0 { -1.0 } else { 0.0 };
                    updated -= r2 * sign;
                }
                weights[idx] = updated;
            }
            let bias_idx = base + w;
            weights[bias_idx] -= learning_rate * grads[bias_idx];
        }
        let bytes = f32_to_bytes(&weights);
        tensor_data[offset * 4..offset * 4 + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn total_memory(&self) -> u64 {
        0
    }

    fn compute_units(&self) -> u32 {
        self.compute_units
    }

    fn supports_dtype(&self, dtype: DType) -> bool {
        matches!(dtype, DType::Float32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Activation;

    fn buf(device: &CpuDevice, values: &[f32]) -> Box<dyn Buffer> {
        let b = device.create_buffer(values.len() as u64 * 4, BufferUsage::ReadWrite, "t").unwrap();
        device.queue_write(b.as_ref(), &f32_to_bytes(values), 0).unwrap();
        b
    }

    fn read(device: &CpuDevice, buffer: &dyn Buffer, len: usize) -> Vec<f32> {
        let mut dst = vec![0u8; len * 4];
        device.queue_read(buffer, &mut dst, 0).unwrap();
        bytes_to_f32(&dst)
    }

    #[test]
    fn evaluate_single_neuron_identity_matches_hand_computation() {
        let device = CpuDevice::new();
        // one input, one neuron, weight=2, bias=1, identity activation
        let tensor = buf(&device, &[2.0, 1.0]);
        let input = buf(&device, &[3.0]);
        let output = device.create_buffer(4, BufferUsage::WriteOnly, "out").unwrap();

        let layer = LayerDispatch { weights_offset: 0, weights_per_neuron: 1, neuron_count: 1, activation: Activation::Identity };
        device.queue_evaluate_layer(tensor.as_ref(), input.as_ref(), output.as_ref(), layer, 1).unwrap();

        let result = read(&device, output.as_ref(), 1);
        assert!((result[0] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn apply_gradients_with_identity_regularization_is_plain_sgd() {
        let device = CpuDevice::new();
        let tensor = buf(&device, &[1.0, 0.5]);
        let gradient = buf(&device, &[2.0, -1.0]);
        let layer = LayerDispatch { weights_offset: 0, weights_per_neuron: 1, neuron_count: 1, activation: Activation::Identity };
        device.queue_apply_gradients(tensor.as_ref(), gradient.as_ref(), layer, 1.0, 0.0, 0.1).unwrap();

        let result = read(&device, tensor.as_ref(), 2);
        assert!((result[0] - (1.0 - 0.1 * 2.0)).abs() < 1e-6);
        assert!((result[1] - (0.5 - 0.1 * -1.0)).abs() < 1e-6);
    }

    #[test]
    fn out_of_bounds_write_is_invalid_argument() {
        let device = CpuDevice::new();
        let b = device.create_buffer(4, BufferUsage::ReadWrite, "small").unwrap();
        let err = device.queue_write(b.as_ref(), &[0u8; 8], 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }
}
