//! The abstract compute-device contract (SPEC_FULL.md §4.2) that CPU and GPU
//! backends both satisfy. No language-level inheritance is used: a
//! `ComputeDevice` is a trait object (a capability set), and every backend
//! bundles its buffers behind the opaque [`Buffer`] trait so there is never
//! a cross-backend cast — only a same-backend downcast at each kernel entry
//! (see SPEC_FULL.md §9).

pub mod config;
pub mod cpu;
pub mod factory;

#[cfg(feature = "cuda")]
pub mod cuda;

use std::any::Any;
use std::fmt;

use crate::errors::EngineResult;
use crate::network::Activation;
use crate::training::CostFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    ReadOnly,
    ReadWrite,
    WriteOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float32,
    Float16,
}

/// An opaque, backend-owned buffer. Buffers returned by a device are only
/// ever passed back to that same device; backends downcast via [`as_any`]
/// at each kernel entry and report `InvalidArgument` on mismatch.
pub trait Buffer: Send + Sync + fmt::Debug {
    fn size_bytes(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

/// Parameters describing one layer's contribution to a kernel dispatch:
/// the packed-layout offset into the tensor buffer, how many weights feed
/// each neuron, how many neurons the layer has, and its activation.
#[derive(Debug, Clone, Copy)]
pub struct LayerDispatch {
    pub weights_offset: u64,
    pub weights_per_neuron: u32,
    pub neuron_count: u32,
    pub activation: Activation,
}

/// Extra parameters `train_backward_pass` needs about the *next* layer
/// (SPEC_FULL.md §4.5) — unused by the kernel when `is_output` is true.
#[derive(Debug, Clone, Copy)]
pub struct NextLayerDispatch {
    pub weights_offset: u64,
    pub neuron_count: u32,
}

/// Where one layer's per-sample row lives within a buffer that interleaves
/// every layer's activations/z-values back to back (`activations` and
/// `zvalues` are shaped `sample_count · total_neurons`, not one buffer per
/// layer): `offset` is the column where this layer's slice starts within a
/// sample's row, `stride` is the row width (`total_neurons`, or
/// `input_count` when addressing `training_input`).
#[derive(Debug, Clone, Copy)]
pub struct RowLayout {
    pub offset: u64,
    pub stride: u64,
}

impl RowLayout {
    pub fn dense(width: u64) -> Self {
        Self { offset: 0, stride: width }
    }
}

/// The backend-abstracted compute target. See SPEC_FULL.md §4.2–§4.5 for the
/// full contract (ordering, dtype support, kernel semantics).
pub trait ComputeDevice: Send + Sync {
    fn create_buffer(&self, size_bytes: u64, usage: BufferUsage, name: &str) -> EngineResult<Box<dyn Buffer>>;

    fn queue_write(&self, buffer: &dyn Buffer, src: &[u8], dst_offset: u64) -> EngineResult<()>;
    fn queue_read(&self, buffer: &dyn Buffer, dst: &mut [u8], src_offset: u64) -> EngineResult<()>;
    fn queue_fill(&self, buffer: &dyn Buffer, pattern: u32, offset: u64, size: u64) -> EngineResult<()>;

    fn submit(&self) -> EngineResult<()>;
    fn wait_idle(&self) -> EngineResult<()>;

    /// `evaluate_layer`: batched forward evaluation of one layer.
    fn queue_evaluate_layer(
        &self,
        tensor: &dyn Buffer,
        input: &dyn Buffer,
        output: &dyn Buffer,
        layer: LayerDispatch,
        batch_count: u32,
    ) -> EngineResult<()>;

    /// `train_forward_pass`: forward pass that also records z-values for
    /// the backward pass.
    #[allow(clippy::too_many_arguments)]
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
    ) -> EngineResult<()>;

    /// `train_backward_pass`: computes this layer's delta and accumulates
    /// its contribution to `gradient`.
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
    ) -> EngineResult<()>;

    /// `apply_gradients`: one SGD (+ regularization) step for one layer.
    #[allow(clippy::too_many_arguments)]
    fn queue_apply_gradients(
        &self,
        tensor: &dyn Buffer,
        gradient: &dyn Buffer,
        layer: LayerDispatch,
        r1: f32,
        r2: f32,
        learning_rate: f32,
    ) -> EngineResult<()>;

    fn device_name(&self) -> String;
    fn total_memory(&self) -> u64;
    fn compute_units(&self) -> u32;
    fn supports_dtype(&self, dtype: DType) -> bool;
}

pub(crate) fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub(crate) fn bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub(crate) fn u32_to_bytes(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
