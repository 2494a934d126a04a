//! `NetworkResourceHandle` (SPEC_FULL.md §3 / §4.7): the per-(network,
//! device) owner of every device buffer a [`crate::tasks::ComputeTasks`]
//! dispatch touches. Buffers are lazily allocated and the handle tracks
//! which scratch tier it has reached so callers can tell what is safe to
//! use without re-deriving it from buffer presence.

use std::sync::Arc;

use crate::device::{Buffer, BufferUsage, ComputeDevice};
use crate::errors::{EngineError, EngineResult};
use crate::network::{LayerConfigBuffer, Network};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Registered,
    EvalReady,
    TrainingReady,
    MutationReady,
}

/// Device buffers bound to one `(Network, ComputeDevice)` pair. Dropping the
/// handle drops every buffer it owns; it must be dropped before the
/// `Network` or `ComputeDevice` it references outlive it in spirit, though
/// Rust's ownership model makes that an API-usage discipline rather than
/// something the type system enforces here — the handle only borrows
/// neither, it owns independent device-side copies.
pub struct NetworkResourceHandle {
    device: Arc<dyn ComputeDevice>,
    input_count: u32,
    output_count: u32,
    max_neurons_per_layer: u32,
    total_neuron_count: u64,
    state: ResourceState,

    pub(crate) tensor: Box<dyn Buffer>,
    pub(crate) layer_config: Box<dyn Buffer>,

    eval_ping: Option<Box<dyn Buffer>>,
    eval_pong: Option<Box<dyn Buffer>>,
    eval_capacity: u32,

    training_input: Option<Box<dyn Buffer>>,
    training_desired_output: Option<Box<dyn Buffer>>,
    activations: Option<Box<dyn Buffer>>,
    zvalues: Option<Box<dyn Buffer>>,
    delta_k_a: Option<Box<dyn Buffer>>,
    delta_k_b: Option<Box<dyn Buffer>>,
    gradient: Option<Box<dyn Buffer>>,
    training_capacity: u64,

    mutation: Option<Box<dyn Buffer>>,
}

impl NetworkResourceHandle {
    /// Registers `network` on `device`: uploads `tensor` and `layer_config`.
    /// This is the only way to construct a handle — it always starts in
    /// `Registered` state.
    pub fn register(device: Arc<dyn ComputeDevice>, network: &Network) -> EngineResult<Self> {
        let tensor_bytes = crate::device::f32_to_bytes(&network.data);
        let tensor = device.create_buffer(tensor_bytes.len() as u64, BufferUsage::ReadWrite, "tensor")?;
        device.queue_write(tensor.as_ref(), &tensor_bytes, 0)?;

        let config = LayerConfigBuffer::from_network(network);
        let config_bytes = crate::device::u32_to_bytes(&config.0);
        let layer_config = device.create_buffer(config_bytes.len() as u64, BufferUsage::ReadOnly, "layer_config")?;
        device.queue_write(layer_config.as_ref(), &config_bytes, 0)?;

        device.submit()?;
        device.wait_idle()?;

        Ok(Self {
            device,
            input_count: network.input_count,
            output_count: network.output_count(),
            max_neurons_per_layer: network.max_neurons_per_layer().max(network.input_count),
            total_neuron_count: network.layers.iter().map(|l| l.neuron_count as u64).sum(),
            state: ResourceState::Registered,
            tensor,
            layer_config,
            eval_ping: None,
            eval_pong: None,
            eval_capacity: 0,
            training_input: None,
            training_desired_output: None,
            activations: None,
            zvalues: None,
            delta_k_a: None,
            delta_k_b: None,
            gradient: None,
            training_capacity: 0,
            mutation: None,
        })
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn device(&self) -> &Arc<dyn ComputeDevice> {
        &self.device
    }

    pub fn input_count(&self) -> u32 {
        self.input_count
    }

    pub fn output_count(&self) -> u32 {
        self.output_count
    }

    pub fn tensor_len_floats(&self) -> u64 {
        self.tensor.size_bytes() / 4
    }

    /// Ensures `eval_ping`/`eval_pong` exist and are large enough for
    /// `batch` samples. Re-allocates only when growing.
    pub fn allocate_eval_resources(&mut self, batch: u32) -> EngineResult<()> {
        if self.eval_ping.is_none() || self.eval_pong.is_none() || batch > self.eval_capacity {
            let width = self.max_neurons_per_layer.max(self.input_count) as u64;
            let size = width * batch as u64 * 4;
            self.eval_ping = Some(self.device.create_buffer(size, BufferUsage::ReadWrite, "eval_ping")?);
            self.eval_pong = Some(self.device.create_buffer(size, BufferUsage::ReadWrite, "eval_pong")?);
            self.eval_capacity = batch;
        }
        if self.state == ResourceState::Registered {
            self.state = ResourceState::EvalReady;
        }
        Ok(())
    }

    pub fn eval_buffers(&self) -> EngineResult<(&dyn Buffer, &dyn Buffer)> {
        match (&self.eval_ping, &self.eval_pong) {
            (Some(a), Some(b)) => Ok((a.as_ref(), b.as_ref())),
            _ => Err(EngineError::InvalidArgument(
                "eval resources not allocated; call allocate_eval_resources first".into(),
            )),
        }
    }

    /// Ensures every training buffer exists, sized for `max_minibatch_size`
    /// samples. This is the "allocated once per epoch" step the
    /// orchestrator performs ahead of any `TrainMinibatch` call.
    pub fn allocate_training_resources(&mut self, max_minibatch_size: u64) -> EngineResult<()> {
        if self.training_input.is_none() || max_minibatch_size > self.training_capacity {
            let s = max_minibatch_size;
            let total_neurons = self.total_neuron_count;
            let max_neurons = self.max_neurons_per_layer as u64;

            self.training_input =
                Some(self.device.create_buffer(s * self.input_count as u64 * 4, BufferUsage::ReadWrite, "training_input")?);
            self.training_desired_output = Some(self.device.create_buffer(
                s * self.output_count as u64 * 4,
                BufferUsage::ReadWrite,
                "training_desired_output",
            )?);
            self.activations =
                Some(self.device.create_buffer(s * total_neurons * 4, BufferUsage::ReadWrite, "activations")?);
            self.zvalues = Some(self.device.create_buffer(s * total_neurons * 4, BufferUsage::ReadWrite, "zvalues")?);
            self.delta_k_a =
                Some(self.device.create_buffer(s * max_neurons * 4, BufferUsage::ReadWrite, "delta_k_a")?);
            self.delta_k_b =
                Some(self.device.create_buffer(s * max_neurons * 4, BufferUsage::ReadWrite, "delta_k_b")?);
            self.gradient = Some(self.device.create_buffer(self.tensor.size_bytes(), BufferUsage::ReadWrite, "gradient")?);
            self.training_capacity = s;
        }
        if self.state == ResourceState::Registered || self.state == ResourceState::EvalReady {
            self.state = ResourceState::TrainingReady;
        }
        Ok(())
    }

    pub fn training_buffers(
        &self,
    ) -> EngineResult<(
        &dyn Buffer,
        &dyn Buffer,
        &dyn Buffer,
        &dyn Buffer,
        &dyn Buffer,
        &dyn Buffer,
        &dyn Buffer,
    )> {
        match (
            &self.training_input,
            &self.training_desired_output,
            &self.activations,
            &self.zvalues,
            &self.delta_k_a,
            &self.delta_k_b,
            &self.gradient,
        ) {
            (Some(i), Some(d), Some(a), Some(z), Some(da), Some(db), Some(g)) => {
                Ok((i.as_ref(), d.as_ref(), a.as_ref(), z.as_ref(), da.as_ref(), db.as_ref(), g.as_ref()))
            }
            _ => Err(EngineError::InvalidArgument(
                "training resources not allocated; call allocate_training_resources first".into(),
            )),
        }
    }

    pub fn allocate_mutation_resources(&mut self) -> EngineResult<()> {
        if self.mutation.is_none() {
            self.mutation = Some(self.device.create_buffer(self.tensor.size_bytes(), BufferUsage::ReadWrite, "mutation")?);
        }
        self.state = ResourceState::MutationReady;
        Ok(())
    }

    pub fn mutation_buffer(&self) -> EngineResult<&dyn Buffer> {
        self.mutation
            .as_deref()
            .ok_or_else(|| EngineError::InvalidArgument("mutation buffer not allocated".into()))
    }

    /// Reads `tensor` back into `network.data`. Callable in any state.
    pub fn synchronize_network_data(&self, network: &mut Network) -> EngineResult<()> {
        let mut bytes = vec![0u8; self.tensor.size_bytes() as usize];
        self.device.queue_read(self.tensor.as_ref(), &mut bytes, 0)?;
        self.device.wait_idle()?;
        network.data = crate::device::bytes_to_f32(&bytes);
        Ok(())
    }

    /// Drops every scratch buffer, returning to `Registered`. `tensor` and
    /// `layer_config` survive — they are not scratch.
    pub fn free_cached_resources(&mut self) {
        self.eval_ping = None;
        self.eval_pong = None;
        self.eval_capacity = 0;
        self.training_input = None;
        self.training_desired_output = None;
        self.activations = None;
        self.zvalues = None;
        self.delta_k_a = None;
        self.delta_k_b = None;
        self.gradient = None;
        self.training_capacity = 0;
        self.mutation = None;
        self.state = ResourceState::Registered;
    }
}
