pub mod device;
pub mod errors;
pub mod math;
pub mod network;
pub mod resource_handle;
pub mod tasks;
pub mod training;

pub use errors::{EngineError, EngineResult};
pub use network::{Activation, LayerConfig, Network, NetworkFactory};
pub use resource_handle::NetworkResourceHandle;
pub use tasks::ComputeTasks;
pub use training::{CostFunction, Regularization, TrainingData, TrainingSuite};
