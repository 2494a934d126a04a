pub mod activations;

pub use activations::{activation, activation_prime, cost_delta};
