//! The eight scalar activations and their derivatives, plus the two cost
//! deltas, exactly as specified in SPEC_FULL.md §4.5. Every backend's
//! kernels must reproduce these at float32 precision; this module is the
//! single source of truth both backends are tested against (see
//! `tests/cpu_backend_tests.rs`) and the CUDA kernel source embeds the same
//! formulas in C (`device::cuda::kernels`).

use crate::network::Activation;
use crate::training::CostFunction;

pub fn activation(act: Activation, x: f32) -> f32 {
    match act {
        Activation::Sigmoid => sigmoid(x),
        Activation::ReLU => x.max(0.0),
        Activation::Tanh => 2.0 * sigmoid(2.0 * x) - 1.0,
        Activation::LeakyReLU => if x < 0.0 { 0.01 * x } else { x },
        Activation::Identity => x,
        Activation::Threshold => if x < 0.0 { 0.0 } else { 1.0 },
        Activation::SoftPlus => (1.0 + x.exp()).ln(),
        Activation::ArcTan => x.atan(),
    }
}

pub fn activation_prime(act: Activation, x: f32) -> f32 {
    match act {
        Activation::Sigmoid => {
            let s = sigmoid(x);
            s * (1.0 - s)
        }
        Activation::ReLU => if x < 0.0 { 0.0 } else { 1.0 },
        Activation::Tanh => {
            let t = activation(Activation::Tanh, x);
            1.0 - t * t
        }
        Activation::LeakyReLU => if x < 0.0 { 0.01 } else { 1.0 },
        Activation::Identity => 1.0,
        Activation::Threshold => 0.0,
        Activation::SoftPlus => sigmoid(x),
        Activation::ArcTan => 1.0 / (x * x + 1.0),
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Seed value for backpropagation at the output layer: dCost/dz.
///
/// `CrossEntropy_Sigmoid` is only meaningful when `act == Sigmoid`; per
/// SPEC_FULL.md's Open Questions the behavior with another activation is
/// deliberately left undefined but must not crash, so it falls back to the
/// same `a - target` expression regardless of `act`.
pub fn cost_delta(cost: CostFunction, act: Activation, z: f32, a: f32, target: f32) -> f32 {
    match cost {
        CostFunction::MeanSquared => (a - target) * activation_prime(act, z),
        CostFunction::CrossEntropySigmoid => a - target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_matches_closed_form() {
        assert!((activation(Activation::Sigmoid, 0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn relu_zeroes_negatives() {
        assert_eq!(activation(Activation::ReLU, -3.0), 0.0);
        assert_eq!(activation(Activation::ReLU, 3.0), 3.0);
        assert_eq!(activation_prime(Activation::ReLU, -1.0), 0.0);
        assert_eq!(activation_prime(Activation::ReLU, 1.0), 1.0);
    }

    #[test]
    fn tanh_matches_std_tanh() {
        let x = 0.73f32;
        assert!((activation(Activation::Tanh, x) - x.tanh()).abs() < 1e-5);
    }

    #[test]
    fn leaky_relu_slope() {
        assert!((activation(Activation::LeakyReLU, -2.0) - (-0.02)).abs() < 1e-6);
        assert_eq!(activation_prime(Activation::LeakyReLU, -2.0), 0.01);
        assert_eq!(activation_prime(Activation::LeakyReLU, 2.0), 1.0);
    }

    #[test]
    fn threshold_step() {
        assert_eq!(activation(Activation::Threshold, -0.1), 0.0);
        assert_eq!(activation(Activation::Threshold, 0.1), 1.0);
        assert_eq!(activation_prime(Activation::Threshold, 0.1), 0.0);
    }

    #[test]
    fn softplus_matches_closed_form() {
        let x = 1.5f32;
        let expected = (1.0 + x.exp()).ln();
        assert!((activation(Activation::SoftPlus, x) - expected).abs() < 1e-5);
        assert!((activation_prime(Activation::SoftPlus, x) - sigmoid(x)).abs() < 1e-6);
    }

    #[test]
    fn arctan_matches_std() {
        let x = 0.4f32;
        assert!((activation(Activation::ArcTan, x) - x.atan()).abs() < 1e-6);
        assert!((activation_prime(Activation::ArcTan, x) - 1.0 / (x * x + 1.0)).abs() < 1e-6);
    }

    #[test]
    fn mean_squared_cost_delta() {
        let d = cost_delta(CostFunction::MeanSquared, Activation::Sigmoid, 0.0, 0.5, 1.0);
        let expected = (0.5 - 1.0) * activation_prime(Activation::Sigmoid, 0.0);
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn cross_entropy_sigmoid_cost_delta() {
        let d = cost_delta(CostFunction::CrossEntropySigmoid, Activation::Sigmoid, 0.0, 0.5, 1.0);
        assert!((d - (-0.5)).abs() < 1e-6);
    }
}
