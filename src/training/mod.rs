//! [`TrainingSuite`] and supporting value types (SPEC_FULL.md §3), plus the
//! [`orchestrator`] that drives an epoch loop on top of [`crate::tasks`].

pub mod orchestrator;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostFunction {
    MeanSquared,
    CrossEntropySigmoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regularization {
    None,
    L1,
    L2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingData {
    pub input: Vec<f32>,
    pub desired_output: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct TrainingSuite {
    pub training_data: Vec<TrainingData>,
    pub mini_batch_size: Option<u64>,
    pub learning_rate: f32,
    pub epochs: u32,
    pub shuffle_training_data: bool,
    pub cost_function: CostFunction,
    pub regularization: Regularization,
    pub regularization_lambda: f32,
}

/// Regularization coefficients applied once per minibatch by
/// `apply_gradients` (SPEC_FULL.md §4.5/§4.6): `r1` scales the existing
/// weight, `r2` is the L1 shrinkage term (`0.0` when unused).
#[derive(Debug, Clone, Copy)]
pub struct RegularizationTerms {
    pub r1: f32,
    pub r2: f32,
}

impl TrainingSuite {
    pub fn regularization_terms(&self) -> RegularizationTerms {
        let lambda_ratio = self.regularization_lambda / self.training_data.len().max(1) as f32;
        match self.regularization {
            Regularization::None => RegularizationTerms { r1: 1.0, r2: 0.0 },
            Regularization::L2 => RegularizationTerms {
                r1: 1.0 - self.learning_rate * lambda_ratio,
                r2: 0.0,
            },
            Regularization::L1 => RegularizationTerms {
                r1: 1.0,
                r2: -self.learning_rate * lambda_ratio,
            },
        }
    }

    /// Effective learning rate for a minibatch of `minibatch_size` samples
    /// out of `self.training_data.len()` total, per SPEC_FULL.md §4.6 step 6.
    pub fn minibatch_learning_rate(&self, minibatch_size: usize) -> f32 {
        self.learning_rate * (minibatch_size as f32 / self.training_data.len().max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite(reg: Regularization) -> TrainingSuite {
        TrainingSuite {
            training_data: vec![
                TrainingData { input: vec![0.0], desired_output: vec![0.0] };
                100
            ],
            mini_batch_size: Some(10),
            learning_rate: 0.1,
            epochs: 1,
            shuffle_training_data: false,
            cost_function: CostFunction::MeanSquared,
            regularization: reg,
            regularization_lambda: 0.5,
        }
    }

    #[test]
    fn none_regularization_is_identity() {
        let terms = suite(Regularization::None).regularization_terms();
        assert_eq!(terms.r1, 1.0);
        assert_eq!(terms.r2, 0.0);
    }

    #[test]
    fn l2_shrinks_r1_only() {
        let s = suite(Regularization::L2);
        let terms = s.regularization_terms();
        let expected_r1 = 1.0 - s.learning_rate * (s.regularization_lambda / 100.0);
        assert!((terms.r1 - expected_r1).abs() < 1e-6);
        assert_eq!(terms.r2, 0.0);
    }

    #[test]
    fn l1_sets_r2_only() {
        let s = suite(Regularization::L1);
        let terms = s.regularization_terms();
        assert_eq!(terms.r1, 1.0);
        let expected_r2 = -s.learning_rate * (s.regularization_lambda / 100.0);
        assert!((terms.r2 - expected_r2).abs() < 1e-6);
    }

    #[test]
    fn minibatch_learning_rate_scales_by_fraction() {
        let s = suite(Regularization::None);
        let eta = s.minibatch_learning_rate(10);
        assert!((eta - 0.1 * (10.0 / 100.0)).abs() < 1e-6);
    }
}
