//! Plain stochastic gradient descent.

use std::rc::Rc;

use gradflow_core::error::GradFlowError;
use gradflow_core::optim::{BatchSizeProvider, GradientOptimizer};

use crate::clip;

/// Updates `θ ← θ − lr · g` with the gradient divided by the batch size
/// reported by the bound input source.
#[derive(Debug)]
pub struct Sgd {
    learning_rate: f32,
    batch_source: Rc<dyn BatchSizeProvider>,
    max_grad_norm: Option<f32>,
}

impl Sgd {
    pub fn new(
        learning_rate: f32,
        batch_source: Rc<dyn BatchSizeProvider>,
    ) -> Result<Self, GradFlowError> {
        if learning_rate < 0.0 {
            return Err(GradFlowError::ConfigurationError(format!(
                "invalid learning rate: {learning_rate}"
            )));
        }
        Ok(Sgd {
            learning_rate,
            batch_source,
            max_grad_norm: None,
        })
    }

    /// Clips the mean gradient to the given L2 norm before the update.
    pub fn with_max_grad_norm(mut self, limit: f32) -> Self {
        self.max_grad_norm = Some(limit);
        self
    }
}

impl GradientOptimizer for Sgd {
    fn optimize(
        &mut self,
        data: &mut [f32],
        gradient: &[f32],
        _shape: &[usize],
    ) -> Result<(), GradFlowError> {
        debug_assert_eq!(data.len(), gradient.len());
        let rows = self.batch_source.batch_rows();
        if rows == 0 {
            return Err(GradFlowError::ConfigurationError(
                "batch size source reported zero rows".to_string(),
            ));
        }
        let mean_scale = 1.0 / rows as f32;
        let clip_scale = match self.max_grad_norm {
            Some(limit) => clip::norm_scale(gradient, mean_scale, limit),
            None => 1.0,
        };
        let step = self.learning_rate * mean_scale * clip_scale;

        for (value, &g) in data.iter_mut().zip(gradient) {
            *value -= step * g;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedBatch;

    #[test]
    fn negative_learning_rate_is_rejected() {
        assert!(matches!(
            Sgd::new(-0.1, Rc::new(FixedBatch(1))),
            Err(GradFlowError::ConfigurationError(_))
        ));
    }

    #[test]
    fn divides_the_gradient_by_the_batch_rows() {
        let mut sgd = Sgd::new(0.5, Rc::new(FixedBatch(2))).unwrap();
        let mut data = vec![1.0, 1.0];
        sgd.optimize(&mut data, &[4.0, -4.0], &[1, 2]).unwrap();
        assert_eq!(data, vec![0.0, 2.0]);
    }

    #[test]
    fn zero_learning_rate_leaves_storage_bitwise_unchanged() {
        let mut sgd = Sgd::new(0.0, Rc::new(FixedBatch(4))).unwrap();
        let original = vec![0.125, -7.25, 3.5];
        let mut data = original.clone();
        for _ in 0..5 {
            sgd.optimize(&mut data, &[1.0, 2.0, 3.0], &[1, 3]).unwrap();
        }
        assert_eq!(data, original);
    }

    #[test]
    fn empty_batch_source_is_a_configuration_error() {
        let mut sgd = Sgd::new(0.1, Rc::new(FixedBatch(0))).unwrap();
        let mut data = vec![1.0];
        assert!(matches!(
            sgd.optimize(&mut data, &[1.0], &[1, 1]),
            Err(GradFlowError::ConfigurationError(_))
        ));
    }

    #[test]
    fn clipping_caps_the_update_norm() {
        let mut sgd = Sgd::new(1.0, Rc::new(FixedBatch(1)))
            .unwrap()
            .with_max_grad_norm(1.0);
        let mut data = vec![0.0, 0.0];
        sgd.optimize(&mut data, &[3.0, 4.0], &[1, 2]).unwrap();
        // The [3, 4] gradient is rescaled to unit norm.
        let norm = (data[0] * data[0] + data[1] * data[1]).sqrt();
        approx::assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }
}
