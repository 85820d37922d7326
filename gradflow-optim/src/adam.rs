//! Adam optimizer.

use std::rc::Rc;

use gradflow_core::error::GradFlowError;
use gradflow_core::optim::{BatchSizeProvider, GradientOptimizer};

use crate::clip;

/// Adam with bias-corrected first and second moments.
///
/// The moment buffers and the step counter live inside the instance, so a
/// variable bound to its own `Adam` keeps its own schedule regardless of how
/// other variables are trained.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    batch_source: Rc<dyn BatchSizeProvider>,
    max_grad_norm: Option<f32>,
    first_moment: Vec<f32>,
    second_moment: Vec<f32>,
    step: u64,
}

impl Adam {
    /// Adam with the usual defaults: β₁ = 0.9, β₂ = 0.999, ε = 1e-8.
    pub fn new(
        learning_rate: f32,
        batch_source: Rc<dyn BatchSizeProvider>,
    ) -> Result<Self, GradFlowError> {
        Self::with_hyper_parameters(learning_rate, 0.9, 0.999, 1e-8, batch_source)
    }

    pub fn with_hyper_parameters(
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
        batch_source: Rc<dyn BatchSizeProvider>,
    ) -> Result<Self, GradFlowError> {
        if learning_rate <= 0.0 {
            return Err(GradFlowError::ConfigurationError(
                "learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&beta1) {
            return Err(GradFlowError::ConfigurationError(
                "beta1 must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&beta2) {
            return Err(GradFlowError::ConfigurationError(
                "beta2 must be in [0, 1)".to_string(),
            ));
        }
        if epsilon <= 0.0 {
            return Err(GradFlowError::ConfigurationError(
                "epsilon must be positive".to_string(),
            ));
        }
        Ok(Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            batch_source,
            max_grad_norm: None,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
            step: 0,
        })
    }

    /// Clips the mean gradient to the given L2 norm before the moments see
    /// it.
    pub fn with_max_grad_norm(mut self, limit: f32) -> Self {
        self.max_grad_norm = Some(limit);
        self
    }
}

impl GradientOptimizer for Adam {
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
        let scale = mean_scale * clip_scale;

        if self.first_moment.is_empty() {
            log::debug!("adam: sizing moment buffers for {} elements", data.len());
            self.first_moment = vec![0.0; data.len()];
            self.second_moment = vec![0.0; data.len()];
        }
        debug_assert_eq!(self.first_moment.len(), data.len());

        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);

        for (((value, &raw), m), v) in data
            .iter_mut()
            .zip(gradient)
            .zip(&mut self.first_moment)
            .zip(&mut self.second_moment)
        {
            let g = raw * scale;
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *value -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::test_support::FixedBatch;

    #[test]
    fn invalid_hyper_parameters_are_rejected() {
        let batch = || -> Rc<dyn BatchSizeProvider> { Rc::new(FixedBatch(1)) };
        assert!(Adam::new(0.0, batch()).is_err());
        assert!(Adam::with_hyper_parameters(0.1, 1.0, 0.999, 1e-8, batch()).is_err());
        assert!(Adam::with_hyper_parameters(0.1, 0.9, -0.1, 1e-8, batch()).is_err());
        assert!(Adam::with_hyper_parameters(0.1, 0.9, 0.999, 0.0, batch()).is_err());
        assert!(Adam::new(0.001, batch()).is_ok());
    }

    #[test]
    fn constant_gradient_converges_to_sign_steps() {
        let gradient = [2.0, -2.0];
        let mut adam = Adam::new(0.1, Rc::new(FixedBatch(1))).unwrap();
        let mut data = vec![5.0, 5.0];
        let steps = 10;
        for _ in 0..steps {
            adam.optimize(&mut data, &gradient, &[1, 2]).unwrap();
        }

        // Bias correction makes m̂ = g and v̂ = g² exactly under a constant
        // gradient, so every step moves by lr · sign(g).
        assert_relative_eq!(data[0], 5.0 - 0.1 * steps as f32, epsilon = 1e-4);
        assert_relative_eq!(data[1], 5.0 + 0.1 * steps as f32, epsilon = 1e-4);

        // The raw moments carry the geometric ramp-up.
        let ramp = 1.0 - 0.9f32.powi(steps);
        assert_relative_eq!(adam.first_moment[0], 2.0 * ramp, epsilon = 1e-4);
        assert_relative_eq!(adam.second_moment[0], 4.0 * (1.0 - 0.999f32.powi(steps)), epsilon = 1e-4);
    }

    #[test]
    fn batch_division_feeds_the_moments() {
        let mut adam = Adam::new(0.1, Rc::new(FixedBatch(4))).unwrap();
        let mut data = vec![0.0];
        adam.optimize(&mut data, &[8.0], &[1, 1]).unwrap();
        assert_relative_eq!(adam.first_moment[0], 0.1 * 2.0, epsilon = 1e-6);
    }
}
