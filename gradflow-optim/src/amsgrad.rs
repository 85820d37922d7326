//! AMSGrad optimizer.

use std::rc::Rc;

use gradflow_core::error::GradFlowError;
use gradflow_core::optim::{BatchSizeProvider, GradientOptimizer};

use crate::clip;

/// AMSGrad: Adam's moment updates plus an elementwise running maximum of the
/// second moment. The update divides by `√v_max` and applies no bias
/// correction, which keeps the effective step size non-increasing.
#[derive(Debug)]
pub struct AmsGrad {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    batch_source: Rc<dyn BatchSizeProvider>,
    max_grad_norm: Option<f32>,
    first_moment: Vec<f32>,
    second_moment: Vec<f32>,
    second_moment_max: Vec<f32>,
    step: u64,
}

impl AmsGrad {
    /// AMSGrad with the usual defaults: β₁ = 0.9, β₂ = 0.999, ε = 1e-8.
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
        Ok(AmsGrad {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            batch_source,
            max_grad_norm: None,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
            second_moment_max: Vec::new(),
            step: 0,
        })
    }

    pub fn with_max_grad_norm(mut self, limit: f32) -> Self {
        self.max_grad_norm = Some(limit);
        self
    }

    /// The running elementwise maximum of the second moment.
    pub fn second_moment_max(&self) -> &[f32] {
        &self.second_moment_max
    }
}

impl GradientOptimizer for AmsGrad {
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
            log::debug!("amsgrad: sizing moment buffers for {} elements", data.len());
            self.first_moment = vec![0.0; data.len()];
            self.second_moment = vec![0.0; data.len()];
            self.second_moment_max = vec![0.0; data.len()];
        }
        debug_assert_eq!(self.first_moment.len(), data.len());

        self.step += 1;
        for ((((value, &raw), m), v), v_max) in data
            .iter_mut()
            .zip(gradient)
            .zip(&mut self.first_moment)
            .zip(&mut self.second_moment)
            .zip(&mut self.second_moment_max)
        {
            let g = raw * scale;
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            *v_max = v_max.max(*v);
            *value -= self.learning_rate * *m / (v_max.sqrt() + self.epsilon);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::test_support::FixedBatch;

    #[test]
    fn second_moment_max_never_decreases() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut optimizer = AmsGrad::new(0.01, Rc::new(FixedBatch(1))).unwrap();
        let mut data = vec![0.0; 8];
        let mut previous = vec![0.0; 8];

        for _ in 0..50 {
            let gradient: Vec<f32> = (0..8).map(|_| rng.gen_range(-3.0..3.0)).collect();
            optimizer.optimize(&mut data, &gradient, &[2, 4]).unwrap();
            for (&current, &before) in optimizer.second_moment_max().iter().zip(&previous) {
                assert!(current >= before);
            }
            previous = optimizer.second_moment_max().to_vec();
        }
    }

    #[test]
    fn applies_no_bias_correction() {
        let mut optimizer = AmsGrad::new(0.1, Rc::new(FixedBatch(1))).unwrap();
        let mut data = vec![0.0];
        optimizer.optimize(&mut data, &[1.0], &[1, 1]).unwrap();
        // First step: m = 0.1, v_max = 0.001; θ = −lr·m/(√v_max + ε).
        let expected = -0.1 * 0.1 / (0.001f32.sqrt() + 1e-8);
        approx::assert_relative_eq!(data[0], expected, epsilon = 1e-5);
    }
}
