//! Weight-initialization helpers for variable storage.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::GradFlowError;
use crate::memory::pointer::stride;

/// Samples `shape` uniformly from `[low, high)`.
pub fn uniform<R: Rng>(rng: &mut R, shape: &[usize], low: f32, high: f32) -> Vec<f32> {
    let distribution = Uniform::new(low, high);
    (0..stride(shape)).map(|_| distribution.sample(rng)).collect()
}

/// Samples `shape` from a normal distribution. A negative or non-finite
/// `std_dev` is rejected as a configuration error.
pub fn normal<R: Rng>(
    rng: &mut R,
    shape: &[usize],
    mean: f32,
    std_dev: f32,
) -> Result<Vec<f32>, GradFlowError> {
    let distribution = Normal::new(mean, std_dev).map_err(|error| {
        GradFlowError::ConfigurationError(format!("invalid normal distribution: {error}"))
    })?;
    Ok((0..stride(shape)).map(|_| distribution.sample(rng)).collect())
}

/// Kaiming-style uniform initialization with bound `sqrt(6 / fan_in)`, the
/// usual choice in front of rectified activations.
pub fn kaiming_uniform<R: Rng>(rng: &mut R, fan_in: usize, shape: &[usize]) -> Vec<f32> {
    let bound = (6.0 / fan_in as f32).sqrt();
    uniform(rng, shape, -bound, bound)
}
