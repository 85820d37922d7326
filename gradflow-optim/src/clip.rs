//! Gradient norm clipping shared by the optimizers.

/// Factor that rescales a gradient whose L2 norm (after `pre_scale` is
/// applied to every element) exceeds `max_norm`. Returns 1.0 when the
/// gradient is already within the limit.
pub fn norm_scale(gradient: &[f32], pre_scale: f32, max_norm: f32) -> f32 {
    let sum_of_squares: f32 = gradient.iter().map(|&g| g * g).sum();
    let norm = pre_scale * sum_of_squares.sqrt();
    if norm > max_norm && norm > 0.0 {
        max_norm / norm
    } else {
        1.0
    }
}
