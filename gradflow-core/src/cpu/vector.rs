//! Elementwise kernels over flat `f32` slices.

/// `out = a + b`.
pub fn add(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x + y;
    }
}

/// `out = a - b`.
pub fn sub(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x - y;
    }
}

/// `out = a ⊙ b`.
pub fn mul(a: &[f32], b: &[f32], out: &mut [f32]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x * y;
    }
}

/// `out = a * factor`.
pub fn scale(a: &[f32], factor: f32, out: &mut [f32]) {
    debug_assert_eq!(a.len(), out.len());
    for (o, &x) in out.iter_mut().zip(a) {
        *o = x * factor;
    }
}

/// `out[i] = input[i]` if positive, else `slope * input[i]`.
pub fn leaky_relu(input: &[f32], slope: f32, out: &mut [f32]) {
    debug_assert_eq!(input.len(), out.len());
    for (o, &x) in out.iter_mut().zip(input) {
        *o = if x > 0.0 { x } else { slope * x };
    }
}

/// Gradient of [`leaky_relu`]: `out[i] = chain[i]` where the forward input
/// was positive, else `slope * chain[i]`.
pub fn leaky_relu_grad(input: &[f32], chain: &[f32], slope: f32, out: &mut [f32]) {
    debug_assert_eq!(input.len(), chain.len());
    debug_assert_eq!(input.len(), out.len());
    for ((o, &x), &g) in out.iter_mut().zip(input).zip(chain) {
        *o = if x > 0.0 { g } else { slope * g };
    }
}

/// Cross-entropy `−Σ log(softmax) ⊙ expected`. The softmax input is assumed
/// strictly positive after max subtraction.
pub fn cross_entropy(softmax: &[f32], expected: &[f32]) -> f32 {
    debug_assert_eq!(softmax.len(), expected.len());
    let sum: f32 = softmax
        .iter()
        .zip(expected)
        .map(|(&s, &e)| s.ln() * e)
        .sum();
    -sum
}

/// Sum of squared elements, used for the materialized squared-error loss.
pub fn sum_of_squares(values: &[f32]) -> f32 {
    values.iter().map(|&x| x * x).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn elementwise_kernels() {
        let a = [1.0, -2.0, 3.0];
        let b = [0.5, 0.5, -1.0];
        let mut out = [0.0; 3];

        add(&a, &b, &mut out);
        assert_eq!(out, [1.5, -1.5, 2.0]);

        sub(&a, &b, &mut out);
        assert_eq!(out, [0.5, -2.5, 4.0]);

        mul(&a, &b, &mut out);
        assert_eq!(out, [0.5, -1.0, -3.0]);

        scale(&a, 2.0, &mut out);
        assert_eq!(out, [2.0, -4.0, 6.0]);
    }

    #[test]
    fn leaky_relu_forward_and_grad() {
        let input = [-1.0, 2.0, -3.0];
        let mut out = [0.0; 3];
        leaky_relu(&input, 0.01, &mut out);
        assert_relative_eq!(out[0], -0.01, epsilon = 1e-6);
        assert_relative_eq!(out[1], 2.0, epsilon = 1e-6);
        assert_relative_eq!(out[2], -0.03, epsilon = 1e-6);

        let chain = [1.0, 1.0, 1.0];
        leaky_relu_grad(&input, &chain, 0.01, &mut out);
        assert_relative_eq!(out[0], 0.01, epsilon = 1e-6);
        assert_relative_eq!(out[1], 1.0, epsilon = 1e-6);
        assert_relative_eq!(out[2], 0.01, epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_of_one_hot() {
        let softmax = [0.25, 0.5, 0.25];
        let expected = [0.0, 1.0, 0.0];
        assert_relative_eq!(
            cross_entropy(&softmax, &expected),
            -(0.5f32).ln(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn sum_of_squares_accumulates() {
        assert_relative_eq!(sum_of_squares(&[1.0, -2.0, 2.0]), 9.0, epsilon = 1e-6);
    }
}
