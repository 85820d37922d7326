//! Row-major matrix kernels consumed by the operation graph.
//!
//! All buffers are flat `f32` slices; callers pass explicit dimensions. The
//! inner loops run over contiguous rows so the compiler can vectorize them.

/// `out = a · b` with `a` of shape `m×k` and `b` of shape `k×n`.
pub fn matmul(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * n);

    out.fill(0.0);
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (p, &a_ip) in a_row.iter().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            for (acc, &b_pj) in out_row.iter_mut().zip(b_row) {
                *acc += a_ip * b_pj;
            }
        }
    }
}

/// `out = g · bᵀ` with `g` of shape `m×n` and `b` of shape `k×n`; `out` is
/// `m×k`. Both operands are traversed by rows, so no transpose is
/// materialized.
pub fn matmul_transposed_rhs(g: &[f32], b: &[f32], out: &mut [f32], m: usize, n: usize, k: usize) {
    debug_assert_eq!(g.len(), m * n);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * k);

    for i in 0..m {
        let g_row = &g[i * n..(i + 1) * n];
        let out_row = &mut out[i * k..(i + 1) * k];
        for (p, acc) in out_row.iter_mut().enumerate() {
            let b_row = &b[p * n..(p + 1) * n];
            *acc = g_row.iter().zip(b_row).map(|(&x, &y)| x * y).sum();
        }
    }
}

/// `out = aᵀ · g` with `a` of shape `m×k` and `g` of shape `m×n`; `out` is
/// `k×n`.
pub fn matmul_transposed_lhs(a: &[f32], g: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(g.len(), m * n);
    debug_assert_eq!(out.len(), k * n);

    out.fill(0.0);
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let g_row = &g[i * n..(i + 1) * n];
        for (p, &a_ip) in a_row.iter().enumerate() {
            let out_row = &mut out[p * n..(p + 1) * n];
            for (acc, &g_ij) in out_row.iter_mut().zip(g_row) {
                *acc += a_ip * g_ij;
            }
        }
    }
}

/// Row-wise softmax with max subtraction for numerical stability.
pub fn softmax_rows(input: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(input.len(), rows * cols);
    debug_assert_eq!(out.len(), rows * cols);

    for i in 0..rows {
        let row = &input[i * cols..(i + 1) * cols];
        let out_row = &mut out[i * cols..(i + 1) * cols];

        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for (o, &x) in out_row.iter_mut().zip(row) {
            let e = (x - max).exp();
            *o = e;
            sum += e;
        }
        let inv = 1.0 / sum;
        for o in out_row.iter_mut() {
            *o *= inv;
        }
    }
}

/// `out = a + row` where `row` of shape `1×cols` is duplicated across every
/// row of `a`.
pub fn add_row_broadcast(a: &[f32], row: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(a.len(), rows * cols);
    debug_assert_eq!(row.len(), cols);
    debug_assert_eq!(out.len(), rows * cols);

    for i in 0..rows {
        let a_row = &a[i * cols..(i + 1) * cols];
        let out_row = &mut out[i * cols..(i + 1) * cols];
        for ((o, &x), &y) in out_row.iter_mut().zip(a_row).zip(row) {
            *o = x + y;
        }
    }
}

/// Collapses the row dimension: `out[j] = Σᵢ input[i][j]`.
pub fn sum_over_rows(input: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(input.len(), rows * cols);
    debug_assert_eq!(out.len(), cols);

    out.fill(0.0);
    for i in 0..rows {
        let row = &input[i * cols..(i + 1) * cols];
        for (acc, &x) in out.iter_mut().zip(row) {
            *acc += x;
        }
    }
}

/// Replicates a column vector across `cols` columns.
pub fn broadcast_column(column: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(column.len(), rows);
    debug_assert_eq!(out.len(), rows * cols);

    for (i, &value) in column.iter().enumerate() {
        out[i * cols..(i + 1) * cols].fill(value);
    }
}

/// Collapses the column dimension: `out[i] = Σⱼ input[i][j]`.
pub fn sum_over_columns(input: &[f32], out: &mut [f32], rows: usize, cols: usize) {
    debug_assert_eq!(input.len(), rows * cols);
    debug_assert_eq!(out.len(), rows);

    for (i, acc) in out.iter_mut().enumerate() {
        *acc = input[i * cols..(i + 1) * cols].iter().sum();
    }
}
