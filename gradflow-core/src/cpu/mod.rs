//! Standalone numeric kernels. Pure functions over flat `f32` slices with
//! explicit dimensions; no graph or arena types leak in here.

pub mod matrix;
pub mod vector;
