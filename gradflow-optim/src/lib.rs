//! Per-variable optimizers for the gradflow execution core.
//!
//! Each optimizer implements
//! [`GradientOptimizer`](gradflow_core::optim::GradientOptimizer) over raw
//! variable storage and divides incoming gradients by the batch size of the
//! bound input source, following the mean-gradient convention of the cost
//! functions.

pub mod adam;
pub mod amsgrad;
pub mod clip;
pub mod sgd;

pub use adam::Adam;
pub use amsgrad::AmsGrad;
pub use sgd::Sgd;

#[cfg(test)]
mod test_support;
