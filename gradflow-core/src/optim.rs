//! Traits at the boundary between the execution core and the optimizer
//! implementations.

use std::fmt::Debug;

use crate::error::GradFlowError;

/// Consumes an accumulated gradient and mutates variable storage in place.
///
/// Each trainable [`Variable`](crate::graph::context::ExecutionContext::variable)
/// owns one boxed optimizer instance, so per-variable state (moments, step
/// counters) and learning rates never leak across variables. The gradient
/// slice points into a backward arena and is only valid for the duration of
/// the call.
pub trait GradientOptimizer: Debug {
    fn optimize(
        &mut self,
        data: &mut [f32],
        gradient: &[f32],
        shape: &[usize],
    ) -> Result<(), GradFlowError>;
}

/// Reports the row count of the mini-batch currently loaded into the main
/// input source. Optimizers divide incoming gradients by this value, which
/// turns the summed batch gradient into a mean.
pub trait BatchSizeProvider: Debug {
    fn batch_rows(&self) -> usize;
}
