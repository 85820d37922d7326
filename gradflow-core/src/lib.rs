//! Arena-backed execution core for CPU neural-network training.
//!
//! The crate builds a layered dataflow graph of tensor operations once,
//! then drives it step after step: forward evaluation bump-allocates into a
//! single forward arena, the reverse-mode walk ping-pongs between two
//! backward arenas, and per-variable optimizers consume the gradients as
//! they land. Results travel as packed 64-bit handles
//! ([`TensorPointer`]) that the owning [`ExecutionContext`] resolves to
//! float slices.

pub mod cpu;
pub mod error;
pub mod graph;
pub mod init;
pub mod memory;
pub mod ops;
pub mod optim;
pub mod test_utils;

pub use error::GradFlowError;
pub use graph::context::ExecutionContext;
pub use graph::operation::OpId;
pub use memory::pointer::{stride, TensorPointer};
pub use ops::input_source::MiniBatchSource;
pub use optim::{BatchSizeProvider, GradientOptimizer};
