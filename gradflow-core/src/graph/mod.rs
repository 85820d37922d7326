//! The layered operation graph and its step driver.

pub mod context;
pub mod operation;

pub use context::ExecutionContext;
pub use operation::OpId;
