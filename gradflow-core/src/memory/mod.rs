//! Arena memory model: packed tensor handles plus the three float arenas
//! they address.

pub(crate) mod arena;
pub mod pointer;

pub(crate) use arena::MemoryArenas;
pub use pointer::{stride, TensorPointer};
