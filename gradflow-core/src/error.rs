use thiserror::Error;

/// Error type shared by the whole execution core.
///
/// Variants fall into four families: graph construction errors, handle
/// decoding errors, shape validation errors and configuration errors.
/// Arena capacity violations are not represented here; they indicate a bug
/// in the sizing pass and abort with a diagnostic instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradFlowError {
    #[error("operation is already registered (layer {layer})")]
    AlreadyRegistered { layer: usize },

    #[error("execution graph is already initialized")]
    AlreadyInitialized,

    #[error("execution graph is not initialized; call initialize_execution first")]
    NotInitialized,

    #[error("execution graph is sealed; no operations can be added after initialization")]
    GraphSealed,

    #[error("only leaf operations can be registered as graph roots")]
    NotALeaf,

    #[error("operation is not reachable from any registered root")]
    UnlayeredOperation,

    #[error("operation already feeds a downstream consumer")]
    OperandAlreadyConsumed,

    #[error("cost function only supports 2-D tensors, got shape {shape:?}")]
    CostFunctionRank { shape: Vec<usize> },

    #[error("null tensor handle dereferenced")]
    NullHandle,

    #[error("stale tensor handle: offset {offset} + length {length} is outside region {region}")]
    StaleHandle {
        region: u8,
        offset: usize,
        length: usize,
    },

    #[error("shape mismatch in {operation}: {left:?} vs {right:?}")]
    ShapeMismatch {
        operation: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("data length {data_len} does not match shape {shape:?}")]
    DataShapeMismatch { data_len: usize, shape: Vec<usize> },

    #[error("invalid configuration: {0}")]
    ConfigurationError(String),
}
