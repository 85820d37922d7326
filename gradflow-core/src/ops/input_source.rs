//! Mini-batch input sources.
//!
//! A source is a cloneable handle shared between the caller (which loads a
//! fresh matrix before each step), the graph leaf that reads it during
//! forward, and any optimizer that needs the effective batch size.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::pointer::stride;
use crate::memory::TensorPointer;
use crate::optim::BatchSizeProvider;

#[derive(Debug, Clone)]
pub struct MiniBatchSource {
    state: Rc<RefCell<SourceState>>,
}

#[derive(Debug)]
struct SourceState {
    data: Vec<f32>,
    shape: Vec<usize>,
    max_shape: Vec<usize>,
}

impl MiniBatchSource {
    /// Declares a source whose batches never exceed `max_shape`; the graph
    /// leaf sizes its forward slot from this bound.
    pub fn new(max_shape: Vec<usize>) -> Self {
        MiniBatchSource {
            state: Rc::new(RefCell::new(SourceState {
                data: Vec::new(),
                shape: Vec::new(),
                max_shape,
            })),
        }
    }

    /// Loads the next mini-batch. The shape may shrink below the declared
    /// maximum (a final partial batch) but never exceed it in any dimension.
    pub fn set_batch(&self, data: Vec<f32>, shape: Vec<usize>) -> Result<(), GradFlowError> {
        if data.len() != stride(&shape) {
            return Err(GradFlowError::DataShapeMismatch {
                data_len: data.len(),
                shape,
            });
        }
        let state = &mut *self.state.borrow_mut();
        if shape.len() != state.max_shape.len()
            || shape.iter().zip(&state.max_shape).any(|(&d, &max)| d > max)
        {
            return Err(GradFlowError::ShapeMismatch {
                operation: "set_batch",
                left: shape,
                right: state.max_shape.clone(),
            });
        }
        state.data = data;
        state.shape = shape;
        Ok(())
    }

    pub fn max_shape(&self) -> Vec<usize> {
        self.state.borrow().max_shape.clone()
    }
}

impl BatchSizeProvider for MiniBatchSource {
    fn batch_rows(&self) -> usize {
        self.state.borrow().shape.first().copied().unwrap_or(0)
    }
}

impl ExecutionContext {
    /// Creates the graph leaf that snapshots `source` into the forward arena
    /// on every step.
    pub fn input_source(&mut self, source: &MiniBatchSource) -> Result<OpId, GradFlowError> {
        let max_shape = source.max_shape();
        self.attach(
            OpKind::InputSource {
                source: source.clone(),
            },
            None,
            None,
            max_shape,
            false,
        )
    }

    pub(crate) fn forward_input_source(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let shape = match &self.nodes[id.0].kind {
            OpKind::InputSource { source } => {
                let state = source.state.borrow();
                if state.data.is_empty() {
                    return Err(GradFlowError::ConfigurationError(
                        "input source has no batch loaded".to_string(),
                    ));
                }
                state.shape.clone()
            }
            _ => unreachable!("forward_input_source on a non-source node"),
        };
        let out = self.memory.allocate_forward(&shape);
        let (dst, _) = self.memory.write_slot(&out);
        match &self.nodes[id.0].kind {
            OpKind::InputSource { source } => dst.copy_from_slice(&source.state.borrow().data),
            _ => unreachable!(),
        }
        Ok(out)
    }
}
