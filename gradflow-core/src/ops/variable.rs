//! Trainable graph leaf.

use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::pointer::stride;
use crate::memory::TensorPointer;
use crate::optim::GradientOptimizer;

impl ExecutionContext {
    /// Creates a trainable leaf. `data` is the persistent storage, row-major
    /// in `shape`; it survives across steps and is mutated only by the bound
    /// optimizer once the variable's gradient arrives.
    pub fn variable(
        &mut self,
        data: Vec<f32>,
        shape: Vec<usize>,
        optimizer: Box<dyn GradientOptimizer>,
    ) -> Result<OpId, GradFlowError> {
        if data.len() != stride(&shape) {
            return Err(GradFlowError::DataShapeMismatch {
                data_len: data.len(),
                shape,
            });
        }
        let max_shape = shape.clone();
        self.attach(
            OpKind::Variable {
                data,
                shape,
                optimizer,
            },
            None,
            None,
            max_shape,
            true,
        )
    }

    /// Read-only view of a variable's persistent storage. `None` when
    /// `operation` is not a variable.
    pub fn variable_data(&self, operation: OpId) -> Option<&[f32]> {
        match &self.node(operation).kind {
            OpKind::Variable { data, .. } => Some(data),
            _ => None,
        }
    }

    /// On forward a variable snapshots its storage into a fresh forward
    /// slot, so the forward arena is self-contained for the whole step.
    pub(crate) fn forward_variable(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let shape = match &self.nodes[id.0].kind {
            OpKind::Variable { shape, .. } => shape.clone(),
            _ => unreachable!("forward_variable on a non-variable node"),
        };
        let out = self.memory.allocate_forward(&shape);
        let (dst, _) = self.memory.write_slot(&out);
        match &self.nodes[id.0].kind {
            OpKind::Variable { data, .. } => dst.copy_from_slice(data),
            _ => unreachable!(),
        }
        Ok(out)
    }
}
