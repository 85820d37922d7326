//! Non-trainable graph leaf.

use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::pointer::stride;
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// A leaf like a variable but without an optimizer; it never receives
    /// gradients and nothing upstream of it alone requires a backward pass.
    pub fn constant(&mut self, data: Vec<f32>, shape: Vec<usize>) -> Result<OpId, GradFlowError> {
        if data.len() != stride(&shape) {
            return Err(GradFlowError::DataShapeMismatch {
                data_len: data.len(),
                shape,
            });
        }
        let max_shape = shape.clone();
        self.attach(OpKind::Constant { data, shape }, None, None, max_shape, false)
    }

    pub(crate) fn forward_constant(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let shape = match &self.nodes[id.0].kind {
            OpKind::Constant { shape, .. } => shape.clone(),
            _ => unreachable!("forward_constant on a non-constant node"),
        };
        let out = self.memory.allocate_forward(&shape);
        let (dst, _) = self.memory.write_slot(&out);
        match &self.nodes[id.0].kind {
            OpKind::Constant { data, .. } => dst.copy_from_slice(data),
            _ => unreachable!(),
        }
        Ok(out)
    }
}
