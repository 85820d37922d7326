//! Leaky rectified linear activation.

use crate::cpu::vector;
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// `y = x` for positive inputs, `slope * x` otherwise. Unary; the right
    /// gradient is always null.
    pub fn leaky_relu(&mut self, slope: f32, input: OpId) -> Result<OpId, GradFlowError> {
        let max_shape = self.node(input).max_result_shape.clone();
        let requires_derivative = self.node(input).requires_derivative;
        self.attach(
            OpKind::LeakyRelu { slope },
            Some(input),
            None,
            max_shape,
            requires_derivative,
        )
    }

    pub(crate) fn forward_leaky_relu(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let (left_result, slope) = {
            let node = &self.nodes[id.0];
            let slope = match &node.kind {
                OpKind::LeakyRelu { slope } => *slope,
                _ => unreachable!("forward_leaky_relu on a non-activation node"),
            };
            (node.left_result.clone(), slope)
        };
        let out = self.memory.allocate_forward(left_result.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::leaky_relu(view.slice(&left_result)?, slope, dst);
        Ok(out)
    }

    pub(crate) fn backward_leaky_relu(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (left_result, chain, slope) = {
            let node = &self.nodes[id.0];
            let slope = match &node.kind {
                OpKind::LeakyRelu { slope } => *slope,
                _ => unreachable!("backward_leaky_relu on a non-activation node"),
            };
            (node.left_result.clone(), node.derivative_chain.clone(), slope)
        };
        let out = self.memory.allocate_backward(left_result.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::leaky_relu_grad(
            view.slice(&left_result)?,
            view.slice(&chain)?,
            slope,
            dst,
        );
        Ok(out)
    }
}
