//! Matrix multiplication.

use crate::cpu::matrix;
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// `left · right` with `left` of shape `m×k` and `right` of shape `k×n`.
    /// The row count may shrink per step with the batch; `k` and `n` are
    /// fixed by the declared shapes.
    pub fn multiplication(&mut self, left: OpId, right: OpId) -> Result<OpId, GradFlowError> {
        let left_shape = self.node(left).max_result_shape.clone();
        let right_shape = self.node(right).max_result_shape.clone();

        if left_shape.len() != 2 || right_shape.len() != 2 || left_shape[1] != right_shape[0] {
            return Err(GradFlowError::ShapeMismatch {
                operation: "multiplication",
                left: left_shape,
                right: right_shape,
            });
        }
        let (m, k, n) = (left_shape[0], left_shape[1], right_shape[1]);

        let requires_derivative =
            self.node(left).requires_derivative || self.node(right).requires_derivative;
        self.attach(
            OpKind::Multiplication { m, k, n },
            Some(left),
            Some(right),
            vec![m, n],
            requires_derivative,
        )
    }

    pub(crate) fn forward_multiplication(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (left_result, right_result) = {
            let node = &self.nodes[id.0];
            (node.left_result.clone(), node.right_result.clone())
        };
        let rows = left_result.shape()[0];
        let k = left_result.shape()[1];
        let n = right_result.shape()[1];
        if k != right_result.shape()[0] {
            return Err(GradFlowError::ShapeMismatch {
                operation: "multiplication",
                left: left_result.shape().to_vec(),
                right: right_result.shape().to_vec(),
            });
        }

        let out = self.memory.allocate_forward(&[rows, n]);
        let (dst, view) = self.memory.write_slot(&out);
        matrix::matmul(
            view.slice(&left_result)?,
            view.slice(&right_result)?,
            dst,
            rows,
            k,
            n,
        );
        Ok(out)
    }

    /// `dL/dA = dL/dY · Bᵀ`.
    pub(crate) fn backward_multiplication_left(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (chain, right_result) = {
            let node = &self.nodes[id.0];
            (node.derivative_chain.clone(), node.right_result.clone())
        };
        let rows = chain.shape()[0];
        let n = chain.shape()[1];
        let k = right_result.shape()[0];

        let out = self.memory.allocate_backward(&[rows, k]);
        let (dst, view) = self.memory.write_slot(&out);
        matrix::matmul_transposed_rhs(
            view.slice(&chain)?,
            view.slice(&right_result)?,
            dst,
            rows,
            n,
            k,
        );
        Ok(out)
    }

    /// `dL/dB = Aᵀ · dL/dY`.
    pub(crate) fn backward_multiplication_right(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (chain, left_result) = {
            let node = &self.nodes[id.0];
            (node.derivative_chain.clone(), node.left_result.clone())
        };
        let rows = left_result.shape()[0];
        let k = left_result.shape()[1];
        let n = chain.shape()[1];

        let out = self.memory.allocate_backward(&[k, n]);
        let (dst, view) = self.memory.write_slot(&out);
        matrix::matmul_transposed_lhs(
            view.slice(&left_result)?,
            view.slice(&chain)?,
            dst,
            rows,
            k,
            n,
        );
        Ok(out)
    }
}
