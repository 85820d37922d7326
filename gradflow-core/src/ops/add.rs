//! Elementwise sum with optional row broadcast of the right operand.

use crate::cpu::{matrix, vector};
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind, Side};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// `left + right`. A `1×n` right operand against an `m×n` left operand
    /// is broadcast across the rows (the bias convention); its gradient is
    /// summed back along the row dimension.
    pub fn add(&mut self, left: OpId, right: OpId) -> Result<OpId, GradFlowError> {
        let left_shape = self.node(left).max_result_shape.clone();
        let right_shape = self.node(right).max_result_shape.clone();

        let broadcast_rows = if left_shape == right_shape {
            false
        } else if left_shape.len() == 2
            && right_shape.len() == 2
            && right_shape[0] == 1
            && right_shape[1] == left_shape[1]
        {
            true
        } else {
            return Err(GradFlowError::ShapeMismatch {
                operation: "add",
                left: left_shape,
                right: right_shape,
            });
        };

        let requires_derivative =
            self.node(left).requires_derivative || self.node(right).requires_derivative;
        self.attach(
            OpKind::Add { broadcast_rows },
            Some(left),
            Some(right),
            left_shape,
            requires_derivative,
        )
    }

    pub(crate) fn forward_add(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let (left_result, right_result, broadcast_rows) = {
            let node = &self.nodes[id.0];
            let broadcast_rows = match &node.kind {
                OpKind::Add { broadcast_rows } => *broadcast_rows,
                _ => unreachable!("forward_add on a non-add node"),
            };
            (
                node.left_result.clone(),
                node.right_result.clone(),
                broadcast_rows,
            )
        };

        let compatible = if broadcast_rows {
            right_result.shape() == [1, left_result.shape()[1]]
        } else {
            left_result.shape() == right_result.shape()
        };
        if !compatible {
            return Err(GradFlowError::ShapeMismatch {
                operation: "add",
                left: left_result.shape().to_vec(),
                right: right_result.shape().to_vec(),
            });
        }

        let out = self.memory.allocate_forward(left_result.shape());
        let (dst, view) = self.memory.write_slot(&out);
        let a = view.slice(&left_result)?;
        let b = view.slice(&right_result)?;
        if broadcast_rows {
            let rows = left_result.shape()[0];
            let cols = left_result.shape()[1];
            matrix::add_row_broadcast(a, b, dst, rows, cols);
        } else {
            vector::add(a, b, dst);
        }
        Ok(out)
    }

    /// The incoming gradient flows through unchanged to either side; the
    /// broadcast right side first collapses it along the rows.
    pub(crate) fn backward_add(
        &mut self,
        id: OpId,
        side: Side,
    ) -> Result<TensorPointer, GradFlowError> {
        let (chain, broadcast_rows) = {
            let node = &self.nodes[id.0];
            let broadcast_rows = match &node.kind {
                OpKind::Add { broadcast_rows } => *broadcast_rows,
                _ => unreachable!("backward_add on a non-add node"),
            };
            (node.derivative_chain.clone(), broadcast_rows)
        };

        if side == Side::Right && broadcast_rows {
            let rows = chain.shape()[0];
            let cols = chain.shape()[1];
            let out = self.memory.allocate_backward(&[1, cols]);
            let (dst, view) = self.memory.write_slot(&out);
            matrix::sum_over_rows(view.slice(&chain)?, dst, rows, cols);
            Ok(out)
        } else {
            // Copied into the current arena; the chain may live in the
            // previous one, which the next layer swap recycles.
            let out = self.memory.allocate_backward(chain.shape());
            let (dst, view) = self.memory.write_slot(&out);
            dst.copy_from_slice(view.slice(&chain)?);
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GradFlowError;
    use crate::graph::context::ExecutionContext;

    #[test]
    fn adds_elementwise() {
        let mut context = ExecutionContext::new();
        let a = context.constant(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b = context.constant(vec![0.5, 0.5, -1.0, 1.0], vec![2, 2]).unwrap();
        let sum = context.add(a, b).unwrap();
        context.register_operation(a).unwrap();
        context.register_operation(b).unwrap();
        let _ = sum;
        context.initialize_execution().unwrap();

        let results = context.execute_forward_propagation().unwrap();
        assert_eq!(
            context.memory_buffer(&results[0]).unwrap(),
            &[1.5, 2.5, 2.0, 5.0]
        );
    }

    #[test]
    fn broadcasts_a_bias_row() {
        let mut context = ExecutionContext::new();
        let a = context.constant(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let bias = context.constant(vec![10.0, 20.0], vec![1, 2]).unwrap();
        let _sum = context.add(a, bias).unwrap();
        context.register_operation(a).unwrap();
        context.register_operation(bias).unwrap();
        context.initialize_execution().unwrap();

        let results = context.execute_forward_propagation().unwrap();
        assert_eq!(
            context.memory_buffer(&results[0]).unwrap(),
            &[11.0, 22.0, 13.0, 24.0]
        );
    }

    #[test]
    fn incompatible_shapes_are_rejected() {
        let mut context = ExecutionContext::new();
        let a = context.constant(vec![1.0, 2.0], vec![1, 2]).unwrap();
        let b = context.constant(vec![1.0, 2.0, 3.0], vec![1, 3]).unwrap();
        assert_eq!(
            context.add(a, b),
            Err(GradFlowError::ShapeMismatch {
                operation: "add",
                left: vec![1, 2],
                right: vec![1, 3],
            })
        );
    }
}
