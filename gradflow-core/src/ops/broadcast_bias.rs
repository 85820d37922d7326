//! Column-vector bias replication.

use crate::cpu::matrix;
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// Replicates an `m×1` bias across `columns` columns, yielding an
    /// `m×columns` result. Backward collapses the incoming gradient back to
    /// `m×1` by summing along the broadcast dimension.
    pub fn broadcast_bias(&mut self, bias: OpId, columns: usize) -> Result<OpId, GradFlowError> {
        let bias_shape = self.node(bias).max_result_shape.clone();
        if bias_shape.len() != 2 || bias_shape[1] != 1 {
            let rows = bias_shape.first().copied().unwrap_or(0);
            return Err(GradFlowError::ShapeMismatch {
                operation: "broadcast_bias",
                left: bias_shape,
                right: vec![rows, 1],
            });
        }
        let rows = bias_shape[0];

        let requires_derivative = self.node(bias).requires_derivative;
        self.attach(
            OpKind::BroadcastBias { columns },
            Some(bias),
            None,
            vec![rows, columns],
            requires_derivative,
        )
    }

    pub(crate) fn forward_broadcast_bias(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (bias, columns) = {
            let node = &self.nodes[id.0];
            let columns = match &node.kind {
                OpKind::BroadcastBias { columns } => *columns,
                _ => unreachable!("forward_broadcast_bias on a different node"),
            };
            (node.left_result.clone(), columns)
        };
        let rows = bias.shape()[0];

        let out = self.memory.allocate_forward(&[rows, columns]);
        let (dst, view) = self.memory.write_slot(&out);
        matrix::broadcast_column(view.slice(&bias)?, dst, rows, columns);
        Ok(out)
    }

    pub(crate) fn backward_broadcast_bias(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let chain = self.nodes[id.0].derivative_chain.clone();
        let rows = chain.shape()[0];
        let cols = chain.shape()[1];

        let out = self.memory.allocate_backward(&[rows, 1]);
        let (dst, view) = self.memory.write_slot(&out);
        matrix::sum_over_columns(view.slice(&chain)?, dst, rows, cols);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GradFlowError;
    use crate::graph::context::ExecutionContext;

    #[test]
    fn replicates_the_column() {
        let mut context = ExecutionContext::new();
        let bias = context.constant(vec![1.0, -2.0], vec![2, 1]).unwrap();
        let _broadcast = context.broadcast_bias(bias, 3).unwrap();
        context.register_operation(bias).unwrap();
        context.initialize_execution().unwrap();

        let results = context.execute_forward_propagation().unwrap();
        assert_eq!(results[0].shape(), &[2, 3]);
        assert_eq!(
            context.memory_buffer(&results[0]).unwrap(),
            &[1.0, 1.0, 1.0, -2.0, -2.0, -2.0]
        );
    }

    #[test]
    fn rejects_non_column_inputs() {
        let mut context = ExecutionContext::new();
        let wide = context.constant(vec![0.0; 4], vec![2, 2]).unwrap();
        assert_eq!(
            context.broadcast_bias(wide, 3),
            Err(GradFlowError::ShapeMismatch {
                operation: "broadcast_bias",
                left: vec![2, 2],
                right: vec![2, 1],
            })
        );
    }
}
