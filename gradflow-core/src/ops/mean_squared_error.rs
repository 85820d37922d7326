//! Squared-error cost function.

use crate::cpu::vector;
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// Cost function summing squared differences. Forward caches `P − E`;
    /// in training mode the scalar loss is skipped and the null handle is
    /// returned. Left backward is `2·(P − E)`; the label side never
    /// produces a gradient. The per-batch mean is taken by the optimizer's
    /// batch divisor, not here.
    pub fn mean_squared_error(
        &mut self,
        predicted: OpId,
        expected: OpId,
    ) -> Result<OpId, GradFlowError> {
        let predicted_shape = self.node(predicted).max_result_shape.clone();
        let expected_shape = self.node(expected).max_result_shape.clone();
        if expected_shape != predicted_shape {
            return Err(GradFlowError::ShapeMismatch {
                operation: "mean_squared_error",
                left: predicted_shape,
                right: expected_shape,
            });
        }

        let requires_derivative = self.node(predicted).requires_derivative;
        self.attach(
            OpKind::MeanSquaredError {
                diff: TensorPointer::NULL,
                training: false,
            },
            Some(predicted),
            Some(expected),
            predicted_shape,
            requires_derivative,
        )
    }

    pub(crate) fn forward_mean_squared_error(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (predicted, expected, training) = {
            let node = &self.nodes[id.0];
            let training = match &node.kind {
                OpKind::MeanSquaredError { training, .. } => *training,
                _ => unreachable!("forward_mean_squared_error on a different node"),
            };
            (node.left_result.clone(), node.right_result.clone(), training)
        };

        if predicted.shape() != expected.shape() {
            return Err(GradFlowError::ShapeMismatch {
                operation: "mean_squared_error",
                left: predicted.shape().to_vec(),
                right: expected.shape().to_vec(),
            });
        }

        let diff_slot = self.memory.allocate_forward(predicted.shape());
        {
            let (dst, view) = self.memory.write_slot(&diff_slot);
            vector::sub(view.slice(&predicted)?, view.slice(&expected)?, dst);
        }
        match &mut self.nodes[id.0].kind {
            OpKind::MeanSquaredError { diff, .. } => *diff = diff_slot.clone(),
            _ => unreachable!(),
        }

        if training {
            return Ok(TensorPointer::NULL);
        }

        let loss = self.memory.allocate_forward(&[1, 1]);
        let (dst, view) = self.memory.write_slot(&loss);
        dst[0] = vector::sum_of_squares(view.slice(&diff_slot)?);
        Ok(loss)
    }

    pub(crate) fn backward_mean_squared_error(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let diff_slot = match &self.nodes[id.0].kind {
            OpKind::MeanSquaredError { diff, .. } => diff.clone(),
            _ => unreachable!("backward_mean_squared_error on a different node"),
        };
        let out = self.memory.allocate_backward(diff_slot.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::scale(view.slice(&diff_slot)?, 2.0, dst);
        Ok(out)
    }
}
