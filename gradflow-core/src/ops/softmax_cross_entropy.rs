//! Fused softmax and cross-entropy cost function.

use crate::cpu::{matrix, vector};
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// Cost function over a 2-D prediction and a matching expected
    /// distribution. Forward always caches the row softmax of the
    /// prediction; in training mode the scalar loss is skipped and the null
    /// handle is returned. Left backward is `softmax(P) − E`; the label side
    /// never produces a gradient.
    pub fn softmax_cross_entropy(
        &mut self,
        predicted: OpId,
        expected: OpId,
    ) -> Result<OpId, GradFlowError> {
        let predicted_shape = self.node(predicted).max_result_shape.clone();
        let expected_shape = self.node(expected).max_result_shape.clone();
        if predicted_shape.len() != 2 {
            return Err(GradFlowError::CostFunctionRank {
                shape: predicted_shape,
            });
        }
        if expected_shape != predicted_shape {
            return Err(GradFlowError::ShapeMismatch {
                operation: "softmax_cross_entropy",
                left: predicted_shape,
                right: expected_shape,
            });
        }

        let requires_derivative = self.node(predicted).requires_derivative;
        self.attach(
            OpKind::SoftmaxCrossEntropy {
                softmax: TensorPointer::NULL,
                training: false,
            },
            Some(predicted),
            Some(expected),
            predicted_shape,
            requires_derivative,
        )
    }

    pub(crate) fn forward_softmax_cross_entropy(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (predicted, expected, training) = {
            let node = &self.nodes[id.0];
            let training = match &node.kind {
                OpKind::SoftmaxCrossEntropy { training, .. } => *training,
                _ => unreachable!("forward_softmax_cross_entropy on a different node"),
            };
            (node.left_result.clone(), node.right_result.clone(), training)
        };
        if predicted.shape() != expected.shape() {
            return Err(GradFlowError::ShapeMismatch {
                operation: "softmax_cross_entropy",
                left: predicted.shape().to_vec(),
                right: expected.shape().to_vec(),
            });
        }
        let rows = predicted.shape()[0];
        let cols = predicted.shape()[1];

        let softmax_slot = self.memory.allocate_forward(predicted.shape());
        {
            let (dst, view) = self.memory.write_slot(&softmax_slot);
            matrix::softmax_rows(view.slice(&predicted)?, dst, rows, cols);
        }
        match &mut self.nodes[id.0].kind {
            OpKind::SoftmaxCrossEntropy { softmax, .. } => *softmax = softmax_slot.clone(),
            _ => unreachable!(),
        }

        if training {
            return Ok(TensorPointer::NULL);
        }

        let loss = self.memory.allocate_forward(&[1, 1]);
        let (dst, view) = self.memory.write_slot(&loss);
        dst[0] = vector::cross_entropy(view.slice(&softmax_slot)?, view.slice(&expected)?);
        Ok(loss)
    }

    pub(crate) fn backward_softmax_cross_entropy(
        &mut self,
        id: OpId,
    ) -> Result<TensorPointer, GradFlowError> {
        let (softmax_slot, expected) = {
            let node = &self.nodes[id.0];
            let softmax_slot = match &node.kind {
                OpKind::SoftmaxCrossEntropy { softmax, .. } => softmax.clone(),
                _ => unreachable!("backward_softmax_cross_entropy on a different node"),
            };
            (softmax_slot, node.right_result.clone())
        };
        let out = self.memory.allocate_backward(softmax_slot.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::sub(view.slice(&softmax_slot)?, view.slice(&expected)?, dst);
        Ok(out)
    }
}
