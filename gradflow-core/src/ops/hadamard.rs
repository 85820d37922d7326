//! Elementwise product.

use crate::cpu::vector;
use crate::error::GradFlowError;
use crate::graph::context::ExecutionContext;
use crate::graph::operation::{OpId, OpKind, Side};
use crate::memory::TensorPointer;

impl ExecutionContext {
    /// `left ⊙ right`; both operands must share a shape.
    pub fn hadamard_product(&mut self, left: OpId, right: OpId) -> Result<OpId, GradFlowError> {
        let left_shape = self.node(left).max_result_shape.clone();
        let right_shape = self.node(right).max_result_shape.clone();
        if left_shape != right_shape {
            return Err(GradFlowError::ShapeMismatch {
                operation: "hadamard_product",
                left: left_shape,
                right: right_shape,
            });
        }

        let requires_derivative =
            self.node(left).requires_derivative || self.node(right).requires_derivative;
        self.attach(
            OpKind::HadamardProduct,
            Some(left),
            Some(right),
            left_shape,
            requires_derivative,
        )
    }

    pub(crate) fn forward_hadamard(&mut self, id: OpId) -> Result<TensorPointer, GradFlowError> {
        let (left_result, right_result) = {
            let node = &self.nodes[id.0];
            (node.left_result.clone(), node.right_result.clone())
        };
        if left_result.shape() != right_result.shape() {
            return Err(GradFlowError::ShapeMismatch {
                operation: "hadamard_product",
                left: left_result.shape().to_vec(),
                right: right_result.shape().to_vec(),
            });
        }
        let out = self.memory.allocate_forward(left_result.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::mul(view.slice(&left_result)?, view.slice(&right_result)?, dst);
        Ok(out)
    }

    /// Each side's gradient is the chain times the other side's cached
    /// forward value.
    pub(crate) fn backward_hadamard(
        &mut self,
        id: OpId,
        side: Side,
    ) -> Result<TensorPointer, GradFlowError> {
        let (chain, other) = {
            let node = &self.nodes[id.0];
            let other = match side {
                Side::Left => node.right_result.clone(),
                Side::Right => node.left_result.clone(),
            };
            (node.derivative_chain.clone(), other)
        };
        let out = self.memory.allocate_backward(chain.shape());
        let (dst, view) = self.memory.write_slot(&out);
        vector::mul(view.slice(&chain)?, view.slice(&other)?, dst);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::context::ExecutionContext;

    fn product_of(a_data: Vec<f32>, b_data: Vec<f32>) -> Vec<f32> {
        let mut context = ExecutionContext::new();
        let a = context.constant(a_data, vec![2, 2]).unwrap();
        let b = context.constant(b_data, vec![2, 2]).unwrap();
        let _product = context.hadamard_product(a, b).unwrap();
        context.register_operation(a).unwrap();
        context.register_operation(b).unwrap();
        context.initialize_execution().unwrap();
        let results = context.execute_forward_propagation().unwrap();
        context.memory_buffer(&results[0]).unwrap().to_vec()
    }

    #[test]
    fn multiplies_elementwise_and_commutes_bitwise() {
        let a = vec![1.5, -2.0, 0.25, 3.0];
        let b = vec![4.0, 0.5, -8.0, 1.0 / 3.0];
        let ab = product_of(a.clone(), b.clone());
        let ba = product_of(b, a);
        assert_eq!(ab, vec![6.0, -1.0, -2.0, 1.0]);
        assert_eq!(ab, ba);
    }
}
