//! End-to-end behavior of the execution context: algebraic identities,
//! terminal ordering, determinism and backward gradients observed through
//! recording optimizers.

use approx::assert_relative_eq;

use gradflow_core::test_utils::{NullOptimizer, RecordingOptimizer};
use gradflow_core::{ExecutionContext, GradFlowError};

#[test]
fn adding_zero_is_the_identity_bitwise() {
    let data = vec![1.5, -2.25, 0.0625, 3.0];
    let mut context = ExecutionContext::new();
    let value = context.constant(data.clone(), vec![2, 2]).unwrap();
    let zero = context.constant(vec![0.0; 4], vec![2, 2]).unwrap();
    let _sum = context.add(value, zero).unwrap();
    context.register_operation(value).unwrap();
    context.register_operation(zero).unwrap();
    context.initialize_execution().unwrap();

    let results = context.execute_forward_propagation().unwrap();
    assert_eq!(context.memory_buffer(&results[0]).unwrap(), &data[..]);
}

#[test]
fn multiplying_by_the_identity_preserves_values() {
    let data = vec![0.5, -1.5, 2.5, 3.5, -4.5, 5.5];
    let identity = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    let mut context = ExecutionContext::new();
    let value = context.constant(data.clone(), vec![2, 3]).unwrap();
    let eye = context.constant(identity, vec![3, 3]).unwrap();
    let _product = context.multiplication(value, eye).unwrap();
    context.register_operation(value).unwrap();
    context.register_operation(eye).unwrap();
    context.initialize_execution().unwrap();

    let results = context.execute_forward_propagation().unwrap();
    let product = context.memory_buffer(&results[0]).unwrap();
    for (&out, &reference) in product.iter().zip(&data) {
        assert_relative_eq!(out, reference, epsilon = 1e-4);
    }
}

#[test]
fn terminal_handles_follow_registration_order() {
    let mut context = ExecutionContext::new();
    let first = context.constant(vec![1.0], vec![1, 1]).unwrap();
    let second = context.constant(vec![2.0], vec![1, 1]).unwrap();
    let third = context.constant(vec![3.0], vec![1, 1]).unwrap();
    context.register_operation(first).unwrap();
    context.register_operation(second).unwrap();
    context.register_operation(third).unwrap();
    context.initialize_execution().unwrap();

    let results = context.execute_forward_propagation().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(context.memory_buffer(&results[0]).unwrap(), &[1.0]);
    assert_eq!(context.memory_buffer(&results[1]).unwrap(), &[2.0]);
    assert_eq!(context.memory_buffer(&results[2]).unwrap(), &[3.0]);
}

#[test]
fn repeated_steps_are_bitwise_deterministic() {
    let mut context = ExecutionContext::new();
    let value = context
        .constant(vec![0.1, 0.2, 0.3, 0.4], vec![2, 2])
        .unwrap();
    let weight = context
        .variable(vec![0.7, -0.3, 1.1, 0.5], vec![2, 2], Box::new(NullOptimizer))
        .unwrap();
    let product = context.multiplication(value, weight).unwrap();
    let _activation = context.leaky_relu(0.01, product).unwrap();
    context.register_operation(value).unwrap();
    context.register_operation(weight).unwrap();
    context.initialize_execution().unwrap();

    let first = context.execute_propagation().unwrap();
    let first_bytes = context.memory_buffer(&first[0]).unwrap().to_vec();
    let second = context.execute_propagation().unwrap();
    let second_bytes = context.memory_buffer(&second[0]).unwrap().to_vec();
    assert_eq!(first_bytes, second_bytes);
}

// Upstream gradient of ones reaches the activation input masked by the
// sign of the forward input.
#[test]
fn leaky_relu_gradient_applies_the_slope_mask() {
    let (recorder, gradients) = RecordingOptimizer::new();
    let mut context = ExecutionContext::new();
    let input = context
        .variable(vec![-1.0, 2.0, -3.0], vec![1, 3], Box::new(recorder))
        .unwrap();
    let activation = context.leaky_relu(0.01, input).unwrap();
    // Targets sit half a unit under the activation output, so the squared
    // error derivative is exactly one per element.
    let target = context
        .constant(vec![-0.51, 1.5, -0.53], vec![1, 3])
        .unwrap();
    let _cost = context.mean_squared_error(activation, target).unwrap();
    context.register_operation(input).unwrap();
    context.register_operation(target).unwrap();
    context.initialize_execution().unwrap();
    context.set_training_mode(true);

    context.execute_propagation().unwrap();

    let gradients = gradients.borrow();
    assert_eq!(gradients.len(), 1);
    let expected = [0.01, 1.0, 0.01];
    for (&out, &reference) in gradients[0].iter().zip(&expected) {
        assert_relative_eq!(out, reference, epsilon = 1e-6);
    }
}

#[test]
fn softmax_cross_entropy_gradient_is_softmax_minus_labels() {
    let (recorder, gradients) = RecordingOptimizer::new();
    let mut context = ExecutionContext::new();
    let predicted = context
        .variable(vec![2.0, 1.0, 0.0], vec![1, 3], Box::new(recorder))
        .unwrap();
    let expected = context.constant(vec![1.0, 0.0, 0.0], vec![1, 3]).unwrap();
    let _cost = context.softmax_cross_entropy(predicted, expected).unwrap();
    context.register_operation(predicted).unwrap();
    context.register_operation(expected).unwrap();
    context.initialize_execution().unwrap();
    context.set_training_mode(true);

    let results = context.execute_propagation().unwrap();
    assert!(results[0].is_null());

    let gradients = gradients.borrow();
    assert_eq!(gradients.len(), 1);
    let expected_gradient = [-0.33, 0.245, 0.090];
    for (&out, &reference) in gradients[0].iter().zip(&expected_gradient) {
        assert_relative_eq!(out, reference, epsilon = 1e-3);
    }
}

#[test]
fn bias_broadcast_gradient_collapses_the_batch_dimension() {
    let (recorder, gradients) = RecordingOptimizer::new();
    let mut context = ExecutionContext::new();
    let bias = context
        .variable(vec![1.0, -1.0], vec![2, 1], Box::new(recorder))
        .unwrap();
    let broadcast = context.broadcast_bias(bias, 3).unwrap();
    let target = context
        .constant(vec![0.5, 0.5, 0.5, -1.5, -1.5, -1.5], vec![2, 3])
        .unwrap();
    let _cost = context.mean_squared_error(broadcast, target).unwrap();
    context.register_operation(bias).unwrap();
    context.register_operation(target).unwrap();
    context.initialize_execution().unwrap();
    context.set_training_mode(true);

    context.execute_propagation().unwrap();

    // Upstream gradient is 2·(P − T) = [[1,1,1],[1,1,1]]; summing along the
    // broadcast dimension gives 3 per bias row.
    let gradients = gradients.borrow();
    assert_eq!(gradients[0], vec![3.0, 3.0]);
}

#[test]
fn null_results_cannot_be_dereferenced() {
    let mut context = ExecutionContext::new();
    let predicted = context.constant(vec![0.0, 0.0], vec![1, 2]).unwrap();
    let expected = context.constant(vec![0.0, 0.0], vec![1, 2]).unwrap();
    let _cost = context.mean_squared_error(predicted, expected).unwrap();
    context.register_operation(predicted).unwrap();
    context.register_operation(expected).unwrap();
    context.initialize_execution().unwrap();
    context.set_training_mode(true);

    let results = context.execute_forward_propagation().unwrap();
    assert_eq!(
        context.memory_buffer(&results[0]),
        Err(GradFlowError::NullHandle)
    );
}
