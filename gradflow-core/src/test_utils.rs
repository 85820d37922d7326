//! Optimizer stubs shared by the crate's own tests and by downstream
//! integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::GradFlowError;
use crate::optim::GradientOptimizer;

/// Ignores every gradient; variables bound to it never change.
#[derive(Debug)]
pub struct NullOptimizer;

impl GradientOptimizer for NullOptimizer {
    fn optimize(
        &mut self,
        _data: &mut [f32],
        _gradient: &[f32],
        _shape: &[usize],
    ) -> Result<(), GradFlowError> {
        Ok(())
    }
}

/// Records every delivered gradient without touching the variable, so tests
/// can assert on raw backward outputs.
#[derive(Debug)]
pub struct RecordingOptimizer {
    gradients: Rc<RefCell<Vec<Vec<f32>>>>,
}

impl RecordingOptimizer {
    /// Returns the optimizer plus the shared log of gradients it will
    /// capture, one entry per delivery.
    pub fn new() -> (Self, Rc<RefCell<Vec<Vec<f32>>>>) {
        let gradients = Rc::new(RefCell::new(Vec::new()));
        (
            RecordingOptimizer {
                gradients: gradients.clone(),
            },
            gradients,
        )
    }
}

impl GradientOptimizer for RecordingOptimizer {
    fn optimize(
        &mut self,
        _data: &mut [f32],
        gradient: &[f32],
        _shape: &[usize],
    ) -> Result<(), GradFlowError> {
        self.gradients.borrow_mut().push(gradient.to_vec());
        Ok(())
    }
}
