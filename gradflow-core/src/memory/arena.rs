//! Bump-allocated float arenas behind the tensor-pointer scheme.
//!
//! One forward arena grows monotonically over a step; two backward arenas of
//! identical capacity alternate between adjacent layers. The layer swap
//! exchanges the two buffers and their tags, so handles written under the old
//! current tag keep resolving to the bytes they were written to while the new
//! current buffer is recycled.

use crate::error::GradFlowError;

use super::pointer::{stride, TensorPointer, FORWARD_TAG};

pub(crate) struct MemoryArenas {
    forward: Vec<f32>,
    forward_index: usize,
    previous_backward: Vec<f32>,
    current_backward: Vec<f32>,
    previous_flag: u8,
    current_flag: u8,
    backward_index: usize,
}

/// Read-only window over the arenas, handed to kernels together with a write
/// slot. The arena holding the write slot is exposed only up to the slot's
/// offset, so a kernel cannot observe its own output.
pub(crate) struct ArenaView<'a> {
    forward: &'a [f32],
    previous: &'a [f32],
    current: &'a [f32],
    current_flag: u8,
}

impl<'a> ArenaView<'a> {
    pub(crate) fn slice(&self, pointer: &TensorPointer) -> Result<&'a [f32], GradFlowError> {
        if pointer.is_null() {
            return Err(GradFlowError::NullHandle);
        }
        let region = pointer.region();
        let buffer = if region == FORWARD_TAG {
            self.forward
        } else if region == self.current_flag {
            self.current
        } else {
            self.previous
        };
        let offset = pointer.offset();
        let length = pointer.len();
        buffer
            .get(offset..offset + length)
            .ok_or(GradFlowError::StaleHandle {
                region,
                offset,
                length,
            })
    }
}

impl MemoryArenas {
    pub(crate) fn new(forward_capacity: usize, backward_capacity: usize) -> Self {
        MemoryArenas {
            forward: vec![0.0; forward_capacity],
            forward_index: 0,
            previous_backward: vec![0.0; backward_capacity],
            current_backward: vec![0.0; backward_capacity],
            previous_flag: 3,
            current_flag: 2,
            backward_index: 0,
        }
    }

    pub(crate) fn reset_forward(&mut self) {
        self.forward_index = 0;
    }

    pub(crate) fn reset_backward(&mut self) {
        self.backward_index = 0;
    }

    pub(crate) fn allocate_forward(&mut self, shape: &[usize]) -> TensorPointer {
        let length = stride(shape);
        assert!(
            self.forward_index + length <= self.forward.len(),
            "forward arena overflow: {} + {} exceeds capacity {}",
            self.forward_index,
            length,
            self.forward.len()
        );
        let pointer = TensorPointer::pack(FORWARD_TAG, self.forward_index, length, shape.to_vec());
        self.forward_index += length;
        pointer
    }

    pub(crate) fn allocate_backward(&mut self, shape: &[usize]) -> TensorPointer {
        let length = stride(shape);
        assert!(
            self.backward_index + length <= self.current_backward.len(),
            "backward arena overflow: {} + {} exceeds capacity {}",
            self.backward_index,
            length,
            self.current_backward.len()
        );
        let pointer = TensorPointer::pack(
            self.current_flag,
            self.backward_index,
            length,
            shape.to_vec(),
        );
        self.backward_index += length;
        pointer
    }

    /// Exchanges the two backward buffers and their tags and recycles the new
    /// current buffer. Invoked once per layer boundary.
    pub(crate) fn swap_backward(&mut self) {
        std::mem::swap(&mut self.previous_backward, &mut self.current_backward);
        std::mem::swap(&mut self.previous_flag, &mut self.current_flag);
        self.backward_index = 0;
    }

    /// Resolves a handle to its float slice.
    pub(crate) fn buffer(&self, pointer: &TensorPointer) -> Result<&[f32], GradFlowError> {
        self.view().slice(pointer)
    }

    pub(crate) fn view(&self) -> ArenaView<'_> {
        ArenaView {
            forward: &self.forward,
            previous: &self.previous_backward,
            current: &self.current_backward,
            current_flag: self.current_flag,
        }
    }

    /// Splits out the write slot behind `pointer` together with a read view
    /// of everything allocated before it.
    pub(crate) fn write_slot(
        &mut self,
        pointer: &TensorPointer,
    ) -> (&mut [f32], ArenaView<'_>) {
        assert!(!pointer.is_null(), "write through a null tensor handle");
        let offset = pointer.offset();
        let length = pointer.len();
        let region = pointer.region();
        if region == FORWARD_TAG {
            let (before, after) = self.forward.split_at_mut(offset);
            let view = ArenaView {
                forward: before,
                previous: &self.previous_backward,
                current: &self.current_backward,
                current_flag: self.current_flag,
            };
            (&mut after[..length], view)
        } else {
            assert_eq!(
                region, self.current_flag,
                "write through a stale backward handle"
            );
            let (before, after) = self.current_backward.split_at_mut(offset);
            let view = ArenaView {
                forward: &self.forward,
                previous: &self.previous_backward,
                current: before,
                current_flag: self.current_flag,
            };
            (&mut after[..length], view)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_allocation_bumps_monotonically() {
        let mut arenas = MemoryArenas::new(10, 0);
        let first = arenas.allocate_forward(&[2, 3]);
        let second = arenas.allocate_forward(&[4]);
        assert_eq!(first.offset(), 0);
        assert_eq!(second.offset(), 6);
        arenas.reset_forward();
        let third = arenas.allocate_forward(&[1]);
        assert_eq!(third.offset(), 0);
    }

    #[test]
    #[should_panic(expected = "forward arena overflow")]
    fn forward_overflow_aborts() {
        let mut arenas = MemoryArenas::new(4, 0);
        arenas.allocate_forward(&[5]);
    }

    #[test]
    fn written_data_survives_one_swap() {
        let mut arenas = MemoryArenas::new(0, 8);
        let slot = arenas.allocate_backward(&[3]);
        let (dst, _) = arenas.write_slot(&slot);
        dst.copy_from_slice(&[1.0, 2.0, 3.0]);

        arenas.swap_backward();
        // The old current tag now resolves to the previous buffer.
        assert_eq!(arenas.buffer(&slot).unwrap(), &[1.0, 2.0, 3.0]);

        // A fresh allocation reuses the other buffer under the other tag.
        let fresh = arenas.allocate_backward(&[2]);
        assert_ne!(fresh.region(), slot.region());
        assert_eq!(fresh.offset(), 0);
    }

    #[test]
    fn stale_handle_is_detected() {
        let mut arenas = MemoryArenas::new(4, 4);
        let slot = arenas.allocate_forward(&[4]);
        let shrunk = MemoryArenas::new(2, 0);
        assert!(matches!(
            shrunk.buffer(&slot),
            Err(GradFlowError::StaleHandle { .. })
        ));
        let _ = arenas;
    }

    #[test]
    fn null_handle_is_rejected() {
        let arenas = MemoryArenas::new(1, 1);
        assert_eq!(
            arenas.buffer(&TensorPointer::NULL),
            Err(GradFlowError::NullHandle)
        );
    }

    #[test]
    fn write_slot_hides_the_output_from_the_view() {
        let mut arenas = MemoryArenas::new(6, 0);
        let input = arenas.allocate_forward(&[2]);
        {
            let (dst, _) = arenas.write_slot(&input);
            dst.copy_from_slice(&[7.0, 8.0]);
        }
        let output = arenas.allocate_forward(&[2]);
        let (dst, view) = arenas.write_slot(&output);
        assert_eq!(view.slice(&input).unwrap(), &[7.0, 8.0]);
        assert!(view.slice(&output).is_err());
        dst.fill(0.0);
    }
}
