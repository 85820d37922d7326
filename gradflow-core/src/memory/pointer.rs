//! Tagged fat-pointer handles over the execution arenas.
//!
//! A handle packs `{region, length, offset}` into 64 bits: the region tag in
//! bits 63..62, the element length in bits 61..32 and the element offset in
//! bits 31..0. The shape of the slot rides out of band next to the packed
//! address; its product always equals the encoded length.

/// Region tag of the forward arena. The two backward arenas use the
/// alternating tags 2 and 3, owned by [`MemoryArenas`](super::arena::MemoryArenas).
pub(crate) const FORWARD_TAG: u8 = 1;

const LENGTH_LIMIT: usize = (1 << 30) - 1;
const LENGTH_MASK: u64 = LENGTH_LIMIT as u64;

/// Handle to a slot in one of the execution arenas.
///
/// The null handle is the packed integer zero; dereferencing it fails. A
/// handle stays valid for the step (forward region) or until the next layer
/// swap (backward regions).
#[derive(Debug, Clone, PartialEq)]
pub struct TensorPointer {
    address: u64,
    shape: Vec<usize>,
}

impl TensorPointer {
    /// The null handle. Returned by operations that produce no result for a
    /// side, e.g. the label side of a cost function.
    pub const NULL: TensorPointer = TensorPointer {
        address: 0,
        shape: Vec::new(),
    };

    pub(crate) fn pack(region: u8, offset: usize, length: usize, shape: Vec<usize>) -> Self {
        debug_assert_eq!(length, stride(&shape));
        debug_assert!(region >= 1 && region <= 3);
        assert!(
            length <= LENGTH_LIMIT,
            "slot length {length} exceeds handle capacity"
        );
        assert!(
            offset <= u32::MAX as usize,
            "slot offset {offset} exceeds handle capacity"
        );
        let address = ((region as u64) << 62) | ((length as u64) << 32) | offset as u64;
        TensorPointer { address, shape }
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    /// Element offset into the owning region.
    pub fn offset(&self) -> usize {
        self.address as u32 as usize
    }

    /// Slot length in float elements.
    pub fn len(&self) -> usize {
        ((self.address >> 32) & LENGTH_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub(crate) fn region(&self) -> u8 {
        (self.address >> 62) as u8
    }
}

/// Number of float elements a shape spans.
pub fn stride(shape: &[usize]) -> usize {
    shape.iter().product()
}
