use gradflow_core::optim::BatchSizeProvider;

/// Batch source stub reporting a fixed row count.
#[derive(Debug)]
pub struct FixedBatch(pub usize);

impl BatchSizeProvider for FixedBatch {
    fn batch_rows(&self) -> usize {
        self.0
    }
}
