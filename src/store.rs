use crate::model::ExtractionResult;
use parking_lot::Mutex;

/// Append-only collection of per-task extraction results.
///
/// Appends are serialized internally; callers share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ItemStore {
    items: Mutex<Vec<ExtractionResult>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: ExtractionResult) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Copy of every stored result, in append order.
    pub fn items(&self) -> Vec<ExtractionResult> {
        self.items.lock().clone()
    }
}
