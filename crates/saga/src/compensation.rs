//! Undo log for stock deductions.

use domain::StockKey;
use store::CatalogStore;

/// A decrement that was applied and can be reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDeduction {
    pub key: StockKey,
    pub quantity: u32,
}

/// A deduction whose reversal failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUndo {
    pub deduction: StockDeduction,
    pub reason: String,
}

/// Records every decrement applied so far in one deduction batch.
#[derive(Debug, Default)]
pub struct UndoLog {
    entries: Vec<StockDeduction>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: StockKey, quantity: u32) {
        self.entries.push(StockDeduction { key, quantity });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they will be reversed: newest first.
    pub fn undo_order(&self) -> impl Iterator<Item = &StockDeduction> {
        self.entries.iter().rev()
    }

    /// Reverses every recorded decrement, newest first.
    ///
    /// Keeps going past failures and returns them; an empty result means the
    /// counters are back where the batch started.
    pub async fn rollback<S>(self, store: &S) -> Vec<FailedUndo>
    where
        S: CatalogStore + ?Sized,
    {
        let mut failures = Vec::new();
        for deduction in self.undo_order() {
            let reason = match store.increment_stock(&deduction.key, deduction.quantity).await {
                Ok(Some(_)) => continue,
                Ok(None) => "stock counter disappeared".to_string(),
                Err(e) => e.to_string(),
            };
            tracing::error!(
                key = %deduction.key,
                quantity = deduction.quantity,
                reason = %reason,
                "failed to reverse stock deduction"
            );
            failures.push(FailedUndo {
                deduction: deduction.clone(),
                reason,
            });
        }
        failures
    }
}
