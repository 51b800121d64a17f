//! Routed-record batch accumulator.

use std::time::{Duration, Instant};

use nozzle_core::RoutedRecord;

/// An ordered batch of routed records, owned by one delivery worker once
/// completed.
#[derive(Debug)]
pub struct Batch {
    records: Vec<RoutedRecord>,
    created_at: Instant,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            created_at: Instant::now(),
        }
    }

    /// Appends a record, preserving arrival order.
    pub fn push(&mut self, record: RoutedRecord) {
        if self.records.is_empty() {
            self.created_at = Instant::now();
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time since the first record was appended.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn records(&self) -> &[RoutedRecord] {
        &self.records
    }

    /// Takes the accumulated records and resets the batch.
    pub fn take(&mut self) -> Batch {
        let records = std::mem::take(&mut self.records);
        self.created_at = Instant::now();
        Batch {
            records,
            created_at: Instant::now(),
        }
    }
}
