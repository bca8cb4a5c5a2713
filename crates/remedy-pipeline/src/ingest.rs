//! Ingestion contracts and the in-memory buffer
//!
//! [`IngestionSource`] is what Retrieve and the canary read from;
//! [`IngestionSink`] is what the stream producer writes to. Real backends
//! implement these; [`IngestionBuffer`] is the bounded in-process one.

use crate::error::{PipelineError, Result};
use crate::failure::FailureInjection;
use crate::record::LogRecordGenerator;
use parking_lot::Mutex;
use remedy_adapter::Record;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default capacity of [`IngestionBuffer`]
pub const DEFAULT_CAPACITY: usize = 1000;

/// Source of recently observed records
#[cfg_attr(test, mockall::automock)]
pub trait IngestionSource: Send + Sync {
    /// Up to `n` most recent records, oldest first
    ///
    /// Backends that fail return an empty batch.
    fn get_recent(&self, n: usize) -> Vec<Record>;
}

/// Destination for produced records
#[cfg_attr(test, mockall::automock)]
pub trait IngestionSink: Send + Sync {
    /// Store one record
    ///
    /// # Errors
    /// [`PipelineError::Ingestion`] if the backend refuses the record.
    fn insert(&self, record: Record) -> Result<()>;
}

/// Bounded ring of the latest records
#[derive(Debug)]
pub struct IngestionBuffer {
    records: Mutex<VecDeque<Record>>,
    capacity: usize,
}

impl IngestionBuffer {
    /// Buffer holding at most `capacity` records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
        }
    }

    /// Append, evicting the oldest record when full
    pub fn push(&self, record: Record) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Append many records in order
    pub fn extend(&self, batch: impl IntoIterator<Item = Record>) {
        for record in batch {
            self.push(record);
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for IngestionBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl IngestionSource for IngestionBuffer {
    fn get_recent(&self, n: usize) -> Vec<Record> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(n);
        records.iter().skip(skip).cloned().collect()
    }
}

impl IngestionSink for IngestionBuffer {
    fn insert(&self, record: Record) -> Result<()> {
        if self.capacity == 0 {
            return Err(PipelineError::Ingestion("buffer has zero capacity".into()));
        }
        self.push(record);
        Ok(())
    }
}

/// Source that synthesizes a fresh batch on every read
#[derive(Debug)]
pub struct SyntheticSource {
    generator: Mutex<LogRecordGenerator>,
    failures: Arc<FailureInjection>,
}

impl SyntheticSource {
    #[must_use]
    pub fn new(generator: LogRecordGenerator, failures: Arc<FailureInjection>) -> Self {
        Self {
            generator: Mutex::new(generator),
            failures,
        }
    }
}

impl IngestionSource for SyntheticSource {
    fn get_recent(&self, n: usize) -> Vec<Record> {
        self.generator.lock().batch(n, &self.failures.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: u64) -> Record {
        json!({"LineId": id, "Level": "INFO"}).as_object().cloned().unwrap()
    }

    fn ids(records: &[Record]) -> Vec<u64> {
        records.iter().map(|r| r["LineId"].as_u64().unwrap()).collect()
    }

    #[test]
    fn get_recent_returns_tail_in_insertion_order() {
        let buffer = IngestionBuffer::default();
        buffer.extend((1..=5).map(record));
        assert_eq!(ids(&buffer.get_recent(3)), vec![3, 4, 5]);
        assert_eq!(ids(&buffer.get_recent(10)), vec![1, 2, 3, 4, 5]);
        assert!(buffer.get_recent(0).is_empty());
    }

    #[test]
    fn oldest_records_are_evicted() {
        let buffer = IngestionBuffer::with_capacity(3);
        buffer.extend((1..=5).map(record));
        assert_eq!(buffer.len(), 3);
        assert_eq!(ids(&buffer.get_recent(3)), vec![3, 4, 5]);
    }

    #[test]
    fn synthetic_source_follows_drift_flag() {
        let failures = Arc::new(FailureInjection::new());
        let source = SyntheticSource::new(LogRecordGenerator::default(), Arc::clone(&failures));
        assert!(source.get_recent(3).iter().all(|r| r.contains_key("Level")));

        failures.inject_drift(true);
        let drifted = source.get_recent(3);
        assert_eq!(drifted.len(), 3);
        assert!(drifted.iter().all(|r| r.contains_key("level")));
    }

    #[test]
    fn zero_capacity_sink_refuses() {
        let buffer = IngestionBuffer::with_capacity(0);
        assert!(buffer.insert(record(1)).is_err());
        assert!(buffer.is_empty());
    }
}
