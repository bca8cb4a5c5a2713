//! Testing utilities for the Remedy workspace
//!
//! Shared record builders, buffers and a temp-dir wired system.

#![allow(missing_docs)]

use remedy_adapter::{Mapping, Record};
use remedy_core::{RemedyConfig, RemedySystem};
use remedy_pipeline::IngestionBuffer;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

pub fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

pub fn clean_record(line_id: u64) -> Record {
    record(json!({
        "LineId": line_id,
        "Level": "INFO",
        "Component": "pipeline",
        "Content": "request served",
        "latency_ms": 20,
    }))
}

/// Record with `Level` renamed to `level`
pub fn drifted_record(line_id: u64) -> Record {
    record(json!({
        "LineId": line_id,
        "level": "INFO",
        "Component": "pipeline",
        "Content": "request served",
        "latency_ms": 20,
    }))
}

pub fn level_mapping() -> Mapping {
    Mapping::from([("level".to_string(), "Level".to_string())])
}

pub fn buffer_with(records: impl IntoIterator<Item = Record>) -> Arc<IngestionBuffer> {
    let buffer = Arc::new(IngestionBuffer::default());
    buffer.extend(records);
    buffer
}

pub fn drifted_buffer(n: u64) -> Arc<IngestionBuffer> {
    buffer_with((1..=n).map(drifted_record))
}

/// A file-backed system rooted in a temporary directory
pub struct TestSystem {
    pub dir: TempDir,
    pub system: RemedySystem,
}

impl TestSystem {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let system = RemedySystem::open(Self::config_for(&dir)).unwrap();
        Self { dir, system }
    }

    pub fn with_config(config: RemedyConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let system = RemedySystem::open(config.with_data_dir(dir.path())).unwrap();
        Self { dir, system }
    }

    pub fn config_for(dir: &TempDir) -> RemedyConfig {
        RemedyConfig::default().with_data_dir(dir.path())
    }

    /// Reopen the same directory as a fresh process would
    pub fn reopen(&self) -> RemedySystem {
        RemedySystem::open(Self::config_for(&self.dir)).unwrap()
    }
}

impl Default for TestSystem {
    fn default() -> Self {
        Self::new()
    }
}
