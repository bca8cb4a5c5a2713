//! Remedy Pipeline - the instrumented Intake → Retrieve → Audit pipeline
//!
//! Stages implement [`remedy_trace::Stage`] and are composed by the
//! [`PipelineExecutor`]. Records come from an [`IngestionSource`]; the
//! [`StreamProducer`] keeps an [`IngestionSink`] fed in the background.
//! Failure injection is an owned [`FailureInjection`] value, never a global.
//!
//! # Example
//!
//! ```rust
//! use remedy_adapter::AdapterRegistry;
//! use remedy_pipeline::{
//!     FailureInjection, LogRecordGenerator, PipelineExecutor, RunMode, SyntheticSource,
//! };
//! use remedy_trace::{RunStatus, TraceStore};
//! use std::sync::Arc;
//!
//! let source = SyntheticSource::new(LogRecordGenerator::default(), Arc::new(FailureInjection::new()));
//! let executor = PipelineExecutor::new(
//!     Arc::new(TraceStore::in_memory()),
//!     Arc::new(AdapterRegistry::in_memory()),
//!     Arc::new(source),
//! );
//!
//! let run_id = executor.start_run(&RunMode::Flaky).unwrap();
//! let outcome = executor.run_pipeline(&run_id, &RunMode::Flaky, false).unwrap();
//! assert_eq!(outcome.status, RunStatus::Failed);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod executor;
pub mod failure;
pub mod ingest;
pub mod producer;
pub mod record;
pub mod stages;
pub mod telemetry;

pub use error::{EvalError, PipelineError, Result};
pub use executor::{PipelineExecutor, PipelineOutcome, RunCounts, FAIL_REASON};
pub use failure::{FailureInjection, FailureSnapshot};
pub use ingest::{IngestionBuffer, IngestionSink, IngestionSource, SyntheticSource};
pub use producer::{ProducerStatus, StreamProducer};
pub use record::{evaluate_record, Evaluation, LogRecordGenerator, REQUIRED_FIELDS};
pub use remedy_adapter::Record;
pub use stages::{AuditEntry, AuditInput, AuditOutput, RunMode};
pub use telemetry::{MetricsSink, NoopSink, TelemetrySink};
