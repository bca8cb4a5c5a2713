//! Remedy Trace - run metadata and ordered event logs
//!
//! Every pipeline run gets a [`Run`] row and an append-only sequence of
//! [`Event`]s. Indices are assigned by the [`TraceStore`], never by callers,
//! and readers always see events sorted by index.
//!
//! # Example
//!
//! ```rust
//! use remedy_trace::{Instrumented, Stage, TraceStore, Tracer, TraceError};
//! use std::sync::Arc;
//!
//! struct Intake;
//!
//! impl Stage for Intake {
//!     type Input = String;
//!     type Output = String;
//!     type Error = TraceError;
//!
//!     fn agent(&self) -> &'static str {
//!         "Intake"
//!     }
//!
//!     fn run(&self, _tracer: &Tracer, mode: String) -> Result<String, TraceError> {
//!         Ok(format!("ready:{mode}"))
//!     }
//! }
//!
//! let store = Arc::new(TraceStore::in_memory());
//! let run_id = store.start_run("normal").unwrap();
//! let tracer = Tracer::new(Arc::clone(&store), run_id.clone());
//! Instrumented::new(Intake).run(&tracer, "normal".into()).unwrap();
//! assert_eq!(store.load_events(&run_id).len(), 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod instrument;
pub mod store;
pub mod types;

pub use error::{Result, TraceError};
pub use instrument::{elapsed_ms, Instrumented, Stage, Tracer};
pub use store::TraceStore;
pub use types::{Event, EventKind, MetricKey, Run, RunId, RunStatus};
