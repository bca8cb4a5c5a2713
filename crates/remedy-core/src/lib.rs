//! Remedy Core - closed-loop remediation of schema drift
//!
//! A failed pipeline run is diagnosed (signature cache, then an optional
//! external analyzer, then a local heuristic), the proposed fix is turned
//! into an adapter mapping, the mapping is validated by a canary replay,
//! and the decision gate either promotes it (remembering a signature) or
//! rolls it back (clearing every adapter).
//!
//! # Example
//!
//! ```rust
//! use remedy_core::prelude::*;
//!
//! let system = RemedySystem::in_memory(RemedyConfig::default()).unwrap();
//! let orchestrator = &system.orchestrator;
//!
//! let failed = orchestrator.run_pipeline(&RunMode::Flaky, false).unwrap();
//! assert!(!failed.is_ok());
//!
//! let outcome = orchestrator.remediate(&failed.run_id, FAIL_REASON);
//! assert_eq!(outcome.status, WorkflowStatus::Promoted);
//!
//! let repaired = orchestrator.run_pipeline(&RunMode::Flaky, true).unwrap();
//! assert!(repaired.is_ok());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod canary;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod orchestrator;
pub mod remediation;
pub mod system;
pub mod telemetry;

pub use canary::{p95, CanaryResult, CanaryRunner};
pub use config::{RemedyConfig, Thresholds};
pub use error::{RemedyError, Result};
pub use extractor::{FixExtractor, PhraseExtractor};
pub use gate::{evaluate, Action, Decision, DecisionGate, DecisionMetrics};
pub use orchestrator::{
    allowed_transitions, validate_transition, Orchestrator, PatchOutcome, WorkflowOutcome,
    WorkflowState, WorkflowStatus, NO_PATCH_REASON,
};
pub use remediation::analyzer::{AnalysisRequest, Analyzer, AnalyzerError};
pub use remediation::fingerprint::{cosine_similarity, fingerprint, Embedding};
pub use remediation::report::{DiagnosisMethod, Evidence, ProposedFix, Report};
pub use remediation::signature::{Signature, SignatureCache};
pub use remediation::{describe_mapping, Remediator};
pub use system::RemedySystem;
pub use telemetry::{init_tracing, LogFormat};

/// Commonly used items
pub mod prelude {
    pub use crate::canary::CanaryResult;
    pub use crate::config::{RemedyConfig, Thresholds};
    pub use crate::error::{RemedyError, Result};
    pub use crate::gate::{Action, Decision};
    pub use crate::orchestrator::{Orchestrator, PatchOutcome, WorkflowOutcome, WorkflowStatus};
    pub use crate::remediation::report::{DiagnosisMethod, Report};
    pub use crate::system::RemedySystem;
    pub use remedy_adapter::{AdapterRegistry, Mapping, Record};
    pub use remedy_pipeline::{RunMode, FAIL_REASON};
    pub use remedy_trace::{RunId, RunStatus, TraceStore};
}
