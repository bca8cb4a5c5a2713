//! Closed-loop remediation workflow
//!
//! ```text
//! Start -> Diagnose -> (cache hit) -------------------> Apply
//!                   -> (miss) Analyze -> ParsePatch --> Apply | NoPatch
//! Apply -> Canary -> Decide -> SaveSignature -> Success
//!                           -> ClearAdapters -> Failure
//! ```
//!
//! Any non-terminal state may move to `Error`. [`Orchestrator::remediate`]
//! never returns an error; faults become a `WorkflowStatus::Error` outcome.

use crate::canary::{CanaryResult, CanaryRunner};
use crate::config::{RemedyConfig, Thresholds};
use crate::error::{RemedyError, Result};
use crate::extractor::{FixExtractor, PhraseExtractor};
use crate::gate::{Action, Decision, DecisionGate};
use crate::remediation::analyzer::Analyzer;
use crate::remediation::report::Report;
use crate::remediation::signature::{Signature, SignatureCache};
use crate::remediation::Remediator;
use remedy_adapter::{AdapterRegistry, Mapping};
use remedy_pipeline::{IngestionSource, PipelineExecutor, PipelineOutcome, RunMode};
use remedy_trace::{RunId, TraceStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Reason reported when no mapping could be extracted
pub const NO_PATCH_REASON: &str = "Could not parse adapter from report";

/// Workflow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Start,
    Diagnose,
    Analyze,
    ParsePatch,
    Apply,
    Canary,
    Decide,
    SaveSignature,
    ClearAdapters,
    Success,
    Failure,
    NoPatch,
    Error,
}

impl WorkflowState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Diagnose => "diagnose",
            Self::Analyze => "analyze",
            Self::ParsePatch => "parse_patch",
            Self::Apply => "apply",
            Self::Canary => "canary",
            Self::Decide => "decide",
            Self::SaveSignature => "save_signature",
            Self::ClearAdapters => "clear_adapters",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::NoPatch => "no_patch",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: WorkflowState) -> Vec<WorkflowState> {
    use WorkflowState::*;
    match from {
        Start => vec![Diagnose, Error],
        Diagnose => vec![Apply, Analyze, Error],
        Analyze => vec![ParsePatch, Error],
        ParsePatch => vec![Apply, NoPatch, Error],
        Apply => vec![Canary, Error],
        Canary => vec![Decide, Error],
        Decide => vec![SaveSignature, ClearAdapters, Error],
        SaveSignature => vec![Success, Error],
        ClearAdapters => vec![Failure, Error],
        Success | Failure | NoPatch | Error => vec![],
    }
}

/// Check a single transition
///
/// # Errors
/// `InvalidTransition` if `to` is not reachable from `from`.
pub fn validate_transition(from: WorkflowState, to: WorkflowState) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(RemedyError::InvalidTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Result of installing a proposed fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PatchOutcome {
    Patched { adapter: Mapping, description: String },
    NoPatch { reason: String },
}

impl PatchOutcome {
    #[must_use]
    pub fn adapter(&self) -> Option<&Mapping> {
        match self {
            Self::Patched { adapter, .. } => Some(adapter),
            Self::NoPatch { .. } => None,
        }
    }
}

/// Final status of a remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Promoted,
    RolledBack,
    NoPatch,
    Error,
}

/// Everything a remediation produced, with an explicit status and reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutcome {
    pub run_id: RunId,
    pub status: WorkflowStatus,
    pub reason: String,
    pub report: Option<Report>,
    pub patch: Option<PatchOutcome>,
    pub canary: Option<CanaryResult>,
    pub decision: Option<Decision>,
    pub signature_id: Option<String>,
    /// Visited states, starting at `Start`
    pub states: Vec<WorkflowState>,
    pub elapsed_s: f64,
}

impl WorkflowOutcome {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            status: WorkflowStatus::Error,
            reason: String::new(),
            report: None,
            patch: None,
            canary: None,
            decision: None,
            signature_id: None,
            states: vec![WorkflowState::Start],
            elapsed_s: 0.0,
        }
    }

    /// Most recent state
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.states.last().copied().unwrap_or(WorkflowState::Start)
    }

    fn advance(&mut self, to: WorkflowState) -> Result<()> {
        validate_transition(self.state(), to)?;
        self.states.push(to);
        Ok(())
    }
}

/// Sequences diagnosis, patching, canary and the decision gate
pub struct Orchestrator {
    config: RemedyConfig,
    executor: Arc<PipelineExecutor>,
    remediator: Remediator,
    canary: CanaryRunner,
    gate: DecisionGate,
    extractor: Box<dyn FixExtractor>,
}

impl Orchestrator {
    /// Orchestrator over `executor`, validating against `canary_source`
    #[must_use]
    pub fn new(
        config: RemedyConfig,
        executor: Arc<PipelineExecutor>,
        canary_source: Arc<dyn IngestionSource>,
        signatures: SignatureCache,
    ) -> Self {
        let remediator = Remediator::new(Arc::clone(executor.store()), signatures, &config);
        let canary = CanaryRunner::new(Arc::clone(&executor), canary_source, config.thresholds);
        let gate = DecisionGate::new(Arc::clone(executor.registry()), config.thresholds);
        Self {
            config,
            executor,
            remediator,
            canary,
            gate,
            extractor: Box::new(PhraseExtractor),
        }
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.remediator = self.remediator.with_analyzer(analyzer);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn FixExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &RemedyConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<TraceStore> {
        self.executor.store()
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        self.executor.registry()
    }

    #[inline]
    #[must_use]
    pub fn executor(&self) -> &Arc<PipelineExecutor> {
        &self.executor
    }

    #[inline]
    #[must_use]
    pub fn remediator(&self) -> &Remediator {
        &self.remediator
    }

    /// Start a run and execute the pipeline
    ///
    /// # Errors
    /// Trace store failures.
    pub fn run_pipeline(&self, mode: &RunMode, use_adapters: bool) -> Result<PipelineOutcome> {
        let run_id = self.executor.start_run(mode)?;
        Ok(self.executor.run_pipeline(&run_id, mode, use_adapters)?)
    }

    /// Diagnose a failed run
    ///
    /// # Errors
    /// Trace store failures.
    pub fn diagnose(&self, run_id: &RunId, failure_text: &str) -> Result<Report> {
        self.remediator.diagnose(run_id, failure_text)
    }

    /// Extract a mapping from `report` and merge it into the registry
    ///
    /// A cached report carries its mapping and skips text extraction.
    ///
    /// # Errors
    /// Adapter persistence failures.
    pub fn apply_patch(&self, run_id: &RunId, report: &Report) -> Result<PatchOutcome> {
        let mapping = report
            .cached_adapter
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| self.extractor.extract(&report.proposed_fix.tool_schema_patch));

        let Some(adapter) = mapping else {
            tracing::warn!(%run_id, patch = %report.proposed_fix.tool_schema_patch, "no adapter in proposed fix");
            return Ok(PatchOutcome::NoPatch {
                reason: NO_PATCH_REASON.to_string(),
            });
        };

        self.registry().set(&adapter)?;
        let description = format!(
            "Applied schema adapter: {}",
            adapter
                .iter()
                .map(|(old, new)| format!("{old} -> {new}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        tracing::info!(%run_id, %description, "patch applied");
        Ok(PatchOutcome::Patched {
            adapter,
            description,
        })
    }

    /// Replay up to `n` recent records against the current adapters
    ///
    /// # Errors
    /// Trace store failures on the scratch run.
    pub fn canary_run(&self, run_id: &RunId, n: usize) -> Result<CanaryResult> {
        self.canary.run(run_id, n)
    }

    /// Gate a canary result; rollback clears all adapters
    ///
    /// # Errors
    /// Adapter persistence failures while clearing.
    pub fn promote_or_rollback(&self, canary: &CanaryResult, thresholds: Option<&Thresholds>) -> Result<Decision> {
        match thresholds {
            Some(t) => self.gate.decide_with(canary, t),
            None => self.gate.decide(canary),
        }
    }

    /// Remember the promoted fix for `run_id`
    pub fn save_signature(&self, run_id: &RunId, report: &Report, adapter: &Mapping) -> Signature {
        self.remediator.remember(run_id, report, adapter)
    }

    /// Run the whole loop for a failed run
    pub fn remediate(&self, run_id: &RunId, failure_text: &str) -> WorkflowOutcome {
        let started = Instant::now();
        let mut outcome = WorkflowOutcome::new(run_id.clone());

        if let Err(e) = self.drive(run_id, failure_text, &mut outcome) {
            tracing::error!(%run_id, state = %outcome.state(), error = %e, "remediation failed");
            if !outcome.state().is_terminal() {
                outcome.states.push(WorkflowState::Error);
            }
            outcome.status = WorkflowStatus::Error;
            outcome.reason = e.to_string();
        }

        outcome.elapsed_s = started.elapsed().as_secs_f64();
        tracing::info!(
            %run_id,
            status = ?outcome.status,
            reason = %outcome.reason,
            elapsed_s = outcome.elapsed_s,
            "remediation finished"
        );
        outcome
    }

    fn drive(&self, run_id: &RunId, failure_text: &str, outcome: &mut WorkflowOutcome) -> Result<()> {
        outcome.advance(WorkflowState::Diagnose)?;
        let report = self.diagnose(run_id, failure_text)?;
        let cached = report.is_cached();
        outcome.report = Some(report.clone());

        if cached {
            outcome.advance(WorkflowState::Apply)?;
        } else {
            outcome.advance(WorkflowState::Analyze)?;
            outcome.advance(WorkflowState::ParsePatch)?;
        }

        let patch = self.apply_patch(run_id, &report)?;
        outcome.patch = Some(patch.clone());
        let adapter = match patch {
            PatchOutcome::Patched { adapter, .. } => adapter,
            PatchOutcome::NoPatch { reason } => {
                outcome.advance(WorkflowState::NoPatch)?;
                outcome.status = WorkflowStatus::NoPatch;
                outcome.reason = reason;
                return Ok(());
            }
        };
        if !cached {
            outcome.advance(WorkflowState::Apply)?;
        }

        outcome.advance(WorkflowState::Canary)?;
        let canary = self.canary_run(run_id, self.config.canary_sample_size)?;
        outcome.canary = Some(canary.clone());

        outcome.advance(WorkflowState::Decide)?;
        let decision = self.promote_or_rollback(&canary, None)?;
        outcome.reason = decision.reason.clone();
        outcome.decision = Some(decision.clone());

        match decision.action {
            Action::Promote => {
                outcome.advance(WorkflowState::SaveSignature)?;
                let signature = self.save_signature(run_id, &report, &adapter);
                outcome.signature_id = Some(signature.id);
                outcome.advance(WorkflowState::Success)?;
                outcome.status = WorkflowStatus::Promoted;
            }
            Action::Rollback => {
                outcome.advance(WorkflowState::ClearAdapters)?;
                outcome.advance(WorkflowState::Failure)?;
                outcome.status = WorkflowStatus::RolledBack;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("remediator", &self.remediator)
            .field("canary", &self.canary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowState::*;

    #[test]
    fn happy_paths_are_allowed() {
        let promoted = [Start, Diagnose, Analyze, ParsePatch, Apply, Canary, Decide, SaveSignature, Success];
        let cached_rollback = [Start, Diagnose, Apply, Canary, Decide, ClearAdapters, Failure];
        let no_patch = [Start, Diagnose, Analyze, ParsePatch, NoPatch];
        for path in [&promoted[..], &cached_rollback[..], &no_patch[..]] {
            for pair in path.windows(2) {
                assert!(validate_transition(pair[0], pair[1]).is_ok(), "{} -> {}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn skipping_the_canary_is_rejected() {
        assert!(matches!(
            validate_transition(Apply, Decide),
            Err(RemedyError::InvalidTransition { from: "apply", to: "decide" })
        ));
        assert!(validate_transition(Success, Error).is_err());
    }

    #[test]
    fn terminal_states() {
        for state in [Success, Failure, NoPatch, Error] {
            assert!(state.is_terminal());
        }
        assert!(!Decide.is_terminal());
    }

    #[test]
    fn patch_outcome_wire_shape() {
        let patched = PatchOutcome::Patched {
            adapter: Mapping::from([("level".to_string(), "Level".to_string())]),
            description: "Applied schema adapter: level -> Level".into(),
        };
        let value = serde_json::to_value(&patched).unwrap();
        assert_eq!(value["status"], "patched");
        assert_eq!(value["adapter"]["level"], "Level");

        let none = serde_json::to_value(PatchOutcome::NoPatch {
            reason: NO_PATCH_REASON.into(),
        })
        .unwrap();
        assert_eq!(none["status"], "no_patch");
    }
}
