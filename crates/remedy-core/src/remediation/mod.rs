//! Remediation: diagnosis and the signature cache as one component
//!
//! [`Remediator`] owns the [`SignatureCache`], the heuristic analysis and an
//! optional external [`Analyzer`]. Diagnosis consults the cache first; on a
//! miss it asks the external analyzer (if any) and falls back to the
//! heuristic on any analyzer failure. Promoted fixes are fed back through
//! [`Remediator::remember`].

pub mod analyzer;
pub mod fingerprint;
pub mod heuristic;
pub mod report;
pub mod signature;

use crate::config::RemedyConfig;
use crate::error::Result;
use analyzer::{analyze_with_timeout, AnalysisRequest, Analyzer};
use fingerprint::fingerprint;
use remedy_adapter::Mapping;
use remedy_trace::{Event, MetricKey, RunId, TraceStore};
use report::{DiagnosisMethod, Evidence, ProposedFix, Report, CACHED_CONFIDENCE};
use signature::{Signature, SignatureCache};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use analyzer::AnalyzerError;
pub use heuristic::{detect_drift, Drift};

/// Diagnoses failed runs and remembers promoted fixes
pub struct Remediator {
    store: Arc<TraceStore>,
    signatures: SignatureCache,
    analyzer: Option<Arc<dyn Analyzer>>,
    expected_fields: Vec<String>,
    similarity_threshold: f64,
    human_baseline_mttr_s: f64,
    analyzer_timeout: Duration,
    analyzer_trace_prefix: usize,
}

impl Remediator {
    /// Remediator using `config` for thresholds and analyzer limits
    #[must_use]
    pub fn new(store: Arc<TraceStore>, signatures: SignatureCache, config: &RemedyConfig) -> Self {
        Self {
            store,
            signatures,
            analyzer: None,
            expected_fields: remedy_pipeline::REQUIRED_FIELDS
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
            similarity_threshold: config.similarity_threshold,
            human_baseline_mttr_s: config.human_baseline_mttr_s,
            analyzer_timeout: config.analyzer_timeout(),
            analyzer_trace_prefix: config.analyzer_trace_prefix,
        }
    }

    /// Prefer `analyzer` over the heuristic on cache misses
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Fields whose drifted spellings the heuristic looks for
    #[must_use]
    pub fn with_expected_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    /// Signature matching the shape of `events`, with its similarity
    #[must_use]
    pub fn check_cache(&self, events: &[Event]) -> Option<(Signature, f64)> {
        self.signatures
            .find_similar(&fingerprint(events), self.similarity_threshold)
    }

    /// Produce a root-cause report for `run_id`
    ///
    /// Records `mttr_cta_s` (elapsed wall time) and `mttr_human_s` (the fixed
    /// baseline) on the run.
    ///
    /// # Errors
    /// Trace store failures while saving the duration metrics.
    pub fn diagnose(&self, run_id: &RunId, failure_text: &str) -> Result<Report> {
        let started = Instant::now();
        let events = self.store.load_events(run_id);

        let mut report = match self.check_cache(&events) {
            Some((signature, similarity)) => {
                tracing::info!(%run_id, signature = %signature.id, similarity, "signature cache hit");
                cached_report(&signature)
            }
            None => self.analyze(run_id, &events, failure_text),
        };

        let elapsed = started.elapsed().as_secs_f64();
        self.store
            .save_metric(run_id, MetricKey::MttrCtaS.as_str(), elapsed)?;
        self.store
            .save_metric(run_id, MetricKey::MttrHumanS.as_str(), self.human_baseline_mttr_s)?;

        report.run_id = Some(run_id.clone());
        report.analysis_time_s = elapsed;
        tracing::info!(
            %run_id,
            method = %report.method,
            cause = report.primary_cause_step_id.as_deref().unwrap_or("unknown"),
            elapsed_s = elapsed,
            "diagnosis finished"
        );
        Ok(report)
    }

    fn analyze(&self, run_id: &RunId, events: &[Event], failure_text: &str) -> Report {
        if let Some(analyzer) = &self.analyzer {
            let request = AnalysisRequest {
                failure_text: failure_text.to_string(),
                events: events.iter().take(self.analyzer_trace_prefix).cloned().collect(),
            };
            match analyze_with_timeout(Arc::clone(analyzer), request, self.analyzer_timeout) {
                Ok(report) => return report,
                Err(e) => {
                    tracing::warn!(%run_id, error = %e, "external analysis failed; using heuristic");
                }
            }
        }
        heuristic::analyze(events, failure_text, &self.expected_fields)
    }

    /// Store the fix that was promoted for `run_id`
    ///
    /// The signature is derived from the run's current trace; a signature
    /// already stored for this run is returned unchanged.
    pub fn remember(&self, run_id: &RunId, report: &Report, adapter: &Mapping) -> Signature {
        let events = self.store.load_events(run_id);
        let patch_text = serde_json::to_string(adapter).unwrap_or_else(|_| "{}".to_string());
        self.signatures.insert(Signature {
            id: Signature::id_for(run_id),
            cause_label: report
                .primary_cause_step_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            embedding: fingerprint(&events),
            patch_text,
        })
    }
}

impl fmt::Debug for Remediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remediator")
            .field("signatures", &self.signatures.len())
            .field("analyzer", &self.analyzer.is_some())
            .field("similarity_threshold", &self.similarity_threshold)
            .finish_non_exhaustive()
    }
}

/// Describe a mapping as `'old' -> 'new'` pairs
#[must_use]
pub fn describe_mapping(mapping: &Mapping) -> String {
    mapping
        .iter()
        .map(|(old, new)| format!("'{old}' -> '{new}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cached_report(signature: &Signature) -> Report {
    let mapping = signature.mapping();
    Report {
        primary_cause_step_id: Some(signature.cause_label.clone()),
        symptoms: vec!["Cached: similar incident detected".to_string()],
        evidence: vec![Evidence::new(
            "cached",
            format!("Matched previous incident {}", signature.id),
        )],
        why_chain: vec![
            "Why is this incident familiar? Its trace shape matches a stored signature.".to_string(),
            format!("Which signature matched? {}.", signature.id),
            format!("What caused the original incident? {}.", signature.cause_label),
            "Did the stored fix work? It passed canary validation and was promoted.".to_string(),
            "Resolution: reapply the stored adapter without re-running analysis.".to_string(),
        ],
        confidence: CACHED_CONFIDENCE,
        proposed_fix: ProposedFix {
            tool_schema_patch: format!("Cached adapter: {}", describe_mapping(&mapping)),
            test_case: "Reuse previous fix".to_string(),
        },
        method: DiagnosisMethod::Cached,
        cached_from: Some(signature.id.clone()),
        cached_adapter: Some(mapping),
        run_id: None,
        analysis_time_s: 0.0,
    }
}
