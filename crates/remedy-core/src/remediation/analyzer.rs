//! External analyzer contract
//!
//! An [`Analyzer`] receives the failure text and a bounded trace prefix and
//! answers with raw text that must be a JSON report. The call runs on a
//! helper thread and is abandoned after a timeout; every failure mode maps
//! to an [`AnalyzerError`] so the caller can fall back to the heuristic.

use super::report::{DiagnosisMethod, Evidence, ProposedFix, Report};
use crossbeam::channel::{self, RecvTimeoutError};
use remedy_trace::Event;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Request sent to an external analyzer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub failure_text: String,
    /// Leading events of the run, in index order
    pub events: Vec<Event>,
}

/// Why an external analysis could not be used
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed analyzer response: {0}")]
    Malformed(String),
}

/// Pluggable root-cause analyzer
#[cfg_attr(test, mockall::automock)]
pub trait Analyzer: Send + Sync {
    /// Analyze a failure, returning the raw response body
    ///
    /// # Errors
    /// `Unavailable` when the backend cannot be reached.
    fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalyzerError>;
}

#[derive(Debug, Deserialize)]
struct AnalyzerResponse {
    primary_cause_step_id: Option<String>,
    symptoms: Vec<String>,
    evidence: Vec<Evidence>,
    why_chain: Vec<String>,
    confidence: f64,
    proposed_fix: ProposedFix,
}

/// Strip an optional Markdown code fence around a JSON body
fn strip_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse and validate an analyzer response
///
/// # Errors
/// `Malformed` if the body is not a JSON report or fails validation.
pub fn parse_response(text: &str) -> Result<Report, AnalyzerError> {
    let response: AnalyzerResponse =
        serde_json::from_str(strip_fence(text)).map_err(|e| AnalyzerError::Malformed(e.to_string()))?;
    let report = Report {
        primary_cause_step_id: response.primary_cause_step_id,
        symptoms: response.symptoms,
        evidence: response.evidence,
        why_chain: response.why_chain,
        confidence: response.confidence,
        proposed_fix: response.proposed_fix,
        method: DiagnosisMethod::External,
        cached_from: None,
        cached_adapter: None,
        run_id: None,
        analysis_time_s: 0.0,
    };
    report.validate().map_err(AnalyzerError::Malformed)?;
    Ok(report)
}

/// Run `analyzer` on a helper thread, waiting at most `timeout`
///
/// A timed-out call is abandoned; its eventual result is discarded.
///
/// # Errors
/// Any [`AnalyzerError`], including `Timeout`.
pub fn analyze_with_timeout(
    analyzer: Arc<dyn Analyzer>,
    request: AnalysisRequest,
    timeout: Duration,
) -> Result<Report, AnalyzerError> {
    let (tx, rx) = channel::bounded(1);
    thread::Builder::new()
        .name("remedy-analyzer".into())
        .spawn(move || {
            let _ = tx.send(analyzer.analyze(&request));
        })
        .map_err(|e| AnalyzerError::Unavailable(e.to_string()))?;

    match rx.recv_timeout(timeout) {
        Ok(response) => parse_response(&response?),
        Err(RecvTimeoutError::Timeout) => Err(AnalyzerError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(AnalyzerError::Unavailable("analyzer thread exited without a response".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "primary_cause_step_id": "tool_1",
        "symptoms": ["missing field 'Level'"],
        "evidence": [{"step_id": "tool_1", "excerpt": "level present"}],
        "why_chain": ["a", "b", "c", "d", "e"],
        "confidence": 0.8,
        "proposed_fix": {"tool_schema_patch": "map level -> Level", "test_case": "t"},
        "method": "llm"
    }"#;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            failure_text: "Schema mismatch in Auditor agent".into(),
            events: Vec::new(),
        }
    }

    #[test]
    fn parses_fenced_response() {
        let report = parse_response(&format!("```json\n{VALID}\n```")).unwrap();
        assert_eq!(report.method, DiagnosisMethod::External);
        assert_eq!(report.confidence, 0.8);
        assert_eq!(report.primary_cause_step_id.as_deref(), Some("tool_1"));
    }

    #[test]
    fn rejects_short_why_chain() {
        let bad = VALID.replace(r#"["a", "b", "c", "d", "e"]"#, r#"["a"]"#);
        assert!(matches!(parse_response(&bad), Err(AnalyzerError::Malformed(_))));
        assert!(matches!(parse_response("sorry, no idea"), Err(AnalyzerError::Malformed(_))));
    }

    #[test]
    fn mock_response_is_parsed() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(1)
            .returning(|_| Ok(VALID.to_string()));
        let report = analyze_with_timeout(Arc::new(analyzer), request(), Duration::from_secs(5)).unwrap();
        assert_eq!(report.proposed_fix.tool_schema_patch, "map level -> Level");
    }

    #[test]
    fn unavailable_backend_is_reported() {
        let mut analyzer = MockAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Err(AnalyzerError::Unavailable("connection refused".into())));
        let err = analyze_with_timeout(Arc::new(analyzer), request(), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, AnalyzerError::Unavailable(_)));
    }

    #[test]
    fn slow_backend_times_out() {
        let mut analyzer = MockAnalyzer::new();
        analyzer.expect_analyze().returning(|_| {
            thread::sleep(Duration::from_millis(500));
            Ok(VALID.to_string())
        });
        let err = analyze_with_timeout(Arc::new(analyzer), request(), Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, AnalyzerError::Timeout(Duration::from_millis(20)));
    }
}
