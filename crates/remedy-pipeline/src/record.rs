//! Log records, the per-record evaluation tool, and a seeded generator
//!
//! Records are untyped JSON objects so that drifted shapes (a renamed
//! field) can flow through the pipeline unchanged until audit.

use crate::error::EvalError;
use crate::failure::FailureSnapshot;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use remedy_adapter::Record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fields the evaluator cannot work without
pub const REQUIRED_FIELDS: &[&str] = &["Level"];

/// Latency above which a record is flagged
pub const SLOW_LATENCY_MS: u64 = 400;

/// Field renames applied when schema drift is injected, `(canonical, drifted)`
pub const DRIFT_RENAMES: &[(&str, &str)] = &[("Level", "level")];

/// Default generator seed
pub const DEFAULT_SEED: u64 = 42;

const LEVELS: &[&str] = &["INFO", "WARNING", "ERROR"];
const COMPONENTS: &[&str] = &[
    "nova.osapi_compute.wsgi.server",
    "nova.compute.manager",
    "nova.metadata.wsgi.server",
    "nova.virt.libvirt.imagecache",
];
const ENDPOINTS: &[&str] = &[
    "/v2/servers/detail",
    "/v2/os-hypervisors",
    "/openstack/2013-10-17/meta_data.json",
];

/// Result of evaluating one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the record needs attention
    #[serde(rename = "flag")]
    pub flagged: bool,
    pub reason: String,
}

/// Evaluate a single log record
///
/// `Level == "ERROR"` is flagged first; otherwise a latency strictly above
/// [`SLOW_LATENCY_MS`] is flagged.
///
/// # Errors
/// [`EvalError::MissingField`] if a [`REQUIRED_FIELDS`] entry is absent.
pub fn evaluate_record(record: &Record) -> Result<Evaluation, EvalError> {
    for field in REQUIRED_FIELDS {
        if !record.contains_key(*field) {
            return Err(EvalError::MissingField {
                field: (*field).to_string(),
            });
        }
    }

    if record.get("Level").and_then(Value::as_str) == Some("ERROR") {
        return Ok(Evaluation {
            flagged: true,
            reason: "Level=ERROR".into(),
        });
    }

    let latency = record.get("latency_ms").and_then(Value::as_u64).unwrap_or(0);
    if latency > SLOW_LATENCY_MS {
        return Ok(Evaluation {
            flagged: true,
            reason: format!("latency_ms>{SLOW_LATENCY_MS}"),
        });
    }

    Ok(Evaluation {
        flagged: false,
        reason: "ok".into(),
    })
}

/// Identifier used in audit results and error context
#[must_use]
pub fn record_id(record: &Record) -> Value {
    record.get("LineId").cloned().unwrap_or(Value::Null)
}

/// Rename canonical fields to their drifted spelling
pub fn apply_drift(record: &mut Record) {
    for (canonical, drifted) in DRIFT_RENAMES {
        if let Some(value) = record.remove(*canonical) {
            record.insert((*drifted).to_string(), value);
        }
    }
}

/// Deterministic synthetic log source
#[derive(Debug)]
pub struct LogRecordGenerator {
    rng: StdRng,
}

impl LogRecordGenerator {
    /// Generator with a fixed seed
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Produce one record, honouring the active failure modes
    pub fn generate(&mut self, failures: &FailureSnapshot) -> Record {
        let latency_ms: u64 = self.rng.random_range(100..=500);
        let level = *LEVELS.choose(&mut self.rng).unwrap_or(&"INFO");
        let component = *COMPONENTS.choose(&mut self.rng).unwrap_or(&COMPONENTS[0]);
        let endpoint = *ENDPOINTS.choose(&mut self.rng).unwrap_or(&ENDPOINTS[0]);
        let mut status: u16 = if level == "ERROR" {
            *[500, 503, 404].choose(&mut self.rng).unwrap_or(&500)
        } else {
            200
        };
        if failures.currency_mix && self.rng.random_bool(0.3) {
            status = *[500, 503, 504].choose(&mut self.rng).unwrap_or(&500);
        }

        let len: u32 = self.rng.random_range(500..=3000);
        let value = json!({
            "LineId": self.rng.random_range(1000..=9999u32),
            "Date": "2017-05-16",
            "Time": format!(
                "00:00:{:02}.{:03}",
                self.rng.random_range(10..=59u32),
                self.rng.random_range(0..=999u32)
            ),
            "Pid": self.rng.random_range(2000..=30000u32),
            "Level": level,
            "Component": component,
            "Content": format!(
                "\"GET {endpoint} HTTP/1.1\" status: {status} len: {len} time: 0.{latency_ms}"
            ),
            "latency_ms": latency_ms,
            "status": status,
            "timestamp": unix_now(),
        });

        let mut record = match value {
            Value::Object(map) => map,
            _ => Record::new(),
        };
        if failures.schema_drift {
            apply_drift(&mut record);
        }
        record
    }

    /// Produce `count` records
    pub fn batch(&mut self, count: usize, failures: &FailureSnapshot) -> Vec<Record> {
        (0..count).map(|_| self.generate(failures)).collect()
    }
}

impl Default for LogRecordGenerator {
    fn default() -> Self {
        Self::seeded(DEFAULT_SEED)
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
