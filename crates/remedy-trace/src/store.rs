//! Append-only trace store
//!
//! Runs live in a single table guarded by a read-write lock; each run's
//! event log sits behind its own mutex so appends to one run never wait on
//! appends to another. When opened on a directory the store mirrors every
//! event to `<dir>/<run_id>.jsonl` and the run table to `<dir>/runs.json`.

use crate::error::{Result, TraceError};
use crate::types::{Event, EventKind, MetricKey, Run, RunId, RunStatus};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const RUNS_FILE: &str = "runs.json";

#[derive(Debug, Default)]
struct RunLog {
    events: Vec<Event>,
}

/// Durable, ordered, per-run event log plus run metadata
#[derive(Debug)]
pub struct TraceStore {
    dir: Option<PathBuf>,
    runs: RwLock<HashMap<RunId, Run>>,
    logs: DashMap<RunId, Arc<Mutex<RunLog>>>,
}

impl TraceStore {
    /// Create a store that keeps everything in memory
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            runs: RwLock::new(HashMap::new()),
            logs: DashMap::new(),
        }
    }

    /// Open (or create) a store rooted at `dir`, reloading persisted runs
    ///
    /// # Errors
    /// Returns `TraceError::Io`/`Serde` if the directory or its files are unreadable.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let runs_path = dir.join(RUNS_FILE);
        let runs: HashMap<RunId, Run> = if runs_path.exists() {
            let rows: Vec<Run> = serde_json::from_str(&fs::read_to_string(&runs_path)?)?;
            rows.into_iter().map(|r| (r.id.clone(), r)).collect()
        } else {
            HashMap::new()
        };

        let logs = DashMap::new();
        for id in runs.keys() {
            let path = event_path(&dir, id);
            let mut events = Vec::new();
            if path.exists() {
                let reader = BufReader::new(File::open(&path)?);
                for line in reader.lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    events.push(serde_json::from_str::<Event>(&line)?);
                }
            }
            events.sort_by_key(|e| e.idx);
            logs.insert(
                id.clone(),
                Arc::new(Mutex::new(RunLog { events })),
            );
        }

        tracing::debug!(runs = runs.len(), dir = %dir.display(), "trace store opened");

        Ok(Self {
            dir: Some(dir),
            runs: RwLock::new(runs),
            logs,
        })
    }

    /// Allocate a fresh run with status `running`
    ///
    /// # Errors
    /// Returns a storage error if the run table cannot be persisted.
    pub fn start_run(&self, mode: &str) -> Result<RunId> {
        let run = Run::new(mode);
        let id = run.id.clone();

        if let Some(dir) = &self.dir {
            open_log(dir, &id)?;
        }
        self.logs.insert(id.clone(), Arc::new(Mutex::new(RunLog::default())));

        let mut runs = self.runs.write();
        runs.insert(id.clone(), run);
        self.persist_runs(&runs)?;
        drop(runs);

        tracing::info!(run_id = %id, mode, "run started");
        Ok(id)
    }

    /// Append an event, assigning the next index for the run
    ///
    /// Appends to the same run are serialized by the run's log lock;
    /// appends to different runs proceed in parallel.
    ///
    /// # Errors
    /// `RunNotFound` for unknown runs, or a storage error from the JSONL mirror.
    pub fn append_event(&self, run_id: &RunId, event: EventKind) -> Result<u64> {
        let log = self
            .logs
            .get(run_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TraceError::RunNotFound(run_id.to_string()))?;

        let mut guard = log.lock();
        let idx = guard.events.last().map_or(0, |e| e.idx + 1);
        let event = Event {
            ts: now_secs(),
            run_id: run_id.clone(),
            idx,
            kind: event,
        };

        // the handle is closed before the lock is released
        if let Some(dir) = &self.dir {
            let mut line = serde_json::to_vec(&event)?;
            line.push(b'\n');
            open_log(dir, run_id)?.write_all(&line)?;
        }

        guard.events.push(event);
        Ok(idx)
    }

    /// Events of a run, strictly ordered by index
    #[must_use]
    pub fn load_events(&self, run_id: &RunId) -> Vec<Event> {
        self.logs
            .get(run_id)
            .map(|entry| entry.value().lock().events.clone())
            .unwrap_or_default()
    }

    /// Update one allow-listed run column
    ///
    /// `status` and `fail_reason` take strings (`fail_reason` also accepts
    /// null), the `mttr_*` keys take numbers.
    ///
    /// # Errors
    /// `InvalidKey` for keys outside the allow-list, `InvalidValue` for
    /// mistyped values, `RunNotFound`, or a storage error.
    pub fn save_metric(&self, run_id: &RunId, key: &str, value: impl Into<Value>) -> Result<()> {
        let key: MetricKey = key.parse()?;
        let value = value.into();

        let mut runs = self.runs.write();
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| TraceError::RunNotFound(run_id.to_string()))?;

        match key {
            MetricKey::Status => {
                let status = value
                    .as_str()
                    .ok_or_else(|| invalid(key, "expected a string"))?
                    .parse::<RunStatus>()?;
                run.status = status;
            }
            MetricKey::FailReason => {
                run.fail_reason = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    _ => return Err(invalid(key, "expected a string or null")),
                };
            }
            MetricKey::MttrHumanS => {
                run.mttr_human_s = Some(value.as_f64().ok_or_else(|| invalid(key, "expected a number"))?);
            }
            MetricKey::MttrCtaS => {
                run.mttr_cta_s = Some(value.as_f64().ok_or_else(|| invalid(key, "expected a number"))?);
            }
        }

        self.persist_runs(&runs)
    }

    /// Typed shorthand for `save_metric(run_id, "status", ..)`
    ///
    /// # Errors
    /// See [`TraceStore::save_metric`].
    pub fn set_status(&self, run_id: &RunId, status: RunStatus) -> Result<()> {
        self.save_metric(run_id, MetricKey::Status.as_str(), status.as_str())
    }

    /// Look up a run
    #[must_use]
    pub fn get_run(&self, run_id: &RunId) -> Option<Run> {
        self.runs.read().get(run_id).cloned()
    }

    /// All runs, newest first
    #[must_use]
    pub fn list_runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.runs.read().values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        runs
    }

    /// Number of events recorded for a run
    #[must_use]
    pub fn event_count(&self, run_id: &RunId) -> usize {
        self.logs
            .get(run_id)
            .map_or(0, |entry| entry.value().lock().events.len())
    }

    fn persist_runs(&self, runs: &HashMap<RunId, Run>) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let mut rows: Vec<&Run> = runs.values().collect();
        rows.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        let tmp = dir.join(format!("{RUNS_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(&rows)?)?;
        fs::rename(&tmp, dir.join(RUNS_FILE))?;
        Ok(())
    }
}

fn event_path(dir: &Path, run_id: &RunId) -> PathBuf {
    dir.join(format!("{run_id}.jsonl"))
}

/// Open a run's JSONL mirror for appending, creating it if needed
fn open_log(dir: &Path, run_id: &RunId) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(event_path(dir, run_id))
}

fn invalid(key: MetricKey, reason: &str) -> TraceError {
    TraceError::InvalidValue {
        key: key.as_str().to_string(),
        reason: reason.to_string(),
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_event(message: &str) -> EventKind {
        EventKind::Error {
            message: message.to_string(),
            context: json!({}),
        }
    }

    #[test]
    fn start_run_is_running() {
        let store = TraceStore::in_memory();
        let id = store.start_run("normal").unwrap();
        let run = store.get_run(&id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.mode, "normal");
        assert!(run.fail_reason.is_none());
    }

    #[test]
    fn append_assigns_consecutive_indices() {
        let store = TraceStore::in_memory();
        let id = store.start_run("normal").unwrap();
        assert_eq!(store.append_event(&id, error_event("a")).unwrap(), 0);
        assert_eq!(store.append_event(&id, error_event("b")).unwrap(), 1);
        assert_eq!(store.append_event(&id, error_event("c")).unwrap(), 2);

        let idx: Vec<u64> = store.load_events(&id).iter().map(|e| e.idx).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn indices_are_per_run() {
        let store = TraceStore::in_memory();
        let a = store.start_run("normal").unwrap();
        let b = store.start_run("normal").unwrap();
        store.append_event(&a, error_event("a0")).unwrap();
        store.append_event(&a, error_event("a1")).unwrap();
        assert_eq!(store.append_event(&b, error_event("b0")).unwrap(), 0);
    }

    #[test]
    fn append_to_unknown_run_fails() {
        let store = TraceStore::in_memory();
        let err = store
            .append_event(&RunId::from("run_missing"), error_event("x"))
            .unwrap_err();
        assert!(matches!(err, TraceError::RunNotFound(_)));
    }

    #[test]
    fn save_metric_rejects_unknown_key() {
        let store = TraceStore::in_memory();
        let id = store.start_run("normal").unwrap();
        let err = store.save_metric(&id, "mode", "flaky").unwrap_err();
        assert!(matches!(err, TraceError::InvalidKey { ref key } if key == "mode"));
    }

    #[test]
    fn save_metric_updates_allowed_columns() {
        let store = TraceStore::in_memory();
        let id = store.start_run("flaky").unwrap();
        store.save_metric(&id, "status", "failed").unwrap();
        store.save_metric(&id, "fail_reason", "boom").unwrap();
        store.save_metric(&id, "mttr_human_s", 150.0).unwrap();
        store.save_metric(&id, "mttr_cta_s", 0.25).unwrap();

        let run = store.get_run(&id).unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.fail_reason.as_deref(), Some("boom"));
        assert_eq!(run.mttr_human_s, Some(150.0));
        assert_eq!(run.mttr_cta_s, Some(0.25));
    }

    #[test]
    fn save_metric_rejects_mistyped_value() {
        let store = TraceStore::in_memory();
        let id = store.start_run("normal").unwrap();
        assert!(matches!(
            store.save_metric(&id, "mttr_cta_s", "fast"),
            Err(TraceError::InvalidValue { .. })
        ));
        assert!(matches!(
            store.save_metric(&id, "status", "exploded"),
            Err(TraceError::UnknownStatus(_))
        ));
    }

    #[test]
    fn list_runs_newest_first() {
        let store = TraceStore::in_memory();
        let first = store.start_run("normal").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.start_run("flaky").unwrap();

        let ids: Vec<RunId> = store.list_runs().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn load_events_of_unknown_run_is_empty() {
        let store = TraceStore::in_memory();
        assert!(store.load_events(&RunId::from("run_nope")).is_empty());
    }
}
