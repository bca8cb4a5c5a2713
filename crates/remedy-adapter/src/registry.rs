//! Adapter registry
//!
//! Provides [`AdapterRegistry`], the process-wide `old_field -> new_field`
//! mapping applied to records before audit.

use crate::error::{AdapterError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A record flowing through the pipeline
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Field-rename mapping, `old -> new`
pub type Mapping = BTreeMap<String, String>;

/// Rename fields of `record` according to `mapping`
///
/// A pair applies only when `old` is present and `new` is absent, so the
/// result never loses an existing `new` value. Once a source key has been
/// moved it is gone, so re-applying a mapping whose targets are not
/// themselves sources changes nothing.
#[must_use]
pub fn apply_mapping(mapping: &Mapping, record: &Record) -> Record {
    let mut adapted = record.clone();
    for (old, new) in mapping {
        if adapted.contains_key(new) {
            continue;
        }
        if let Some(value) = adapted.remove(old) {
            adapted.insert(new.clone(), value);
        }
    }
    adapted
}

/// Shared adapter mapping with optional JSON persistence
///
/// Readers take an `Arc` snapshot; writers build a complete new mapping and
/// swap it in, so a reader sees either the old or the new mapping in full.
#[derive(Debug)]
pub struct AdapterRegistry {
    current: RwLock<Arc<Mapping>>,
    /// Serializes writers so merges are not lost
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl AdapterRegistry {
    /// Registry with no backing file
    #[inline]
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(Arc::new(Mapping::new())),
            writer: Mutex::new(()),
            path: None,
        }
    }

    /// Registry persisted at `path`; a missing file means an empty mapping
    ///
    /// # Errors
    /// `Io` if the file exists but cannot be read, `Serde` if it is not a
    /// JSON object of strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mapping = read_mapping(&path)?;
        tracing::debug!(pairs = mapping.len(), path = %path.display(), "adapter registry loaded");
        Ok(Self {
            current: RwLock::new(Arc::new(mapping)),
            writer: Mutex::new(()),
            path: Some(path),
        })
    }

    /// Apply the current mapping to a record
    #[must_use]
    pub fn apply(&self, record: &Record) -> Record {
        let mapping = self.current();
        if mapping.is_empty() {
            return record.clone();
        }
        apply_mapping(&mapping, record)
    }

    /// Merge `mapping` into the current one and persist the result
    ///
    /// Later calls override earlier entries for the same source key. The
    /// merged mapping must not chain renames: no target may also be the
    /// source of another pair, which keeps [`apply_mapping`] idempotent.
    ///
    /// # Errors
    /// `ChainedMapping` if the merge would chain renames, `Io`/`Serde` if
    /// persisting fails. On error the in-memory mapping is unchanged.
    pub fn set(&self, mapping: &Mapping) -> Result<()> {
        let _writer = self.writer.lock();
        let mut merged = (*self.current()).clone();
        merged.extend(mapping.iter().map(|(k, v)| (k.clone(), v.clone())));
        check_unchained(&merged)?;

        if let Some(path) = &self.path {
            write_mapping(path, &merged)?;
        }

        *self.current.write() = Arc::new(merged);
        tracing::info!(?mapping, "adapter mapping merged");
        Ok(())
    }

    /// Remove persisted state and reset to the empty mapping
    ///
    /// # Errors
    /// `Io` if the backing file exists but cannot be removed; the in-memory
    /// mapping is then unchanged.
    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock();
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(AdapterError::Io(e)),
            }
        }

        *self.current.write() = Arc::new(Mapping::new());
        tracing::info!("adapter mapping cleared");
        Ok(())
    }

    /// Re-read the backing file, replacing the in-memory mapping
    ///
    /// No-op for in-memory registries.
    ///
    /// # Errors
    /// Same as [`AdapterRegistry::open`].
    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writer = self.writer.lock();
        let mapping = read_mapping(path)?;
        *self.current.write() = Arc::new(mapping);
        Ok(())
    }

    /// Copy of the current mapping
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Mapping {
        (*self.current()).clone()
    }

    /// Whether no adapters are active
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    /// Backing file, if any
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn current(&self) -> Arc<Mapping> {
        Arc::clone(&self.current.read())
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Reject mappings where a rename target is the source of a different pair
fn check_unchained(mapping: &Mapping) -> Result<()> {
    match mapping
        .iter()
        .find(|(old, new)| old != new && mapping.contains_key(*new))
    {
        Some((_, new)) => Err(AdapterError::ChainedMapping { field: new.clone() }),
        None => Ok(()),
    }
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Mapping::new()),
        Err(e) => Err(AdapterError::Io(e)),
    }
}

fn write_mapping(path: &Path, mapping: &Mapping) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(mapping)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
            .collect()
    }

    #[test]
    fn empty_registry_is_noop() {
        let registry = AdapterRegistry::in_memory();
        let r = record(json!({"level": "INFO"}));
        assert_eq!(registry.apply(&r), r);
    }

    #[test]
    fn apply_renames_field() {
        let registry = AdapterRegistry::in_memory();
        registry.set(&mapping(&[("level", "Level")])).unwrap();
        let fixed = registry.apply(&record(json!({"LineId": 1, "level": "WARNING"})));
        assert_eq!(fixed.get("Level"), Some(&json!("WARNING")));
        assert!(!fixed.contains_key("level"));
    }

    #[test]
    fn apply_never_overwrites_target() {
        let registry = AdapterRegistry::in_memory();
        registry.set(&mapping(&[("level", "Level")])).unwrap();
        let fixed = registry.apply(&record(json!({"level": "INFO", "Level": "ERROR"})));
        assert_eq!(fixed.get("Level"), Some(&json!("ERROR")));
        assert_eq!(fixed.get("level"), Some(&json!("INFO")));
    }

    #[test]
    fn multiple_mappings_do_not_conflict() {
        let registry = AdapterRegistry::in_memory();
        registry
            .set(&mapping(&[("level", "Level"), ("comp", "Component")]))
            .unwrap();
        let fixed = registry.apply(&record(json!({"level": "INFO", "comp": "nova.compute"})));
        assert_eq!(fixed.get("Level"), Some(&json!("INFO")));
        assert_eq!(fixed.get("Component"), Some(&json!("nova.compute")));
    }

    #[test]
    fn set_merges_and_overrides() {
        let registry = AdapterRegistry::in_memory();
        registry.set(&mapping(&[("amt", "amount")])).unwrap();
        registry.set(&mapping(&[("level", "Level")])).unwrap();
        registry.set(&mapping(&[("amt", "total")])).unwrap();
        assert_eq!(
            registry.snapshot(),
            mapping(&[("amt", "total"), ("level", "Level")])
        );
    }

    #[test]
    fn clear_resets_state() {
        let registry = AdapterRegistry::in_memory();
        registry.set(&mapping(&[("level", "Level")])).unwrap();
        registry.clear().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.snapshot(), Mapping::new());
    }

    #[test]
    fn chained_renames_are_rejected() {
        let registry = AdapterRegistry::in_memory();
        let err = registry
            .set(&mapping(&[("a", "c"), ("b", "a")]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::ChainedMapping { ref field } if field == "a"));
        assert!(registry.is_empty());

        registry.set(&mapping(&[("level", "Level")])).unwrap();
        assert!(registry.set(&mapping(&[("lvl", "level")])).is_err());
        assert_eq!(registry.snapshot(), mapping(&[("level", "Level")]));
    }

    #[test]
    fn shared_targets_are_allowed() {
        let registry = AdapterRegistry::in_memory();
        registry
            .set(&mapping(&[("lvl", "Level"), ("level", "Level")]))
            .unwrap();
        let fixed = registry.apply(&record(json!({"lvl": "INFO", "level": "WARNING"})));
        assert_eq!(registry.apply(&fixed), fixed);
    }

    #[test]
    fn snapshot_is_detached() {
        let registry = AdapterRegistry::in_memory();
        registry.set(&mapping(&[("level", "Level")])).unwrap();
        let mut snap = registry.snapshot();
        snap.clear();
        assert_eq!(registry.snapshot().len(), 1);
    }
}
