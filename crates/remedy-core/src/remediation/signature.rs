//! Signature cache
//!
//! Remembers `(trace shape -> adapter mapping)` pairs for promoted fixes.
//! Signatures are immutable once stored; persistence to a JSON file is
//! best-effort and never fails the caller.

use super::fingerprint::{cosine_similarity, Embedding};
use crate::error::{RemedyError, Result};
use parking_lot::RwLock;
use remedy_adapter::Mapping;
use remedy_trace::RunId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A promoted fix keyed by trace shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub id: String,
    pub cause_label: String,
    pub embedding: Embedding,
    /// JSON-encoded adapter mapping
    pub patch_text: String,
}

impl Signature {
    /// Signature id derived from the run that produced the fix
    #[must_use]
    pub fn id_for(run_id: &RunId) -> String {
        format!("sig_{run_id}")
    }

    /// Decode `patch_text`; an undecodable patch yields an empty mapping
    #[must_use]
    pub fn mapping(&self) -> Mapping {
        serde_json::from_str(&self.patch_text).unwrap_or_default()
    }
}

/// In-memory signature set with optional JSON mirror
#[derive(Debug, Default)]
pub struct SignatureCache {
    entries: RwLock<Vec<Signature>>,
    path: Option<PathBuf>,
}

impl SignatureCache {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load signatures from `path`; a missing file means an empty cache
    ///
    /// # Errors
    /// `StoreFailure` if the file exists but cannot be read or decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| RemedyError::StoreFailure(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(count = entries.len(), path = %path.display(), "signatures loaded");
        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    /// Nearest signature with cosine similarity at or above `threshold`
    #[must_use]
    pub fn find_similar(&self, embedding: &[f64], threshold: f64) -> Option<(Signature, f64)> {
        self.entries
            .read()
            .iter()
            .map(|sig| (sig, cosine_similarity(embedding, &sig.embedding)))
            .filter(|(_, score)| *score >= threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(sig, score)| (sig.clone(), score))
    }

    /// Store a signature, keeping any existing one with the same id
    ///
    /// Returns the signature now held under that id.
    pub fn insert(&self, signature: Signature) -> Signature {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter().find(|s| s.id == signature.id) {
            return existing.clone();
        }
        entries.push(signature.clone());
        if let Some(path) = &self.path {
            if let Err(e) = write_entries(path, &entries) {
                tracing::error!(error = %e, path = %path.display(), "failed to persist signatures");
            }
        }
        tracing::info!(id = %signature.id, cause = %signature.cause_label, "signature saved");
        signature
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Signature> {
        self.entries.read().iter().find(|s| s.id == id).cloned()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Signature> {
        self.entries.read().clone()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn write_entries(path: &Path, entries: &[Signature]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(id: &str, embedding: Embedding) -> Signature {
        Signature {
            id: id.into(),
            cause_label: "tool_1".into(),
            embedding,
            patch_text: r#"{"level":"Level"}"#.into(),
        }
    }

    #[test]
    fn find_similar_respects_threshold() {
        let cache = SignatureCache::in_memory();
        cache.insert(signature("sig_a", vec![1.0, 0.0]));

        let (hit, score) = cache.find_similar(&[1.0, 0.0], 0.85).unwrap();
        assert_eq!(hit.id, "sig_a");
        assert!((score - 1.0).abs() < 1e-12);
        assert!(cache.find_similar(&[0.0, 1.0], 0.85).is_none());
    }

    #[test]
    fn nearest_signature_wins() {
        let cache = SignatureCache::in_memory();
        cache.insert(signature("sig_far", vec![1.0, 1.0]));
        cache.insert(signature("sig_near", vec![1.0, 0.1]));
        let (hit, _) = cache.find_similar(&[1.0, 0.0], 0.5).unwrap();
        assert_eq!(hit.id, "sig_near");
    }

    #[test]
    fn signatures_are_immutable() {
        let cache = SignatureCache::in_memory();
        cache.insert(signature("sig_a", vec![1.0]));
        let mut replacement = signature("sig_a", vec![0.5]);
        replacement.patch_text = "{}".into();

        let kept = cache.insert(replacement);
        assert_eq!(kept.embedding, vec![1.0]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn mapping_decodes_patch_text() {
        let sig = signature("sig_a", vec![]);
        assert_eq!(sig.mapping().get("level").map(String::as_str), Some("Level"));
        assert_eq!(Signature::id_for(&RunId::from("run_abc")), "sig_run_abc");
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");

        let cache = SignatureCache::open(&path).unwrap();
        assert!(cache.is_empty());
        cache.insert(signature("sig_a", vec![0.2, 0.4]));

        let reloaded = SignatureCache::open(&path).unwrap();
        assert_eq!(reloaded.all(), cache.all());
    }

    #[test]
    fn corrupt_file_is_a_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        fs::write(&path, "not json").unwrap();
        let err = SignatureCache::open(&path).unwrap_err();
        assert!(err.is_store_failure());
    }
}
