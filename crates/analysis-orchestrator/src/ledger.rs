//! Filesystem run ledger: one directory per run, one JSON document per stage.
//!
//! Every artifact is written at most once. Writes go to a temporary file that
//! is renamed into place, so readers never observe a half-written document.

use std::path::{Path, PathBuf};

use analysis_core::Bundle;
use dashmap::DashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const CONTEXT_ARTIFACT: &str = "context.json";
pub const RESOLUTION_ARTIFACT: &str = "resolution.json";
pub const DECISION_ARTIFACT: &str = "decision.json";
pub const BUNDLE_ARTIFACT: &str = "bundle.json";

/// Attempts at finding a free directory name when two runs share a key.
const MAX_DIR_SUFFIX: u32 = 100;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Artifact {0} was already written for this run")]
    AlreadyWritten(String),

    #[error("No free run directory for key {0}")]
    DirectoryTaken(String),
}

fn io_error(path: &Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write-once store scoped to a single run.
#[derive(Debug)]
pub struct RunLedger {
    dir: PathBuf,
    written: DashSet<String>,
}

impl RunLedger {
    /// Create `<root>/<run_key>`, appending `_2`, `_3`, ... if it already exists.
    pub async fn create(root: &Path, run_key: &str) -> Result<Self, LedgerError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| io_error(root, e))?;

        for n in 1..=MAX_DIR_SUFFIX {
            let name = if n == 1 {
                run_key.to_string()
            } else {
                format!("{}_{}", run_key, n)
            };
            let dir = root.join(&name);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    tracing::debug!("Created run directory {}", dir.display());
                    return Ok(Self {
                        dir,
                        written: DashSet::new(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&dir, e)),
            }
        }
        Err(LedgerError::DirectoryTaken(run_key.to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    /// Serialize `value` as pretty JSON under `name`. A second write of the
    /// same name is rejected.
    pub async fn write_artifact<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, LedgerError> {
        if !self.written.insert(name.to_string()) {
            return Err(LedgerError::AlreadyWritten(name.to_string()));
        }

        let bytes = serde_json::to_vec_pretty(value).map_err(|source| LedgerError::Encode {
            name: name.to_string(),
            source,
        })?;

        let target = self.path_of(name);
        let staging = self.path_of(&format!(".{}.tmp", name));
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| io_error(&target, e))?;

        tracing::debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }

    /// The single commit point of a run.
    pub async fn commit_bundle(&self, bundle: &Bundle) -> Result<PathBuf, LedgerError> {
        let path = self.write_artifact(BUNDLE_ARTIFACT, bundle).await?;
        tracing::info!("Committed bundle {}", path.display());
        Ok(path)
    }

    pub async fn read_artifact<T: DeserializeOwned>(&self, name: &str) -> Result<T, LedgerError> {
        read_artifact(&self.dir, name).await
    }
}

/// Read an artifact from any run directory, e.g. one written by an earlier process.
pub async fn read_artifact<T: DeserializeOwned>(run_dir: &Path, name: &str) -> Result<T, LedgerError> {
    let path = run_dir.join(name);
    let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
    serde_json::from_slice(&bytes).map_err(|source| LedgerError::Decode {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let root = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(root.path(), "20240603_120000_AAPL").await.unwrap();
        let note = Note { text: "hello".into() };
        ledger.write_artifact("note.json", &note).await.unwrap();
        let back: Note = ledger.read_artifact("note.json").await.unwrap();
        assert_eq!(back, note);
        assert!(ledger.contains("note.json"));
        assert!(!ledger.path_of(".note.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_artifacts_are_write_once() {
        let root = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(root.path(), "run").await.unwrap();
        let note = Note { text: "first".into() };
        ledger.write_artifact("note.json", &note).await.unwrap();
        let err = ledger.write_artifact("note.json", &note).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyWritten(_)));
    }

    #[tokio::test]
    async fn test_colliding_run_keys_get_suffixes() {
        let root = tempfile::tempdir().unwrap();
        let first = RunLedger::create(root.path(), "same").await.unwrap();
        let second = RunLedger::create(root.path(), "same").await.unwrap();
        assert_ne!(first.dir(), second.dir());
        assert!(second.dir().ends_with("same_2"));
    }

    #[tokio::test]
    async fn test_decode_error_names_artifact() {
        let root = tempfile::tempdir().unwrap();
        let ledger = RunLedger::create(root.path(), "run").await.unwrap();
        std::fs::write(ledger.path_of("bad.json"), b"{ not json").unwrap();
        let err = ledger.read_artifact::<Note>("bad.json").await.unwrap_err();
        assert!(matches!(err, LedgerError::Decode { ref name, .. } if name == "bad.json"));
    }
}
