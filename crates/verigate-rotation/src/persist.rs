//! JSON snapshot files backing the file-based adapters.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// A JSON document on disk that is replaced atomically on every save.
#[derive(Debug, Clone)]
pub(crate) struct JsonFile {
    path: PathBuf,
    system: &'static str,
}

impl JsonFile {
    /// `system` names the external system in error messages.
    pub(crate) fn new(path: PathBuf, system: &'static str) -> Self {
        Self { path, system }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, or the default value if the file does not exist.
    pub(crate) async fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(self.error("read", &e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| self.error("parse", &e))
    }

    /// Writes the document to a sibling temp file and renames it into place.
    pub(crate) async fn save<T: Serialize + Sync>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| self.error("serialize", &e))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error("create directory for", &e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| self.error("write", &e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error("replace", &e))
    }

    fn error(&self, action: &str, err: &dyn std::fmt::Display) -> Error {
        Error::Upstream {
            source_system: self.system,
            reason: format!("failed to {action} {}: {err}", self.path.display()),
        }
    }
}
