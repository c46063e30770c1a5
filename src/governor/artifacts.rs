// SPDX-License-Identifier: MIT

//! Run-scoped storage for profile and drift reports
//!
//! Reports are JSON documents keyed by run, kind and table name. The run
//! state only carries their URIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

use super::error::{GovernorError, Result};

const MEMORY_SCHEME: &str = "mem://";
const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Profile,
    Drift,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Profile => write!(f, "profile"),
            ArtifactKind::Drift => write!(f, "drift"),
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a report and return its URI
    async fn put(
        &self,
        run_id: &str,
        kind: ArtifactKind,
        table: &str,
        document: &serde_json::Value,
    ) -> Result<String>;

    async fn get(&self, uri: &str) -> Result<serde_json::Value>;
}

fn artifact_name(run_id: &str, kind: ArtifactKind, table: &str) -> Result<String> {
    for (label, part) in [("run id", run_id), ("table name", table)] {
        let safe = !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(GovernorError::artifact(format!(
                "invalid {} for artifact: '{}'",
                label, part
            )));
        }
    }
    Ok(format!("{}/{}_{}.json", run_id, kind, table))
}

/// Artifacts held in process memory under `mem://` URIs
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    documents: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        run_id: &str,
        kind: ArtifactKind,
        table: &str,
        document: &serde_json::Value,
    ) -> Result<String> {
        let uri = format!("{}{}", MEMORY_SCHEME, artifact_name(run_id, kind, table)?);
        self.documents
            .write()
            .await
            .insert(uri.clone(), document.clone());
        Ok(uri)
    }

    async fn get(&self, uri: &str) -> Result<serde_json::Value> {
        self.documents
            .read()
            .await
            .get(uri)
            .cloned()
            .ok_or_else(|| GovernorError::artifact(format!("no artifact at {}", uri)))
    }
}

/// Artifacts written as pretty JSON under `<root>/<run_id>/`
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn put(
        &self,
        run_id: &str,
        kind: ArtifactKind,
        table: &str,
        document: &serde_json::Value,
    ) -> Result<String> {
        let target = self.root.join(artifact_name(run_id, kind, table)?);
        let parent = target
            .parent()
            .ok_or_else(|| GovernorError::artifact(format!("no parent for {}", target.display())))?;
        fs::create_dir_all(parent).await?;
        let parent = fs::canonicalize(parent).await?;
        let target = parent.join(format!("{}_{}.json", kind, table));

        let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec_pretty(document)?).await?;
        fs::rename(&tmp, &target).await?;

        log::debug!("Wrote {} artifact to {}", kind, target.display());
        Ok(format!("{}{}", FILE_SCHEME, target.display()))
    }

    async fn get(&self, uri: &str) -> Result<serde_json::Value> {
        let path = uri
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| GovernorError::artifact(format!("not a file artifact: {}", uri)))?;
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| GovernorError::artifact(format!("cannot read {}: {}", uri, e)))?;
        Ok(serde_json::from_str(&content)?)
    }
}
