// SPDX-License-Identifier: MIT

//! Durable checkpoint store on the local filesystem
//!
//! Layout:
//!
//! ```text
//! <root>/<run_id>/checkpoints/0000000000.json
//! <root>/<run_id>/checkpoints/0000000001.json
//! <root>/<run_id>/status.json
//! ```
//!
//! Every file is written to a temporary sibling first and then moved into
//! place, so readers never observe a half-written checkpoint.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use super::{Checkpoint, CheckpointStore};
use crate::flow::error::FlowError;
use crate::flow::state::RunStatus;

const CHECKPOINT_DIR: &str = "checkpoints";
const STATUS_FILE: &str = "status.json";

#[derive(Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, FlowError> {
        validate_run_id(run_id)?;
        Ok(self.root.join(run_id))
    }

    fn checkpoint_path(&self, run_id: &str, sequence: u64) -> Result<PathBuf, FlowError> {
        Ok(self
            .run_dir(run_id)?
            .join(CHECKPOINT_DIR)
            .join(format!("{:010}.json", sequence)))
    }

    /// Sequence numbers present for a run, ascending
    async fn sequences(&self, run_id: &str) -> Result<Vec<u64>, FlowError> {
        let dir = self.run_dir(run_id)?.join(CHECKPOINT_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sequences = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(seq) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                sequences.push(seq);
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }

    async fn read_checkpoint(&self, path: &Path) -> Result<Option<Checkpoint>, FlowError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_checkpoint(
        &self,
        checkpoint: &Checkpoint,
        exclusive: bool,
    ) -> Result<bool, FlowError> {
        let target = self.checkpoint_path(&checkpoint.run_id, checkpoint.sequence)?;
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        write_atomic(&target, &bytes, exclusive).await
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, run_id: &str) -> Result<Option<Checkpoint>, FlowError> {
        match self.sequences(run_id).await?.last() {
            Some(&seq) => self.get_at(run_id, seq).await,
            None => Ok(None),
        }
    }

    async fn get_at(&self, run_id: &str, sequence: u64) -> Result<Option<Checkpoint>, FlowError> {
        let path = self.checkpoint_path(run_id, sequence)?;
        self.read_checkpoint(&path).await
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), FlowError> {
        let _guard = self.write_lock.lock().await;
        self.write_checkpoint(&checkpoint, false).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: Option<u64>,
        checkpoint: Checkpoint,
    ) -> Result<bool, FlowError> {
        let _guard = self.write_lock.lock().await;
        let head = self.sequences(&checkpoint.run_id).await?.last().copied();
        if head != expected {
            log::warn!(
                "Checkpoint CAS rejected for run {}: head {:?}, expected {:?}",
                checkpoint.run_id,
                head,
                expected
            );
            return Ok(false);
        }
        // Exclusive create guards against another process sharing the directory
        self.write_checkpoint(&checkpoint, true).await
    }

    async fn history(&self, run_id: &str) -> Result<Vec<Checkpoint>, FlowError> {
        let mut history = Vec::new();
        for seq in self.sequences(run_id).await? {
            if let Some(cp) = self.get_at(run_id, seq).await? {
                history.push(cp);
            }
        }
        Ok(history)
    }

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), FlowError> {
        let path = self.run_dir(run_id)?.join(STATUS_FILE);
        let bytes = serde_json::to_vec_pretty(&status)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&path, &bytes, false).await?;
        Ok(())
    }

    async fn status(&self, run_id: &str) -> Result<Option<RunStatus>, FlowError> {
        let path = self.run_dir(run_id)?.join(STATUS_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_runs(&self) -> Result<Vec<String>, FlowError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_run_id(name).is_ok() {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}

/// Run ids become directory names, so only a safe alphabet is accepted
fn validate_run_id(run_id: &str) -> Result<(), FlowError> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FlowError::store(format!("Invalid run id: '{}'", run_id)))
    }
}

/// Write `bytes` to `target` via a temporary file.
///
/// With `exclusive` the final step is a hard link, which fails if `target`
/// already exists; returns `false` in that case instead of overwriting.
async fn write_atomic(target: &Path, bytes: &[u8], exclusive: bool) -> Result<bool, FlowError> {
    let parent = target
        .parent()
        .ok_or_else(|| FlowError::store(format!("No parent for {}", target.display())))?;
    fs::create_dir_all(parent).await?;

    let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, bytes).await?;

    if !exclusive {
        fs::rename(&tmp, target).await?;
        return Ok(true);
    }

    let linked = fs::hard_link(&tmp, target).await;
    fs::remove_file(&tmp).await?;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}
