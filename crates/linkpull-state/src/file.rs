use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use linkpull_core::{Checkpoint, CheckpointStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{StateError, StateResult};

const SUFFIX: &str = ".checkpoint.json";

#[derive(Serialize, Deserialize)]
struct StoredCheckpoint {
    key: String,
    checkpoint: Checkpoint,
}

/// Checkpoints as JSON files, one per resource key.
///
/// Writes go to a uniquely named temp file in the same directory which is
/// then renamed over the target, so a reader sees either the old or the new
/// checkpoint.
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn open(dir: impl Into<PathBuf>) -> StateResult<Self> {
        let dir = dir.into();
        info!(path = %dir.display(), "Opening checkpoint store");
        fs::create_dir_all(&dir).map_err(|e| StateError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a key: sanitized key plus a short hash so distinct keys
    /// that sanitize alike do not collide.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let short = hex::encode(&digest[..4]);
        self.dir
            .join(format!("{}-{}{}", sanitize(key), short, SUFFIX))
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> StateResult<()> {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, target)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(StateError::io(target, e));
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> StateResult<Option<StoredCheckpoint>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::io(path, e)),
        };
        let stored: StoredCheckpoint = serde_json::from_str(&content)
            .map_err(|e| StateError::Corrupt(format!("{}: {e}", path.display())))?;
        Ok(Some(stored))
    }

    pub fn save_checkpoint(&self, key: &str, checkpoint: &Checkpoint) -> StateResult<()> {
        let stored = StoredCheckpoint {
            key: key.to_string(),
            checkpoint: checkpoint.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&stored)?;
        let path = self.path_for(key);
        self.write_atomic(&path, &bytes)?;
        debug!(key, path = %path.display(), processed = checkpoint.processed_count, "Checkpoint written");
        Ok(())
    }

    pub fn load_checkpoint(&self, key: &str) -> StateResult<Option<Checkpoint>> {
        Ok(self.read(&self.path_for(key))?.map(|s| s.checkpoint))
    }

    pub fn delete_checkpoint(&self, key: &str) -> StateResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(key, "Checkpoint deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&path, e)),
        }
    }

    /// Every readable checkpoint in the directory. Unreadable files are skipped.
    pub fn list_checkpoints(&self) -> StateResult<Vec<(String, Checkpoint)>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StateError::io(&self.dir, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StateError::io(&self.dir, e))?.path();
            let is_checkpoint = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SUFFIX) && !n.starts_with('.'));
            if !is_checkpoint {
                continue;
            }
            match self.read(&path) {
                Ok(Some(stored)) => found.push((stored.key, stored.checkpoint)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, key: &str, checkpoint: &Checkpoint) -> linkpull_core::Result<()> {
        Ok(self.save_checkpoint(key, checkpoint)?)
    }

    fn load(&self, key: &str) -> linkpull_core::Result<Option<Checkpoint>> {
        Ok(self.load_checkpoint(key)?)
    }

    fn delete(&self, key: &str) -> linkpull_core::Result<()> {
        Ok(self.delete_checkpoint(key)?)
    }

    fn list(&self) -> linkpull_core::Result<Vec<(String, Checkpoint)>> {
        Ok(self.list_checkpoints()?)
    }
}

/// Keep filename-safe characters, replace the rest with `_`.
fn sanitize(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "checkpoint".to_string()
    } else {
        cleaned
    }
}
