// src/datafile.rs
// Shared data file access.
// The JSON array on disk is the only contract between producer and consumer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{PulseError, Result};
use crate::record::CommentRecord;

#[derive(Clone, Debug)]
pub struct DataFile {
    path: PathBuf,
    // Serializes read-count-then-write for every writer sharing this handle,
    // so rounds stay contiguous across agents of one process.
    write_lock: Arc<Mutex<()>>,
}

impl DataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader side. Never fails: absent, unreadable or half-written files
    /// come back as the placeholder record set.
    pub fn read_all(&self) -> Vec<CommentRecord> {
        match self.load() {
            Ok(records) if records.is_empty() && !self.path.exists() => {
                debug!(path = %self.path.display(), "data file absent, using placeholder");
                vec![CommentRecord::placeholder()]
            }
            Ok(records) => records,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "data file unreadable, using placeholder");
                vec![CommentRecord::placeholder()]
            }
        }
    }

    /// Writer side. Absent file is an empty sequence; anything unparseable is an error.
    pub fn load(&self) -> Result<Vec<CommentRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| PulseError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Appends one record with `round = len + 1` and returns the stored record.
    /// The array is written to a sibling temp file and renamed into place.
    pub async fn append(&self, mut record: CommentRecord) -> Result<CommentRecord> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load()?;
        record.round = records.len() as u64 + 1;
        records.push(record.clone());

        let payload = serde_json::to_vec_pretty(&records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        Ok(record)
    }

    /// Starts a fresh topic session.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                warn!(path = %self.path.display(), "data file reset for new topic session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "data.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
