//! Temporary payload store — bounded-lifetime scratch files.
//!
//! Every file written here belongs to exactly one scan attempt and is
//! removed exactly once: either explicitly via [`TempFile::cleanup`] or,
//! as a last resort, when the guard is dropped.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;

/// A scratch directory for attachment payloads, created on demand.
#[derive(Debug, Clone)]
pub struct TempStore {
    root: PathBuf,
}

impl TempStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist attachment bytes to a new scratch file.
    ///
    /// The file name combines the arrival instant (millis) with the message
    /// identifier, so concurrent scans never collide.
    pub async fn persist(&self, message_id: &str, bytes: &[u8]) -> std::io::Result<TempFile> {
        fs::create_dir_all(&self.root).await?;
        let name = format!(
            "{}_{}.tmp",
            Utc::now().timestamp_millis(),
            sanitize(message_id)
        );
        let path = self.root.join(name);
        fs::write(&path, bytes).await?;
        Ok(TempFile {
            path,
            len: bytes.len() as u64,
            removed: false,
        })
    }
}

/// Guard over one scratch file. Removal happens exactly once.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    len: u64,
    removed: bool,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored payload size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove the file. Preferred over relying on drop: async, and the
    /// caller sees the error.
    pub async fn cleanup(mut self) -> std::io::Result<()> {
        self.removed = true;
        fs::remove_file(&self.path).await
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.removed {
            // Covers exit paths that never reached cleanup(), e.g. a
            // panicking handler task.
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch file on drop"
                );
            }
        }
    }
}

/// Keep scratch file names filesystem-safe regardless of what the
/// transport uses as a message id.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
