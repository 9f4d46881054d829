//! Removal of persisted transport session data.
//!
//! The session directory is deleted recursively, except for files whose name
//! contains the keep pattern (debug logs held open by the transport). Each
//! failed pass is retried after a delay; when the retry budget is spent the
//! pluggable [`PurgeFallback`] gets one last try.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::errors::PurgeError;

/// Last-resort removal strategy used after the regular passes fail.
#[async_trait]
pub trait PurgeFallback: Send + Sync {
    async fn force_remove(&self, path: &Path) -> std::io::Result<()>;
}

/// Shells out to the platform's recursive delete command.
pub struct ShellPurgeFallback;

#[async_trait]
impl PurgeFallback for ShellPurgeFallback {
    async fn force_remove(&self, path: &Path) -> std::io::Result<()> {
        let mut cmd = if cfg!(windows) {
            let mut c = tokio::process::Command::new("cmd");
            c.args(["/C", "rd", "/s", "/q"]).arg(path);
            c
        } else {
            let mut c = tokio::process::Command::new("rm");
            c.arg("-rf").arg(path);
            c
        };
        let status = cmd.status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "forced delete exited with {}",
                status
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeOutcome {
    /// Nothing to remove.
    Absent,
    /// Removed by the regular pass; `kept` files matched the keep pattern.
    Removed { kept: usize },
    /// Removed by the fallback after all regular passes failed.
    ForceRemoved,
}

pub struct SessionPurger {
    path: PathBuf,
    keep_pattern: String,
    retries: u32,
    retry_delay: Duration,
    fallback: Box<dyn PurgeFallback>,
}

impl SessionPurger {
    pub fn new(
        path: impl Into<PathBuf>,
        keep_pattern: impl Into<String>,
        retries: u32,
        retry_delay: Duration,
        fallback: Box<dyn PurgeFallback>,
    ) -> Self {
        Self {
            path: path.into(),
            keep_pattern: keep_pattern.into(),
            retries,
            retry_delay,
            fallback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn purge(&self) -> Result<PurgeOutcome, PurgeError> {
        if !self.path.exists() {
            return Ok(PurgeOutcome::Absent);
        }

        let attempts = self.retries + 1;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match remove_tree(&self.path, &self.keep_pattern) {
                Ok(kept) => {
                    info!(
                        path = %self.path.display(),
                        kept,
                        "Session data removed"
                    );
                    return Ok(PurgeOutcome::Removed { kept });
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        attempts,
                        "Session data removal failed: {}",
                        e
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        match self.fallback.force_remove(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Session data removed by forced delete");
                Ok(PurgeOutcome::ForceRemoved)
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    "Forced delete of session data failed: {} (previous: {:?})",
                    e,
                    last_err
                );
                Err(PurgeError::Exhausted {
                    path: self.path.clone(),
                    attempts: attempts + 1,
                    source: e,
                })
            }
        }
    }
}

/// Delete `dir` recursively, sparing files whose name contains `keep`.
/// Directories that still hold a spared file are left in place.
/// Returns the number of spared files.
fn remove_tree(dir: &Path, keep: &str) -> std::io::Result<usize> {
    let mut kept = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            kept += remove_tree(&path, keep)?;
        } else if !keep.is_empty() && entry.file_name().to_string_lossy().contains(keep) {
            kept += 1;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    if kept == 0 {
        std::fs::remove_dir(dir)?;
    }
    Ok(kept)
}
