//! Upload execution.

use super::diff::SyncPlan;
use super::ensure::RemoteDirectoryEnsurer;
use crate::error::Result;
use crate::path::remote_parent;
use crate::remote::RemoteFs;
use crate::error::SyncError;
use crate::report::{ItemFailure, SyncReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Pause between uploads so rate-limited hosts are not flooded
pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_millis(10);

/// Directories that could not be ensured, with the reason
pub type FailedDirectories = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct UploadOutcome {
    pub uploaded: Vec<String>,
    pub bytes: u64,
    pub failures: Vec<ItemFailure>,
}

impl UploadOutcome {
    pub fn into_report(self, unchanged: usize) -> SyncReport {
        SyncReport {
            unchanged,
            uploaded: self.uploaded,
            bytes_uploaded: self.bytes,
            failures: self.failures,
        }
    }
}

pub struct UploadExecutor<'a, R: RemoteFs + ?Sized> {
    remote: &'a R,
    delay: Duration,
    progress: ProgressBar,
}

impl<'a, R: RemoteFs + ?Sized> UploadExecutor<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            delay: DEFAULT_UPLOAD_DELAY,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        if show {
            let bar = ProgressBar::new(0);
            if let Ok(style) =
                ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            self.progress = bar;
        }
        self
    }

    /// Ensure every directory that will receive an upload, parents first.
    ///
    /// Per-directory failures are returned, not raised; only a transport
    /// failure aborts.
    pub async fn prepare_directories(&self, plan: &SyncPlan) -> Result<FailedDirectories> {
        let mut failed = FailedDirectories::new();
        if plan.is_empty() {
            return Ok(failed);
        }

        // Sorted, so a parent is always visited before its children
        let directories: BTreeSet<&str> = plan
            .uploads
            .iter()
            .filter_map(|u| remote_parent(&u.remote_path))
            .collect();

        let mut ensurer = RemoteDirectoryEnsurer::new(self.remote);
        for dir in directories {
            if let Err(e) = ensurer.ensure(dir).await {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!("Cannot prepare {}: {}", dir, e);
                failed.insert(dir.to_string(), e.to_string());
            }
        }
        Ok(failed)
    }

    /// Upload every planned file in order. A failed file is recorded and the
    /// rest still run.
    ///
    /// A fatal error stops the loop with [`SyncError::Aborted`], carrying
    /// the uploads already done plus every file left unwritten.
    pub async fn upload(&self, plan: &SyncPlan, failed_dirs: &FailedDirectories) -> Result<UploadOutcome> {
        let mut outcome = UploadOutcome::default();
        if plan.is_empty() {
            tracing::info!("All files are up to date, nothing to do");
            return Ok(outcome);
        }

        tracing::info!("{} files changed, uploading", plan.len());
        self.progress.set_length(plan.len() as u64);

        for (i, upload) in plan.uploads.iter().enumerate() {
            let target = upload.remote_path.as_str();
            self.progress.set_message(upload.entry.relative_path.clone());

            let blocked = remote_parent(target).and_then(|dir| failed_dirs.get(dir).map(|r| (dir, r)));
            if let Some((dir, reason)) = blocked {
                outcome.failures.push(ItemFailure::new(
                    target,
                    format!("directory {} unavailable: {}", dir, reason),
                ));
                self.progress.inc(1);
                continue;
            }

            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.remote.upload_file(&upload.entry.absolute_path, target).await {
                Ok(bytes) => {
                    tracing::debug!("Uploaded {} ({} bytes)", target, bytes);
                    outcome.bytes += bytes;
                    outcome.uploaded.push(target.to_string());
                }
                Err(e) if e.is_fatal() => {
                    self.progress.abandon();
                    tracing::error!("Connection lost uploading {}: {}", target, e);
                    outcome.failures.push(ItemFailure::new(target, &e));
                    for rest in &plan.uploads[i + 1..] {
                        outcome
                            .failures
                            .push(ItemFailure::new(&rest.remote_path, "not attempted: session aborted"));
                    }
                    return Err(SyncError::Aborted {
                        partial: Box::new(outcome.into_report(plan.unchanged)),
                        cause: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to upload {}: {}", upload.entry.relative_path, e);
                    outcome.failures.push(ItemFailure::new(target, e));
                }
            }
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();
        Ok(outcome)
    }

    /// `prepare_directories` followed by `upload`.
    pub async fn execute(&self, plan: &SyncPlan) -> Result<UploadOutcome> {
        let failed_dirs = self.prepare_directories(plan).await?;
        self.upload(plan, &failed_dirs).await
    }
}
