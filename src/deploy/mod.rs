//! Incremental deploy: push a local tree to a remote directory, uploading
//! only files whose content hash differs.
//!
//! ```text
//! fetch remote checksums -> scan local tree -> diff -> ensure dirs -> upload
//! ```
//!
//! Files that exist only on the remote are never touched; removing remote
//! content is the job of [`crate::cleanup`].

pub mod diff;
pub mod ensure;
pub mod fetch;
pub mod upload;

pub use diff::{build_plan, PlannedUpload, SyncPlan};
pub use ensure::RemoteDirectoryEnsurer;
pub use fetch::{parse_checksum_listing, RemoteChecksumFetcher, RemoteChecksums};
pub use upload::{UploadExecutor, UploadOutcome, DEFAULT_UPLOAD_DELAY};

use crate::config::DeploySection;
use crate::error::{Result, SyncError};
use crate::remote::RemoteFs;
use crate::report::SyncReport;
use crate::scan::{ChecksumKind, LocalFileEntry, LocalTreeScanner};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCompletion {
    Partial,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    RemoteChecksumsFetched,
    LocalScanned,
    PlanBuilt,
    DirectoriesEnsured,
    Uploaded(UploadCompletion),
    /// `true` if the session ended through a fatal error
    Closed { failed: bool },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub local_root: PathBuf,
    pub remote_root: String,
    pub checksum: ChecksumKind,
    pub upload_delay: Duration,
    pub show_progress: bool,
}

impl SyncOptions {
    pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            checksum: ChecksumKind::default(),
            upload_delay: DEFAULT_UPLOAD_DELAY,
            show_progress: false,
        }
    }
}

impl From<&DeploySection> for SyncOptions {
    fn from(section: &DeploySection) -> Self {
        Self {
            local_root: section.local_root.clone(),
            remote_root: section.remote_root.clone(),
            checksum: section.checksum,
            upload_delay: section.upload_delay(),
            show_progress: false,
        }
    }
}

/// One end-to-end deploy over an already connected remote.
pub struct SyncSession<'a, R: RemoteFs + ?Sized> {
    remote: &'a R,
    options: SyncOptions,
    state: SessionState,
}

impl<'a, R: RemoteFs + ?Sized> SyncSession<'a, R> {
    pub fn new(remote: &'a R, options: SyncOptions) -> Self {
        Self {
            remote,
            options,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("sync session: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Compute what would be uploaded, without changing the remote.
    pub async fn plan(&mut self) -> Result<SyncPlan> {
        let result = self.build_plan_stages().await;
        if result.is_err() {
            self.transition(SessionState::Closed { failed: true });
        }
        result
    }

    /// Run the full deploy and return its summary.
    ///
    /// `Err` only for fatal problems (missing local root, transport failure);
    /// individual upload failures are listed in the report. A connection
    /// lost mid-upload yields [`SyncError::Aborted`] with the partial report.
    pub async fn run(&mut self) -> Result<SyncReport> {
        let result = self.run_stages().await;
        self.transition(SessionState::Closed {
            failed: result.is_err(),
        });
        result
    }

    async fn build_plan_stages(&mut self) -> Result<SyncPlan> {
        self.transition(SessionState::Connected);

        let local_root = self.options.local_root.clone();
        if !local_root.is_dir() {
            return Err(SyncError::NotFound { path: local_root });
        }

        tracing::info!(
            "Syncing {} -> {}",
            local_root.display(),
            self.options.remote_root
        );

        let remote_checksums = RemoteChecksumFetcher::new(self.options.checksum)
            .fetch(self.remote, &self.options.remote_root)
            .await?;
        self.transition(SessionState::RemoteChecksumsFetched);

        let scanner = LocalTreeScanner::new(local_root, self.options.checksum);
        let entries: Vec<LocalFileEntry> =
            tokio::task::spawn_blocking(move || scanner.scan()?.collect::<Result<Vec<_>>>())
                .await
                .map_err(|e| SyncError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        tracing::info!("Scanned {} local files", entries.len());
        self.transition(SessionState::LocalScanned);

        let plan = build_plan(entries, &remote_checksums, &self.options.remote_root);
        self.transition(SessionState::PlanBuilt);
        Ok(plan)
    }

    async fn run_stages(&mut self) -> Result<SyncReport> {
        let plan = self.build_plan_stages().await?;

        let executor = UploadExecutor::new(self.remote)
            .with_delay(self.options.upload_delay)
            .with_progress(self.options.show_progress);

        let failed_dirs = executor.prepare_directories(&plan).await?;
        self.transition(SessionState::DirectoriesEnsured);

        let outcome = executor.upload(&plan, &failed_dirs).await?;
        let completion = if outcome.failures.is_empty() {
            UploadCompletion::Complete
        } else {
            UploadCompletion::Partial
        };
        self.transition(SessionState::Uploaded(completion));

        Ok(outcome.into_report(plan.unchanged))
    }
}
