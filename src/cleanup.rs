//! Remote cleanup: recursively delete everything under a remote directory
//! except a set of preserved top-level names.

use crate::config::CleanupSection;
use crate::error::Result;
use crate::path::remote_join;
use crate::remote::RemoteFs;
use crate::report::{CleanupReport, DeleteOutcome, ItemFailure};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;

pub struct RemoteTreeDeleter<'a, R: RemoteFs + ?Sized> {
    remote: &'a R,
    failures: Vec<ItemFailure>,
}

impl<'a, R: RemoteFs + ?Sized> RemoteTreeDeleter<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            failures: Vec::new(),
        }
    }

    /// Delete every child of `root` not named in `preserved`.
    ///
    /// The root itself is removed only when no preserved name is present
    /// and every other child is gone. `Err` is reserved for a root that
    /// cannot be listed or a transport failure.
    pub async fn delete_children(
        mut self,
        root: &str,
        preserved: &HashSet<String>,
    ) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for name in self.remote.list_children(root).await? {
            if preserved.contains(&name) {
                tracing::info!("Preserving {}", name);
                report.preserved.push(name);
                continue;
            }

            tracing::info!("Deleting {}", name);
            let outcome = self.delete_entry(remote_join(root, &name)).await?;
            report.entries.push((name, outcome));
        }

        let all_deleted = report
            .entries
            .iter()
            .all(|(_, o)| !matches!(o, DeleteOutcome::Failed(_)));

        if report.preserved.is_empty() && all_deleted {
            match self.remote.remove_dir(root).await {
                Ok(()) => report.root_removed = true,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.fail(root, e.to_string());
                }
            }
        }

        report.failures = self.failures;
        Ok(report)
    }

    fn fail(&mut self, path: &str, reason: String) -> DeleteOutcome {
        tracing::warn!("Failed to remove {}: {}", path, reason);
        self.failures.push(ItemFailure::new(path, &reason));
        DeleteOutcome::Failed(reason)
    }

    fn delete_entry(&mut self, path: String) -> BoxFuture<'_, Result<DeleteOutcome>> {
        async move {
            if self.remote.has_cheap_stat() {
                return match self.remote.stat(&path).await {
                    Ok(Some(stat)) if stat.is_dir => self.delete_dir(&path, None).await,
                    Ok(Some(_)) => match self.remote.remove_file(&path).await {
                        Ok(()) => Ok(DeleteOutcome::Deleted),
                        Err(e) if e.is_fatal() => Err(e),
                        Err(e) => Ok(self.fail(&path, e.to_string())),
                    },
                    Ok(None) => {
                        tracing::debug!("{} vanished before deletion", path);
                        Ok(DeleteOutcome::Deleted)
                    }
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => Ok(self.fail(&path, e.to_string())),
                };
            }

            // No cheap stat: try it as a file, fall back to a directory
            match self.remote.remove_file(&path).await {
                Ok(()) => Ok(DeleteOutcome::Deleted),
                Err(e) if e.is_fatal() => Err(e),
                Err(e) => self.delete_dir(&path, Some(e.to_string())).await,
            }
        }
        .boxed()
    }

    async fn delete_dir(&mut self, path: &str, file_error: Option<String>) -> Result<DeleteOutcome> {
        let children = match self.remote.list_children(path).await {
            Ok(children) => children,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let reason = match file_error {
                    Some(file_error) => format!("{}; {}", file_error, e),
                    None => e.to_string(),
                };
                return Ok(self.fail(path, reason));
            }
        };

        let mut remaining = 0usize;
        for child in children {
            let outcome = self.delete_entry(remote_join(path, &child)).await?;
            if matches!(outcome, DeleteOutcome::Failed(_)) {
                remaining += 1;
            }
        }

        if remaining > 0 {
            return Ok(self.fail(
                path,
                format!("{} entries inside could not be removed", remaining),
            ));
        }

        match self.remote.remove_dir(path).await {
            Ok(()) => {
                tracing::debug!("Removed directory {}", path);
                Ok(DeleteOutcome::Recursed)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(self.fail(path, e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub remote_root: String,
    pub preserve: HashSet<String>,
}

impl From<&CleanupSection> for CleanupOptions {
    fn from(section: &CleanupSection) -> Self {
        Self {
            remote_root: section.remote_root.clone(),
            preserve: section.preserve.iter().cloned().collect(),
        }
    }
}

/// List the remote root and delete all unpreserved entries.
pub struct CleanupSession<'a, R: RemoteFs + ?Sized> {
    remote: &'a R,
    options: CleanupOptions,
}

impl<'a, R: RemoteFs + ?Sized> CleanupSession<'a, R> {
    pub fn new(remote: &'a R, options: CleanupOptions) -> Self {
        Self { remote, options }
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        let mut preserved: Vec<&str> = self.options.preserve.iter().map(String::as_str).collect();
        preserved.sort_unstable();
        tracing::info!(
            "Cleaning up {} (preserving {:?})",
            self.options.remote_root,
            preserved
        );

        RemoteTreeDeleter::new(self.remote)
            .delete_children(&self.options.remote_root, &self.options.preserve)
            .await
    }
}
