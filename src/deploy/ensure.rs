//! Idempotent remote directory creation.

use crate::error::{Result, SyncError};
use crate::path::prefixes;
use crate::remote::RemoteFs;
use std::collections::HashSet;

pub struct RemoteDirectoryEnsurer<'a, R: RemoteFs + ?Sized> {
    remote: &'a R,
    /// Prefixes known to exist as directories
    known: HashSet<String>,
}

impl<'a, R: RemoteFs + ?Sized> RemoteDirectoryEnsurer<'a, R> {
    pub fn new(remote: &'a R) -> Self {
        Self {
            remote,
            known: HashSet::new(),
        }
    }

    /// Make sure every prefix of `path` exists as a directory, shortest
    /// first.
    ///
    /// A prefix that exists as a file is a conflict and is left alone.
    pub async fn ensure(&mut self, path: &str) -> Result<()> {
        for prefix in prefixes(path) {
            if self.known.contains(&prefix) {
                continue;
            }

            match self.remote.stat(&prefix).await? {
                Some(stat) if stat.is_dir => {}
                Some(_) => {
                    tracing::warn!("{} exists but is not a directory", prefix);
                    return Err(SyncError::Conflict { path: prefix });
                }
                None => self.create(&prefix).await?,
            }
            self.known.insert(prefix);
        }
        Ok(())
    }

    async fn create(&self, path: &str) -> Result<()> {
        match self.remote.mkdir(path).await {
            Ok(()) => {
                tracing::debug!("Created remote directory {}", path);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            // Lost a race with another writer: fine if a directory is there now
            Err(e) => match self.remote.stat(path).await? {
                Some(stat) if stat.is_dir => Ok(()),
                Some(_) => Err(SyncError::Conflict {
                    path: path.to_string(),
                }),
                None => Err(e),
            },
        }
    }
}
