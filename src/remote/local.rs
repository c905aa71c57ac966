//! A local directory standing in for the remote host.
//!
//! Relative remote paths resolve against `base`, the way SFTP resolves them
//! against the login directory. Commands run through `sh -c` in `base`.

use super::{CommandOutput, RemoteFs, RemoteStat};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

pub struct LocalRemote {
    base: PathBuf,
}

impl LocalRemote {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }
}

#[async_trait]
impl RemoteFs for LocalRemote {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.base)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Transport(format!("Failed to spawn sh: {}", e)))?;

        Ok(CommandOutput::from_bytes(
            &output.stdout,
            output.status.code().unwrap_or(-1),
        ))
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>> {
        match fs::symlink_metadata(self.resolve(path)).await {
            Ok(meta) => Ok(Some(RemoteStat {
                is_dir: meta.is_dir(),
                size: meta.len(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::remote(path, e)),
        }
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let mut dir = fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| SyncError::remote(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| SyncError::remote(path, e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir(self.resolve(path))
            .await
            .map_err(|e| SyncError::remote(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        fs::remove_file(self.resolve(path))
            .await
            .map_err(|e| SyncError::remote(path, e))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        fs::remove_dir(self.resolve(path))
            .await
            .map_err(|e| SyncError::remote(path, e))
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<u64> {
        fs::copy(local, self.resolve(remote))
            .await
            .map_err(|e| SyncError::remote(remote, e))
    }
}
