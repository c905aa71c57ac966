//! Remote filesystem collaborators.
//!
//! The deploy and cleanup engines only talk to a [`RemoteFs`]; the channel
//! behind it is assumed to be connected and authenticated already.

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod local;
#[cfg(feature = "ssh")]
pub mod ssh;

pub use local::LocalRemote;
#[cfg(feature = "ssh")]
pub use ssh::SshRemote;

/// Result of a remote shell command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_status: i32,
}

impl CommandOutput {
    /// Decode raw stdout; bytes that are not UTF-8 are replaced rather than
    /// failing the whole command.
    pub fn from_bytes(stdout: &[u8], exit_status: i32) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            exit_status,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_dir: bool,
    pub size: u64,
}

#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Run a shell command and capture its stdout and exit status.
    ///
    /// `Err` means no command channel could be opened at all; a command that
    /// ran and failed is reported through `exit_status`.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// `Ok(None)` if nothing exists at `path`.
    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>>;

    /// Names of the immediate children of a directory.
    async fn list_children(&self, path: &str) -> Result<Vec<String>>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, path: &str) -> Result<()>;

    /// Stream a local file to `remote`, replacing it. Returns bytes written.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<u64>;

    /// Whether `stat` is cheap enough to probe types before deleting.
    fn has_cheap_stat(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_from_invalid_utf8() {
        let raw = b"d41d8cd98f00b204e9800998ecf8427e  ./caf\xe9.txt\nd41d8cd98f00b204e9800998ecf8427e  ./ok.txt\n";
        let output = CommandOutput::from_bytes(raw, 0);
        assert!(output.success());
        assert_eq!(output.stdout.lines().count(), 2);
        assert!(output.stdout.contains("./ok.txt"));
        assert!(output.stdout.contains("caf\u{FFFD}.txt"));
    }
}
