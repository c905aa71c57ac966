//! Deployment configuration.
//!
//! Loaded from a TOML file. Secrets never live in the file: the password is
//! read from the environment variable the file names, and the `Debug` output
//! redacts it.

use crate::error::{Result, SyncError};
use crate::scan::ChecksumKind;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "hashsync.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    pub remote: RemoteConfig,
    pub deploy: Option<DeploySection>,
    pub cleanup: Option<CleanupSection>,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    /// Name of the environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolved from `password_env` by `load`, never deserialized
    #[serde(skip)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploySection {
    pub local_root: PathBuf,
    pub remote_root: String,
    #[serde(default)]
    pub checksum: ChecksumKind,
    #[serde(default = "default_upload_delay_ms")]
    pub upload_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleanupSection {
    pub remote_root: String,
    #[serde(default)]
    pub preserve: Vec<String>,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_upload_delay_ms() -> u64 {
    10
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password_env", &self.password_env)
            .field("identity_file", &self.identity_file)
            .field("timeout_secs", &self.timeout_secs)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteConfig {
    /// Fill `password` from the environment variable named by `password_env`.
    pub fn resolve_password_from_env(&mut self) -> Result<()> {
        self.resolve_password(|name| std::env::var(name).ok())
    }

    fn resolve_password<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = &self.password_env {
            let password = lookup(name).ok_or_else(|| {
                SyncError::Config(format!("Environment variable {} is not set", name))
            })?;
            self.password = Some(password);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Identity file with a leading `~` expanded to the home directory.
    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity_file.as_deref().map(expand_tilde)
    }
}

impl DeploySection {
    pub fn upload_delay(&self) -> Duration {
        Duration::from_millis(self.upload_delay_ms)
    }
}

impl DeployConfig {
    /// Read, parse and validate a config file. The password is resolved
    /// separately, only when an SSH connection is actually made.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: DeployConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.remote.host.trim().is_empty() {
            return Err(SyncError::Config("remote.host must not be empty".into()));
        }
        if self.remote.timeout_secs == 0 {
            return Err(SyncError::Config("remote.timeout_secs must be positive".into()));
        }
        if let Some(deploy) = &self.deploy {
            if deploy.remote_root.trim().is_empty() {
                return Err(SyncError::Config("deploy.remote_root must not be empty".into()));
            }
            if deploy.local_root.as_os_str().is_empty() {
                return Err(SyncError::Config("deploy.local_root must not be empty".into()));
            }
        }
        if let Some(cleanup) = &self.cleanup {
            if cleanup.remote_root.trim().is_empty() {
                return Err(SyncError::Config("cleanup.remote_root must not be empty".into()));
            }
            if let Some(bad) = cleanup.preserve.iter().find(|n| n.contains('/')) {
                return Err(SyncError::Config(format!(
                    "cleanup.preserve entries are top-level names, got {}",
                    bad
                )));
            }
        }
        Ok(())
    }

    pub fn deploy_section(&self) -> Result<&DeploySection> {
        self.deploy
            .as_ref()
            .ok_or_else(|| SyncError::Config("missing [deploy] section".into()))
    }

    pub fn cleanup_section(&self) -> Result<&CleanupSection> {
        self.cleanup
            .as_ref()
            .ok_or_else(|| SyncError::Config("missing [cleanup] section".into()))
    }
}

/// Expand tilde (~) in paths to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}
