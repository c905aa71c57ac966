//! SSH/SFTP collaborator built on libssh2.
//!
//! libssh2 calls block, so each operation runs on the blocking pool with the
//! session behind a mutex. One session carries both the SFTP subsystem and
//! the exec channels.

use super::{CommandOutput, RemoteFs, RemoteStat};
use crate::config::RemoteConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use ssh2::{ErrorCode, ExtendedData, Session, Sftp};
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// LIBSSH2_FX_NO_SUCH_FILE
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Directory mode for created directories
const DIR_MODE: i32 = 0o755;

struct SshInner {
    session: Session,
    sftp: Sftp,
}

pub struct SshRemote {
    inner: Arc<Mutex<SshInner>>,
    host: String,
}

/// Session-level failures (timeouts, dropped connections) end the session;
/// SFTP status codes only concern the path at hand.
fn map_ssh_error(path: &str, err: ssh2::Error) -> SyncError {
    match err.code() {
        ErrorCode::Session(_) => SyncError::Transport(err.to_string()),
        ErrorCode::SFTP(_) => SyncError::remote(path, err),
    }
}

fn is_not_found(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

impl SshRemote {
    /// Connect, authenticate and open the SFTP subsystem.
    ///
    /// Authentication tries, in order: password (if configured), identity
    /// file (if configured), then the SSH agent.
    pub async fn connect(config: &RemoteConfig) -> Result<Self> {
        let config = config.clone();
        let host = config.host.clone();

        let inner = tokio::task::spawn_blocking(move || Self::connect_blocking(&config))
            .await
            .map_err(|e| SyncError::Transport(format!("SSH connect task failed: {}", e)))??;

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            host,
        })
    }

    fn connect_blocking(config: &RemoteConfig) -> Result<SshInner> {
        let transport = |e: ssh2::Error| SyncError::Transport(e.to_string());

        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|e| {
            SyncError::Transport(format!(
                "TCP connection to {}:{} failed: {}",
                config.host, config.port, e
            ))
        })?;

        let mut session = Session::new().map_err(transport)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(config.timeout().as_millis().min(u32::MAX as u128) as u32);
        session.handshake().map_err(transport)?;

        let user = config.user.clone().unwrap_or_else(whoami::username);
        let mut auth_errors: Vec<String> = Vec::new();

        if let Some(password) = &config.password {
            if let Err(e) = session.userauth_password(&user, password) {
                auth_errors.push(format!("password: {}", e));
            }
        }
        if !session.authenticated() {
            if let Some(key) = config.identity_path() {
                if let Err(e) = session.userauth_pubkey_file(&user, None, &key, None) {
                    auth_errors.push(format!("key {}: {}", key.display(), e));
                }
            }
        }
        if !session.authenticated() {
            if let Err(e) = session.userauth_agent(&user) {
                auth_errors.push(format!("agent: {}", e));
            }
        }
        if !session.authenticated() {
            return Err(SyncError::Transport(format!(
                "SSH authentication failed for {}@{}: {}",
                user,
                config.host,
                auth_errors.join("; ")
            )));
        }

        let sftp = session.sftp().map_err(transport)?;
        tracing::debug!("SSH session established to {}:{}", config.host, config.port);

        Ok(SshInner { session, sftp })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SshInner) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let guard = inner
                .lock()
                .map_err(|_| SyncError::Transport("SSH session lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| SyncError::Transport(format!("SSH task failed: {}", e)))?
    }

    /// Politely end the session.
    pub async fn close(self) -> Result<()> {
        let host = self.host.clone();
        self.blocking(|inner| {
            inner
                .session
                .disconnect(None, "deploy finished", None)
                .map_err(|e| SyncError::Transport(e.to_string()))
        })
        .await?;
        tracing::debug!("SSH session to {} closed", host);
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for SshRemote {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let command = command.to_string();
        self.blocking(move |inner| {
            let transport = |e: ssh2::Error| SyncError::Transport(e.to_string());

            let mut channel = inner.session.channel_session().map_err(transport)?;
            // Unread stderr would fill the channel window and stall the command
            channel
                .handle_extended_data(ExtendedData::Ignore)
                .map_err(transport)?;
            channel.exec(&command).map_err(transport)?;

            // Remote file names need not be UTF-8
            let mut stdout = Vec::new();
            channel
                .read_to_end(&mut stdout)
                .map_err(|e| SyncError::Transport(format!("Reading command output: {}", e)))?;
            channel.wait_close().map_err(transport)?;
            let exit_status = channel.exit_status().map_err(transport)?;

            Ok(CommandOutput::from_bytes(&stdout, exit_status))
        })
        .await
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>> {
        let path = path.to_string();
        self.blocking(move |inner| match inner.sftp.lstat(Path::new(&path)) {
            Ok(stat) => Ok(Some(RemoteStat {
                is_dir: stat.is_dir(),
                size: stat.size.unwrap_or(0),
            })),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(map_ssh_error(&path, e)),
        })
        .await
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let entries = inner
                .sftp
                .readdir(Path::new(&path))
                .map_err(|e| map_ssh_error(&path, e))?;

            let mut names: Vec<String> = entries
                .into_iter()
                .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .filter(|n| n != "." && n != "..")
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking(move |inner| {
            inner
                .sftp
                .mkdir(Path::new(&path), DIR_MODE)
                .map_err(|e| map_ssh_error(&path, e))
        })
        .await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking(move |inner| {
            inner
                .sftp
                .unlink(Path::new(&path))
                .map_err(|e| map_ssh_error(&path, e))
        })
        .await
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.blocking(move |inner| {
            inner
                .sftp
                .rmdir(Path::new(&path))
                .map_err(|e| map_ssh_error(&path, e))
        })
        .await
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<u64> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |inner| {
            let mut source = std::fs::File::open(&local)?;
            let mut target = inner
                .sftp
                .create(Path::new(&remote))
                .map_err(|e| map_ssh_error(&remote, e))?;
            std::io::copy(&mut source, &mut target).map_err(|e| SyncError::remote(&remote, e))
        })
        .await
    }
}
