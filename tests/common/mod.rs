//! In-memory remote host for integration tests.
//!
//! Records every operation so tests can assert on ordering, and can be told
//! to fail specific paths.

#![allow(dead_code)]

use async_trait::async_trait;
use hashsync::remote::{CommandOutput, RemoteFs, RemoteStat};
use hashsync::scan::ChecksumKind;
use hashsync::{Result, SyncError};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Exec(String),
    Stat(String),
    List(String),
    Mkdir(String),
    Upload(String),
    RemoveFile(String),
    RemoveDir(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Behave like `find | md5sum` on a POSIX host
    Hash,
    /// Command runs but exits non-zero
    ExitFailure,
    /// No channel can be opened
    TransportDown,
}

pub struct MemoryRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    ops: Mutex<Vec<Op>>,
    pub exec_mode: ExecMode,
    pub cheap_stat: bool,
    pub fail_uploads: HashSet<String>,
    pub fail_removes: HashSet<String>,
    /// The nth upload (1-based) fails as a dropped connection
    pub drop_connection_at_upload: Option<usize>,
    uploads_seen: Mutex<usize>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(BTreeMap::new()),
            ops: Mutex::new(Vec::new()),
            exec_mode: ExecMode::Hash,
            cheap_stat: true,
            fail_uploads: HashSet::new(),
            fail_removes: HashSet::new(),
            drop_connection_at_upload: None,
            uploads_seen: Mutex::new(0),
        }
    }

    /// Add a directory (and its parents).
    pub fn dir(self, path: &str) -> Self {
        {
            let mut nodes = self.nodes.lock().unwrap();
            let mut current = String::new();
            for segment in path.split('/') {
                if !current.is_empty() {
                    current.push('/');
                }
                current.push_str(segment);
                nodes.entry(current.clone()).or_insert(Node::Dir);
            }
        }
        self
    }

    /// Add a file, creating parent directories.
    pub fn file(self, path: &str, content: &str) -> Self {
        let this = match path.rsplit_once('/') {
            Some((parent, _)) => self.dir(parent),
            None => self,
        };
        this.nodes
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::File(content.as_bytes().to_vec()));
        this
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(path).cloned()
    }

    pub fn content(&self, path: &str) -> Option<String> {
        match self.node(path) {
            Some(Node::File(bytes)) => Some(String::from_utf8(bytes).unwrap()),
            _ => None,
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.nodes.lock().unwrap().keys().cloned().collect()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Position of the first recorded op equal to `op`.
    pub fn position(&self, op: &Op) -> Option<usize> {
        self.ops().iter().position(|o| o == op)
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    fn parent_is_dir(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => matches!(nodes.get(parent), Some(Node::Dir)),
            None => true,
        }
    }

    fn children(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }

    fn hash_listing(&self, dir: &str) -> CommandOutput {
        let nodes = self.nodes.lock().unwrap();
        if !matches!(nodes.get(dir), Some(Node::Dir)) {
            return CommandOutput {
                stdout: String::new(),
                exit_status: 1,
            };
        }

        let prefix = format!("{}/", dir);
        let mut stdout = String::new();
        for (path, node) in nodes.iter() {
            if let (Some(rel), Node::File(bytes)) = (path.strip_prefix(&prefix), node) {
                let hash = ChecksumKind::Md5.digest_reader(&bytes[..]).unwrap();
                stdout.push_str(&md5sum_line(&hash, rel));
            }
        }
        CommandOutput {
            stdout,
            exit_status: 0,
        }
    }
}

fn missing(path: &str) -> SyncError {
    SyncError::Remote {
        path: path.to_string(),
        message: "No such file".to_string(),
    }
}

/// One line of `md5sum` output, escaped the way GNU coreutils does it.
fn md5sum_line(hash: &str, rel: &str) -> String {
    if rel.contains(|c| matches!(c, '\\' | '\n' | '\r')) {
        let escaped = rel
            .replace('\\', "\\\\")
            .replace('\n', "\\n")
            .replace('\r', "\\r");
        format!("\\{}  ./{}\n", hash, escaped)
    } else {
        format!("{}  ./{}\n", hash, rel)
    }
}

/// Extract `<dir>` from `cd <dir> && ...`, undoing simple single quotes.
fn cd_target(command: &str) -> String {
    let rest = command.strip_prefix("cd ").unwrap_or(command);
    let dir = rest.split(" && ").next().unwrap_or("");
    dir.trim_matches('\'').to_string()
}

#[async_trait]
impl RemoteFs for MemoryRemote {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.record(Op::Exec(command.to_string()));
        match self.exec_mode {
            ExecMode::Hash => Ok(self.hash_listing(&cd_target(command))),
            ExecMode::ExitFailure => Ok(CommandOutput {
                stdout: String::new(),
                exit_status: 127,
            }),
            ExecMode::TransportDown => Err(SyncError::Transport("connection reset".into())),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteStat>> {
        self.record(Op::Stat(path.to_string()));
        Ok(self.node(path).map(|node| match node {
            Node::Dir => RemoteStat {
                is_dir: true,
                size: 0,
            },
            Node::File(bytes) => RemoteStat {
                is_dir: false,
                size: bytes.len() as u64,
            },
        }))
    }

    async fn list_children(&self, path: &str) -> Result<Vec<String>> {
        self.record(Op::List(path.to_string()));
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) => Ok(Self::children(&nodes, path)),
            Some(Node::File(_)) => Err(SyncError::Remote {
                path: path.to_string(),
                message: "Not a directory".into(),
            }),
            None => Err(missing(path)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.record(Op::Mkdir(path.to_string()));
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path) || !Self::parent_is_dir(&nodes, path) {
            return Err(SyncError::Remote {
                path: path.to_string(),
                message: "Failure".into(),
            });
        }
        nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        self.record(Op::RemoveFile(path.to_string()));
        if self.fail_removes.contains(path) {
            return Err(SyncError::Remote {
                path: path.to_string(),
                message: "Permission denied".into(),
            });
        }
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(SyncError::Remote {
                path: path.to_string(),
                message: "Failure".into(),
            }),
            None => Err(missing(path)),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.record(Op::RemoveDir(path.to_string()));
        if self.fail_removes.contains(path) {
            return Err(SyncError::Remote {
                path: path.to_string(),
                message: "Permission denied".into(),
            });
        }
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::Dir) if Self::children(&nodes, path).is_empty() => {
                nodes.remove(path);
                Ok(())
            }
            Some(_) => Err(SyncError::Remote {
                path: path.to_string(),
                message: "Failure".into(),
            }),
            None => Err(missing(path)),
        }
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<u64> {
        self.record(Op::Upload(remote.to_string()));
        let nth = {
            let mut seen = self.uploads_seen.lock().unwrap();
            *seen += 1;
            *seen
        };
        if self.drop_connection_at_upload == Some(nth) {
            return Err(SyncError::Transport("connection dropped".into()));
        }
        if self.fail_uploads.contains(remote) {
            return Err(SyncError::Remote {
                path: remote.to_string(),
                message: "Quota exceeded".into(),
            });
        }
        let bytes = std::fs::read(local)?;
        let mut nodes = self.nodes.lock().unwrap();
        if !Self::parent_is_dir(&nodes, remote) || matches!(nodes.get(remote), Some(Node::Dir)) {
            return Err(missing(remote));
        }
        let len = bytes.len() as u64;
        nodes.insert(remote.to_string(), Node::File(bytes));
        Ok(len)
    }

    fn has_cheap_stat(&self) -> bool {
        self.cheap_stat
    }
}
