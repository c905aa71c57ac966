//! Local tree scanning and content hashing.

use crate::error::{Result, SyncError};
use crate::path::relative_key;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read buffer for streaming digests
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Digest used on both sides of the comparison. The remote side must have
/// the matching command-line tool installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    /// 128-bit MD5, remote tool `md5sum`
    #[default]
    Md5,
    /// BLAKE3, remote tool `b3sum`
    Blake3,
}

impl ChecksumKind {
    pub fn remote_tool(&self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5sum",
            ChecksumKind::Blake3 => "b3sum",
        }
    }

    /// Stream `reader` through the digest and return lowercase hex.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        match self {
            ChecksumKind::Md5 => {
                let mut ctx = md5::Context::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    ctx.consume(&buf[..n]);
                }
                Ok(format!("{:x}", ctx.compute()))
            }
            ChecksumKind::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize().as_bytes()))
            }
        }
    }

    pub fn digest_file(&self, path: &Path) -> io::Result<String> {
        self.digest_reader(File::open(path)?)
    }
}

/// A regular file found under the local root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileEntry {
    /// Forward-slash path relative to the scan root, no leading `./`
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// Lowercase hex digest of the full file contents
    pub content_hash: String,
}

pub struct LocalTreeScanner {
    root: PathBuf,
    checksum: ChecksumKind,
}

impl LocalTreeScanner {
    pub fn new(root: impl Into<PathBuf>, checksum: ChecksumKind) -> Self {
        Self {
            root: root.into(),
            checksum,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a scan. Fails up front if the root is missing; per-file errors
    /// surface as items of the returned iterator.
    pub fn scan(&self) -> Result<LocalEntries> {
        if !self.root.is_dir() {
            return Err(SyncError::NotFound {
                path: self.root.clone(),
            });
        }

        // A build tree is deployed as is: no ignore files, hidden files kept.
        let walk = ignore::WalkBuilder::new(&self.root)
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        Ok(LocalEntries {
            walk,
            root: self.root.clone(),
            checksum: self.checksum,
        })
    }
}

/// Lazy, single-pass sequence of scanned files.
pub struct LocalEntries {
    walk: ignore::Walk,
    root: PathBuf,
    checksum: ChecksumKind,
}

impl LocalEntries {
    fn entry_for(&self, path: &Path) -> Result<LocalFileEntry> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            SyncError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is outside {}", path.display(), self.root.display()),
            ))
        })?;

        Ok(LocalFileEntry {
            relative_path: relative_key(relative),
            absolute_path: path.to_path_buf(),
            content_hash: self.checksum.digest_file(path)?,
        })
    }
}

impl Iterator for LocalEntries {
    type Item = Result<LocalFileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walk.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(SyncError::Io(io::Error::new(io::ErrorKind::Other, e)))),
            };

            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_file() {
                return Some(self.entry_for(entry.path()));
            }
            // Links are not walked into, but a link to a regular file is
            // deployed with its target's contents.
            if file_type.is_symlink() {
                match std::fs::metadata(entry.path()) {
                    Ok(meta) if meta.is_file() => return Some(self.entry_for(entry.path())),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Skipping dangling link {}: {}", entry.path().display(), e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scan_all(root: &Path, kind: ChecksumKind) -> Vec<LocalFileEntry> {
        LocalTreeScanner::new(root, kind)
            .scan()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("out");
        let err = LocalTreeScanner::new(&missing, ChecksumKind::Md5)
            .scan()
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::NotFound { path } if path == missing));
    }

    #[test]
    fn test_scan_recursive_relative_paths() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html"), "<html>").unwrap();
        fs::create_dir_all(temp.path().join("assets/js")).unwrap();
        fs::write(temp.path().join("assets/js/app.js"), "console.log(1)").unwrap();
        fs::write(temp.path().join("my file.txt"), "spaces").unwrap();
        fs::write(temp.path().join(".htaccess"), "hidden").unwrap();
        fs::create_dir(temp.path().join("empty")).unwrap();

        let paths: Vec<String> = scan_all(temp.path(), ChecksumKind::Md5)
            .into_iter()
            .map(|e| e.relative_path)
            .collect();

        assert_eq!(
            paths,
            vec![".htaccess", "assets/js/app.js", "index.html", "my file.txt"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_is_scanned() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let public = temp.path().join("public");
        fs::create_dir_all(&out).unwrap();
        fs::create_dir_all(public.join("fonts")).unwrap();
        fs::write(out.join("index.html"), "<html>").unwrap();
        fs::write(public.join("favicon.ico"), "icon").unwrap();
        fs::write(public.join("fonts/a.woff"), "font").unwrap();
        std::os::unix::fs::symlink(public.join("favicon.ico"), out.join("favicon.ico")).unwrap();
        std::os::unix::fs::symlink(public.join("fonts"), out.join("fonts")).unwrap();
        std::os::unix::fs::symlink(public.join("gone"), out.join("dangling")).unwrap();

        let entries = scan_all(&out, ChecksumKind::Md5);
        let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["favicon.ico", "index.html"]);
        assert_eq!(entries[0].content_hash, format!("{:x}", md5::compute(b"icon")));
    }

    #[test]
    fn test_md5_matches_md5sum_output() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("hello.txt"), "hello\n").unwrap();

        let entries = scan_all(temp.path(), ChecksumKind::Md5);
        assert_eq!(entries[0].content_hash, "b1946ac92492d2347c6235b4d2611184");
        assert_eq!(entries[0].absolute_path, temp.path().join("hello.txt"));
    }

    #[test]
    fn test_digest_spans_multiple_chunks() {
        let data = vec![7u8; HASH_CHUNK_SIZE * 2 + 17];
        let streamed = ChecksumKind::Blake3.digest_reader(&data[..]).unwrap();
        assert_eq!(streamed, blake3::hash(&data).to_hex().to_string());

        let streamed = ChecksumKind::Md5.digest_reader(&data[..]).unwrap();
        assert_eq!(streamed, format!("{:x}", md5::compute(&data)));
    }

    #[test]
    fn test_remote_tool_names() {
        assert_eq!(ChecksumKind::Md5.remote_tool(), "md5sum");
        assert_eq!(ChecksumKind::Blake3.remote_tool(), "b3sum");
    }
}
