//! Remote checksum listing.

use crate::error::Result;
use crate::path::{normalize_relative, shell_quote};
use crate::remote::RemoteFs;
use crate::scan::ChecksumKind;
use std::collections::HashMap;

/// Relative path to lowercase hex digest, as reported by the remote host
pub type RemoteChecksums = HashMap<String, String>;

pub struct RemoteChecksumFetcher {
    checksum: ChecksumKind,
}

impl RemoteChecksumFetcher {
    pub fn new(checksum: ChecksumKind) -> Self {
        Self { checksum }
    }

    /// Shell command that hashes every regular file under `remote_dir`.
    pub fn command(&self, remote_dir: &str) -> String {
        format!(
            "cd {} && find . -type f -exec {} {{}} +",
            shell_quote(remote_dir),
            self.checksum.remote_tool()
        )
    }

    /// Hash the whole remote tree with a single command.
    ///
    /// A failed or silent command yields an empty map: the directory is
    /// missing or empty, and every local file will be uploaded. Only a
    /// transport failure is returned as an error.
    pub async fn fetch<R: RemoteFs + ?Sized>(
        &self,
        remote: &R,
        remote_dir: &str,
    ) -> Result<RemoteChecksums> {
        let output = remote.exec(&self.command(remote_dir)).await?;

        if !output.success() {
            tracing::warn!(
                "Could not fetch remote checksums for {} (exit status {}); treating remote as empty",
                remote_dir,
                output.exit_status
            );
            return Ok(RemoteChecksums::new());
        }

        let checksums = parse_checksum_listing(&output.stdout);
        if checksums.is_empty() {
            tracing::warn!(
                "Remote checksum listing for {} is empty; uploading everything",
                remote_dir
            );
        }

        tracing::info!("Found {} existing files on remote", checksums.len());
        Ok(checksums)
    }
}

/// Parse `<hash>  ./<path>` lines.
///
/// The first whitespace-separated token is the hash; the remaining tokens,
/// rejoined with single spaces, form the path. Lines without a path are
/// skipped.
///
/// `md5sum` and `b3sum` escape names containing a backslash, newline or
/// carriage return: the line starts with `\` and the name uses `\\`, `\n`
/// and `\r`. Such lines are unescaped so the key matches the local name.
pub fn parse_checksum_listing(output: &str) -> RemoteChecksums {
    let mut checksums = RemoteChecksums::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let Some(hash) = tokens.next() else {
            continue;
        };
        let path = tokens.collect::<Vec<_>>().join(" ");
        if path.is_empty() {
            continue;
        }

        let (hash, path) = match hash.strip_prefix('\\') {
            Some(hash) => (hash, unescape_name(&path)),
            None => (hash, path),
        };
        checksums.insert(normalize_relative(&path), hash.to_ascii_lowercase());
    }
    checksums
}

fn unescape_name(escaped: &str) -> String {
    let mut name = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            name.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => name.push('\n'),
            Some('r') => name.push('\r'),
            Some('\\') => name.push('\\'),
            Some(other) => {
                name.push('\\');
                name.push(other);
            }
            None => name.push('\\'),
        }
    }
    name
}
