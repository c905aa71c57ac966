//! Upload planning.

use super::fetch::RemoteChecksums;
use crate::path::remote_join;
use crate::scan::LocalFileEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub entry: LocalFileEntry,
    pub remote_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<PlannedUpload>,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }
}

/// Select the local files whose content differs from (or is missing on) the
/// remote side.
///
/// Remote-only paths are ignored: a deploy only adds and overwrites.
pub fn build_plan<I>(entries: I, remote: &RemoteChecksums, remote_root: &str) -> SyncPlan
where
    I: IntoIterator<Item = LocalFileEntry>,
{
    let mut plan = SyncPlan::default();

    for entry in entries {
        match remote.get(&entry.relative_path) {
            Some(hash) if *hash == entry.content_hash => {
                plan.unchanged += 1;
            }
            existing => {
                tracing::debug!(
                    "{} {}",
                    if existing.is_some() { "changed" } else { "new" },
                    entry.relative_path
                );
                let remote_path = remote_join(remote_root, &entry.relative_path);
                plan.uploads.push(PlannedUpload { entry, remote_path });
            }
        }
    }

    plan
}
