use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::backend::{CommitId, CommitMetadata};

/// Memoizes VCS lookups for one resolution run.
///
/// Keys carry the local repository path, so one cache is shared by every
/// backend of a run. Entries are never evicted; commit metadata is
/// immutable for a fixed commit and a resolved revision stays final.
#[derive(Debug, Default)]
pub struct MetadataCache {
    metadata: DashMap<(PathBuf, CommitId), CommitMetadata>,
    revisions: DashMap<(PathBuf, String), CommitId>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self, path: &Path, commit: &CommitId) -> Option<CommitMetadata> {
        self.metadata
            .get(&(path.to_path_buf(), commit.clone()))
            .map(|entry| entry.value().clone())
    }

    pub fn insert_metadata(&self, path: &Path, metadata: CommitMetadata) {
        self.metadata
            .entry((path.to_path_buf(), metadata.revision.clone()))
            .or_insert(metadata);
    }

    pub fn revision(&self, path: &Path, revision: &str) -> Option<CommitId> {
        self.revisions
            .get(&(path.to_path_buf(), revision.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Records a resolution; the first recorded commit wins.
    pub fn insert_revision(&self, path: &Path, revision: &str, commit: CommitId) -> CommitId {
        self.revisions
            .entry((path.to_path_buf(), revision.to_string()))
            .or_insert(commit)
            .value()
            .clone()
    }

    pub fn clear(&self) {
        self.metadata.clear();
        self.revisions.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.revisions.is_empty()
    }
}
