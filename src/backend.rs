use std::{collections::BTreeSet, fmt::Display, path::Path};

use serde::Serialize;
use thiserror::Error;

use crate::{
    git::command::GitError,
    model::{package::PackageSpec, ParseError},
    roll::AttrError,
};

/// Content-stable identifier of a commit (a full hash).
#[derive(Clone, Hash, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(s: impl Into<String>) -> Self {
        CommitId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `revision` is already a full hex object id and needs no lookup.
    pub fn is_full_hash(revision: &str) -> bool {
        revision.len() == 40 && revision.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitMetadata {
    pub revision: CommitId,
    pub author_email: String,
    pub commit_timestamp: i64,
    pub message_lines: Vec<String>,
    pub spec: PackageSpec,
    pub changed_paths: BTreeSet<String>,
    pub roll_candidate: bool,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),
    #[error("Revision {revision} was not found in {repo_url}")]
    RevisionNotFound { repo_url: String, revision: String },
    #[error("Revision {revision} is ambiguous in {repo_url}: {candidates:?}")]
    AmbiguousRevision {
        repo_url: String,
        revision: String,
        candidates: Vec<String>,
    },
    #[error("Commit {commit} is missing from the local repository: {stderr}")]
    MissingObject { commit: CommitId, stderr: String },
    #[error("Could not read the package spec at {commit}: {source}")]
    ConfigUnavailable {
        commit: CommitId,
        #[source]
        source: GitError,
    },
    #[error("Could not parse the package spec at {commit}: {source}")]
    Config {
        commit: CommitId,
        #[source]
        source: ParseError,
    },
    #[error("Unexpected output from `{command}`: {output:?}")]
    MalformedOutput {
        command: &'static str,
        output: String,
    },
    #[error("Checking file attributes at {commit} failed: {source}")]
    AttrCheck {
        commit: CommitId,
        #[source]
        source: AttrError,
    },
}

/// Version-control capability bound to one local directory.
pub trait Backend: Send + Sync {
    fn local_path(&self) -> &Path;

    fn repo_url(&self) -> &str;

    /// Resolves `revision` against the remote to a commit id.
    fn resolve(&self, revision: &str) -> Result<CommitId, BackendError>;

    /// Makes the local work tree equal to the tree at `revision`, returning
    /// the commit it was reset to. Idempotent.
    fn checkout(&self, revision: &str) -> Result<CommitId, BackendError>;

    /// Metadata of the commit `revision` resolves to, read without checking it out.
    fn commit_metadata(&self, revision: &str) -> Result<CommitMetadata, BackendError>;
}
