use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};

use crate::{
    backend::{Backend, BackendError, CommitId, CommitMetadata},
    git::command::{Git, GitOutcome, Signal},
    metadata::MetadataCache,
    model::package::{PackageSpec, INFRA_REPO_CONFIG_RELPATH},
    roll::{is_roll_candidate, AttrOracle},
};

const SHOW_FORMAT: &str = "--format=%aE%n%ct%n%B";

/// [`Backend`] driving the git executable against one local checkout.
pub struct GitBackend {
    local_path: PathBuf,
    repo_url: String,
    git: Git,
    metadata_cache: Arc<MetadataCache>,
    oracle: Arc<dyn AttrOracle>,
}

impl GitBackend {
    pub fn new(
        local_path: impl Into<PathBuf>,
        repo_url: impl Into<String>,
        git: Git,
        metadata_cache: Arc<MetadataCache>,
        oracle: Arc<dyn AttrOracle>,
    ) -> Self {
        GitBackend {
            local_path: local_path.into(),
            repo_url: repo_url.into(),
            git,
            metadata_cache,
            oracle,
        }
    }

    fn dir(&self) -> String {
        self.local_path.to_string_lossy().to_string()
    }

    fn is_repository(&self) -> bool {
        self.local_path.join(".git").is_dir()
    }

    fn ensure_repository(&self) -> Result<(), BackendError> {
        if !self.is_repository() {
            info!("Initializing repository at {}", self.local_path.display());
            self.git.output(&["init", &self.dir()])?;
        }
        Ok(())
    }

    fn fetch(&self, revision: &str) -> Result<(), BackendError> {
        info!("Fetching {} from {}", revision, self.repo_url);
        self.git
            .output(&["-C", &self.dir(), "fetch", &self.repo_url, revision])?;
        Ok(())
    }

    fn ls_remote(&self, revision: &str) -> Result<CommitId, BackendError> {
        let output = self
            .git
            .output(&["-C", &self.dir(), "ls-remote", &self.repo_url, revision])?;

        // A peeled annotated tag (`ref^{}`) replaces the tag object itself.
        let mut refs: BTreeMap<&str, &str> = BTreeMap::new();
        for line in output.lines() {
            let mut fields = line.split_whitespace();
            let Some(hash) = fields.next() else {
                continue;
            };
            let name = fields.next().unwrap_or_default();
            match name.strip_suffix("^{}") {
                Some(peeled) => {
                    refs.insert(peeled, hash);
                }
                None => {
                    refs.entry(name).or_insert(hash);
                }
            }
        }

        let candidates: BTreeSet<&str> = refs.into_values().collect();
        let mut candidates = candidates.into_iter();
        match (candidates.next(), candidates.next()) {
            (None, _) => Err(BackendError::RevisionNotFound {
                repo_url: self.repo_url.clone(),
                revision: revision.to_string(),
            }),
            (Some(hash), None) => Ok(CommitId::new(hash)),
            (Some(first), Some(second)) => Err(BackendError::AmbiguousRevision {
                repo_url: self.repo_url.clone(),
                revision: revision.to_string(),
                candidates: [first, second]
                    .into_iter()
                    .chain(candidates)
                    .map(str::to_string)
                    .collect(),
            }),
        }
    }

    /// Metadata of a resolved commit, served from the cache when possible.
    fn metadata_for(&self, commit: &CommitId) -> Result<CommitMetadata, BackendError> {
        if let Some(metadata) = self.metadata_cache.metadata(&self.local_path, commit) {
            debug!("Metadata for {} found in cache", commit);
            return Ok(metadata);
        }

        let dir = self.dir();
        let show = match self.git.run(
            &["-C", &dir, "show", "-s", SHOW_FORMAT, commit.as_str()],
            &[Signal::MissingObject],
        )? {
            GitOutcome::Success(stdout) => stdout,
            GitOutcome::MissingObject(stderr) => {
                return Err(BackendError::MissingObject {
                    commit: commit.clone(),
                    stderr,
                })
            }
            GitOutcome::Dirty => {
                return Err(BackendError::MalformedOutput {
                    command: "show",
                    output: String::new(),
                })
            }
        };
        let (author_email, commit_timestamp, message_lines) = parse_show(&show)?;

        let spec = self.read_spec(commit)?;
        let changed_paths = self.changed_paths(commit)?;
        let roll_candidate = is_roll_candidate(
            &spec.recipes_path,
            &changed_paths,
            commit,
            self.oracle.as_ref(),
        )
        .map_err(|source| BackendError::AttrCheck {
            commit: commit.clone(),
            source,
        })?;

        let metadata = CommitMetadata {
            revision: commit.clone(),
            author_email,
            commit_timestamp,
            message_lines,
            spec,
            changed_paths,
            roll_candidate,
        };
        self.metadata_cache
            .insert_metadata(&self.local_path, metadata.clone());
        Ok(metadata)
    }

    fn read_spec(&self, commit: &CommitId) -> Result<PackageSpec, BackendError> {
        let object = format!("{}:{}", commit, INFRA_REPO_CONFIG_RELPATH);
        let contents = self
            .git
            .output(&["-C", &self.dir(), "cat-file", "blob", &object])
            .map_err(|source| BackendError::ConfigUnavailable {
                commit: commit.clone(),
                source,
            })?;
        PackageSpec::from_json_str(&contents).map_err(|source| BackendError::Config {
            commit: commit.clone(),
            source,
        })
    }

    fn changed_paths(&self, commit: &CommitId) -> Result<BTreeSet<String>, BackendError> {
        let range = format!("{}^!", commit);
        let output = self.git.output(&[
            "-C",
            &self.dir(),
            "diff-tree",
            "-r",
            "--no-commit-id",
            "--name-only",
            &range,
        ])?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Backend for GitBackend {
    fn local_path(&self) -> &Path {
        &self.local_path
    }

    fn repo_url(&self) -> &str {
        &self.repo_url
    }

    fn resolve(&self, revision: &str) -> Result<CommitId, BackendError> {
        if let Some(commit) = self.metadata_cache.revision(&self.local_path, revision) {
            debug!("Revision {} already resolved to {}", revision, commit);
            return Ok(commit);
        }
        let commit = if CommitId::is_full_hash(revision) {
            CommitId::new(revision.to_ascii_lowercase())
        } else {
            self.ls_remote(revision)?
        };
        debug!("Resolved {} {} to {}", self.repo_url, revision, commit);
        Ok(self
            .metadata_cache
            .insert_revision(&self.local_path, revision, commit))
    }

    fn checkout(&self, revision: &str) -> Result<CommitId, BackendError> {
        self.ensure_repository()?;
        let commit = self.resolve(revision)?;

        // Metadata is only gathered for the log; a missing commit just needs fetching.
        match self.metadata_for(&commit) {
            Ok(metadata) => debug!(
                "Checking out {} ({} by {}, roll candidate: {})",
                commit,
                metadata.message_lines.first().map_or("", String::as_str),
                metadata.author_email,
                metadata.roll_candidate
            ),
            Err(BackendError::MissingObject { .. }) => {
                warn!(
                    "Commit {} is not available locally, fetching {}",
                    commit, revision
                );
                self.fetch(revision)?;
            }
            Err(error) => return Err(error),
        }

        let dir = self.dir();
        match self.git.run(
            &["-C", &dir, "diff", "--quiet", commit.as_str()],
            &[Signal::Dirty, Signal::MissingObject],
        )? {
            GitOutcome::Success(_) => {
                debug!("{} is already at {}", self.local_path.display(), commit);
            }
            GitOutcome::Dirty | GitOutcome::MissingObject(_) => {
                info!("Resetting {} to {}", self.local_path.display(), commit);
                self.git
                    .output(&["-C", &dir, "reset", "-q", "--hard", commit.as_str()])?;
            }
        }
        Ok(commit)
    }

    fn commit_metadata(&self, revision: &str) -> Result<CommitMetadata, BackendError> {
        self.ensure_repository()?;
        let commit = self.resolve(revision)?;
        match self.metadata_for(&commit) {
            Err(BackendError::MissingObject { .. }) => {
                self.fetch(revision)?;
                self.metadata_for(&commit)
            }
            result => result,
        }
    }
}

fn parse_show(output: &str) -> Result<(String, i64, Vec<String>), BackendError> {
    let malformed = || BackendError::MalformedOutput {
        command: "show",
        output: output.to_string(),
    };
    let mut lines = output.lines();
    let author_email = lines.next().ok_or_else(malformed)?.trim().to_string();
    let commit_timestamp = lines
        .next()
        .and_then(|line| line.trim().parse::<i64>().ok())
        .ok_or_else(malformed)?;
    let mut message_lines: Vec<String> = lines.map(str::to_string).collect();
    while message_lines.last().is_some_and(|line| line.trim().is_empty()) {
        message_lines.pop();
    }
    Ok((author_email, commit_timestamp, message_lines))
}
