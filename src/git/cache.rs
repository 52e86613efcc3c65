use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info};
use thiserror::Error;

use crate::{
    flock::{FileLock, LockError},
    git::{backend::GitBackend, command::Git},
    gitattr::GitAttrChecker,
    metadata::MetadataCache,
    model::package::ProjectId,
};

const CHECKOUTS_DIR: &str = "checkouts";

/// On-disk home of every dependency checkout, one directory per project.
pub struct GitRepoCache {
    location: PathBuf,
    checkouts: PathBuf,
    git: Git,
    metadata_cache: Arc<MetadataCache>,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(#[from] LockError),
    #[error("Project id `{0}` cannot name a checkout directory")]
    InvalidProjectId(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl GitRepoCache {
    pub fn new(
        location: PathBuf,
        git: Git,
        metadata_cache: Arc<MetadataCache>,
    ) -> Result<GitRepoCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.display().to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock = Self::acquire_lock(&location)?;

        let checkouts = location.join(CHECKOUTS_DIR);
        Ok(GitRepoCache {
            location,
            checkouts,
            git,
            metadata_cache,
            _lock: lock,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.location.exists() {
            info!(
                "Clearing recipefetch repository cache {}.",
                self.location.display()
            );
            std::fs::remove_dir_all(&self.location)?;
        }
        self.metadata_cache.clear();
        Ok(())
    }

    /// `<cache>/checkouts/<project_id>`.
    pub fn checkout_path(&self, project_id: &ProjectId) -> Result<PathBuf, CacheError> {
        if !project_id.is_valid() {
            return Err(CacheError::InvalidProjectId(project_id.to_string()));
        }
        Ok(self.checkouts.join(project_id.as_str()))
    }

    pub fn git_backend(&self, project_id: &ProjectId, repo_url: &str) -> Result<GitBackend, CacheError> {
        let path = self.checkout_path(project_id)?;
        std::fs::create_dir_all(&path)?;
        debug!("Using {} for {}", path.display(), project_id);

        Ok(GitBackend::new(
            path.clone(),
            repo_url,
            self.git.clone(),
            self.metadata_cache.clone(),
            Arc::new(GitAttrChecker::new(path)),
        ))
    }

    fn acquire_lock(location: &Path) -> Result<FileLock, CacheError> {
        let location = location.join(".lock");
        debug!(
            "Acquiring a lock on the cache location: {}",
            location.display()
        );
        let lock = FileLock::new(&location)?;
        info!("Acquired a lock on the cache location");
        Ok(lock)
    }
}
