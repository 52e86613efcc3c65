use std::{env, path::PathBuf, sync::Arc, time::Duration};

use anyhow::anyhow;
use home::home_dir;

use crate::{
    cache::GitRepoCache,
    cancel::Cancellation,
    git::command::{Git, ProcessGitRunner},
    metadata::MetadataCache,
    RecipeFetch,
};

#[derive(Default)]
pub struct RecipeFetchBuilder {
    root: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    git_binary: Option<PathBuf>,
    timeout: Option<Duration>,
    cancellation: Option<Cancellation>,
}

impl RecipeFetchBuilder {
    /// Repository holding the root package.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Location of the checkout cache directory.
    ///
    /// Defaults to `$HOME/.recipefetch/cache`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Defaults to `git` from `PATH`.
    pub fn git_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_binary = Some(path.into());
        self
    }

    /// Overall deadline for every VCS operation of this instance.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Token that aborts running VCS operations when cancelled.
    pub fn cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn try_build(self) -> anyhow::Result<RecipeFetch> {
        let Self {
            root,
            cache_directory_path,
            git_binary,
            timeout,
            cancellation,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let cache_directory = root.join(match cache_directory_path {
            Some(path) => path,
            None => default_cache_directory()?,
        });

        let cancellation = cancellation.unwrap_or_default();
        let cancellation = match timeout {
            Some(timeout) => cancellation.expiring_after(timeout),
            None => cancellation,
        };
        let runner = ProcessGitRunner::new(
            git_binary.unwrap_or_else(|| PathBuf::from("git")),
            cancellation,
        );

        let cache = GitRepoCache::new(
            cache_directory,
            Git::new(Arc::new(runner)),
            Arc::new(MetadataCache::new()),
        )?;

        Ok(RecipeFetch { cache, root })
    }
}

fn default_cache_directory() -> anyhow::Result<PathBuf> {
    let mut cache_directory = home_dir()
        .ok_or_else(|| anyhow!("Could not find home dir. Please define $HOME env variable."))?;
    cache_directory.push(".recipefetch/cache");
    Ok(cache_directory)
}
