use std::path::PathBuf;

use crate::{
    backend::CommitMetadata,
    cache::GitRepoCache,
    cli::command_handlers::{
        do_clear_cache, do_fetch, do_find_recipe, do_list, do_metadata, Listing,
    },
    model::package::ProjectId,
    universe::Universe,
};

mod builder;

pub use builder::RecipeFetchBuilder;

pub struct RecipeFetch {
    cache: GitRepoCache,
    root: PathBuf,
}

impl RecipeFetch {
    pub fn builder() -> RecipeFetchBuilder {
        RecipeFetchBuilder::default()
    }

    /// Resolves the universe of the root package, checking out every dependency
    pub fn fetch(&self) -> anyhow::Result<Universe> {
        do_fetch(&self.cache, &self.root)
    }

    /// Commit metadata of a dependency, at `revision` or the pinned one
    pub fn metadata(
        &self,
        project: &ProjectId,
        revision: Option<&str>,
    ) -> anyhow::Result<CommitMetadata> {
        do_metadata(&self.cache, &self.root, project, revision)
    }

    /// Modules and recipes visible from `package`, the root package by default
    pub fn list(&self, package: Option<&ProjectId>) -> anyhow::Result<Listing> {
        do_list(&self.cache, &self.root, package)
    }

    pub fn find_recipe(&self, name: &str, package: Option<&ProjectId>) -> anyhow::Result<PathBuf> {
        do_find_recipe(&self.cache, &self.root, name, package)
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.cache)
    }
}
