mod git;

use std::sync::Arc;

use crate::{backend::Backend, model::package::ProjectId};

pub use crate::git::cache::{CacheError, GitRepoCache};

/// Hands out one [`Backend`] per dependency project.
pub trait RepositoryCache {
    /// Backend bound to the exclusive local directory of `project_id`.
    fn backend(&self, project_id: &ProjectId, repo_url: &str)
        -> Result<Arc<dyn Backend>, CacheError>;
}
