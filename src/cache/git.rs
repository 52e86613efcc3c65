use std::sync::Arc;

use crate::{
    backend::Backend,
    git::cache::{CacheError, GitRepoCache},
    model::package::ProjectId,
};

use super::RepositoryCache;

impl RepositoryCache for GitRepoCache {
    fn backend(
        &self,
        project_id: &ProjectId,
        repo_url: &str,
    ) -> Result<Arc<dyn Backend>, CacheError> {
        Ok(Arc::new(self.git_backend(project_id, repo_url)?))
    }
}
