use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use log::{debug, info};
use serde::Serialize;

use crate::{
    backend::{Backend, CommitMetadata},
    cache::GitRepoCache,
    fetch,
    model::package::{PackageSpec, ProjectId, INFRA_REPO_CONFIG_RELPATH},
    universe::{Universe, UniverseView},
};

/// Modules and recipes visible from one package.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Listing {
    pub package: ProjectId,
    pub modules: Vec<ListedEntry>,
    pub recipes: Vec<ListedEntry>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ListedEntry {
    pub package: ProjectId,
    pub name: String,
    pub path: PathBuf,
}

/// Handler to fetch command
/// Resolves the universe of the root package and checks every dependency out
pub fn do_fetch(cache: &GitRepoCache, root: &Path) -> anyhow::Result<Universe> {
    let spec = load_root_spec(root)?;
    let universe = fetch::resolve(&spec, root, cache)?;

    for package in universe.packages() {
        match &package.commit {
            Some(commit) => info!(
                "{} at {} in {}",
                package.project_id(),
                commit,
                package.local_path.display()
            ),
            None => debug!("{} is the root package", package.project_id()),
        }
    }
    Ok(universe)
}

/// Handler to metadata command
/// Reads commit metadata of a dependency of the root package, at its pinned
/// revision unless `revision` is given
pub fn do_metadata(
    cache: &GitRepoCache,
    root: &Path,
    project: &ProjectId,
    revision: Option<&str>,
) -> anyhow::Result<CommitMetadata> {
    let spec = load_root_spec(root)?;
    let dependency = spec
        .dependencies
        .get(project)
        .ok_or_else(|| anyhow!("{} is not a dependency of {}", project, spec.project_id))?;
    let revision = revision.unwrap_or(&dependency.revision);

    let backend = cache.git_backend(project, &dependency.url)?;
    let metadata = backend.commit_metadata(revision)?;
    info!(
        "{} at {} is{} a roll candidate",
        project,
        metadata.revision,
        if metadata.roll_candidate { "" } else { " not" }
    );
    Ok(metadata)
}

/// Handler to list command
pub fn do_list(
    cache: &GitRepoCache,
    root: &Path,
    package: Option<&ProjectId>,
) -> anyhow::Result<Listing> {
    let universe = do_fetch(cache, root)?;
    let view = scoped_view(&universe, package)?;

    Ok(Listing {
        package: view.package().project_id().clone(),
        modules: view
            .loop_over_recipe_modules()
            .map(|module| ListedEntry {
                package: module.package.clone(),
                name: module.name.to_string(),
                path: module.path.to_path_buf(),
            })
            .collect(),
        recipes: view
            .loop_over_recipes()
            .map(|recipe| ListedEntry {
                package: recipe.package.clone(),
                name: recipe.name.to_string(),
                path: recipe.path.to_path_buf(),
            })
            .collect(),
    })
}

/// Handler to find-recipe command
pub fn do_find_recipe(
    cache: &GitRepoCache,
    root: &Path,
    name: &str,
    package: Option<&ProjectId>,
) -> anyhow::Result<PathBuf> {
    let universe = do_fetch(cache, root)?;
    let view = scoped_view(&universe, package)?;
    Ok(view.find_recipe(name)?.to_path_buf())
}

pub fn do_clear_cache(cache: &GitRepoCache) -> anyhow::Result<()> {
    cache.clear()?;
    Ok(())
}

fn scoped_view<'a>(
    universe: &'a Universe,
    package: Option<&ProjectId>,
) -> anyhow::Result<UniverseView<'a>> {
    match package {
        Some(package) => Ok(universe.view(package)?),
        None => Ok(universe.root_view()),
    }
}

fn load_root_spec(root: &Path) -> anyhow::Result<PackageSpec> {
    PackageSpec::from_repo_root(root).with_context(|| {
        format!(
            "Could not load the root package spec from {}",
            root.join(INFRA_REPO_CONFIG_RELPATH).display()
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        git::command::{Git, GitError, GitRunner, RawOutput},
        metadata::MetadataCache,
    };
    use pretty_assertions::assert_eq;

    struct NoGit;

    impl GitRunner for NoGit {
        fn execute(&self, args: &[String]) -> Result<RawOutput, GitError> {
            panic!("unexpected git call {:?}", args)
        }
    }

    fn touch(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    /// A root package without dependencies never reaches git.
    fn setup() -> (TempDir, GitRepoCache, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("repo");
        touch(
            &root,
            INFRA_REPO_CONFIG_RELPATH,
            r#"{"api_version": 2, "project_id": "solo", "recipes_path": "recipes"}"#,
        );
        touch(&root, "recipes/recipe_modules/tool/__init__.py", "");
        touch(&root, "recipes/recipes/hello.py", "");
        let cache = GitRepoCache::new(
            dir.path().join("cache"),
            Git::new(Arc::new(NoGit)),
            Arc::new(MetadataCache::new()),
        )
        .unwrap();
        (dir, cache, root)
    }

    #[test]
    fn lists_root_package() {
        let (_dir, cache, root) = setup();

        let listing = do_list(&cache, &root, None).unwrap();
        assert_eq!(listing.package, ProjectId::new("solo"));
        assert_eq!(
            listing.modules,
            vec![ListedEntry {
                package: ProjectId::new("solo"),
                name: "tool".to_string(),
                path: root.join("recipes/recipe_modules/tool"),
            }]
        );
        assert_eq!(
            listing
                .recipes
                .iter()
                .map(|r| r.name.as_str())
                .collect::<Vec<_>>(),
            vec!["hello"]
        );
    }

    #[test]
    fn finds_recipe() {
        let (_dir, cache, root) = setup();

        assert_eq!(
            do_find_recipe(&cache, &root, "hello", None).unwrap(),
            root.join("recipes/recipes/hello.py")
        );
        assert!(do_find_recipe(&cache, &root, "missing", None).is_err());
        assert!(do_find_recipe(&cache, &root, "hello", Some(&ProjectId::new("other"))).is_err());
    }

    #[test]
    fn metadata_of_undeclared_dependency_fails() {
        let (_dir, cache, root) = setup();

        assert!(do_metadata(&cache, &root, &ProjectId::new("other"), None).is_err());
    }

    #[test]
    fn missing_root_spec_fails() {
        let (dir, cache, _root) = setup();

        assert!(do_fetch(&cache, &dir.path().join("elsewhere")).is_err());
    }
}
