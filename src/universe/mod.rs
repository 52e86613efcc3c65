//! The resolved set of packages and scoped read-only views over it.

mod registry;
mod view;

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    backend::{Backend, CommitId},
    model::package::{PackageSpec, ProjectId},
};

pub use registry::PackageContents;
pub use view::{DepTarget, DepsSpec, ModuleEntry, RecipeEntry, UniverseView};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NameError {
    #[error("Package {0} is not part of the universe")]
    UnknownPackage(ProjectId),
    #[error("`{name}` in DEPS of {package} does not name a visible package")]
    UnknownProject { package: ProjectId, name: String },
    #[error("Package {package} has no module `{module}`")]
    UnknownModule { package: ProjectId, module: String },
    #[error("Package {package} has no recipe `{recipe}`")]
    UnknownRecipe { package: ProjectId, recipe: String },
    #[error("DEPS name `{0}` is declared more than once")]
    DuplicateName(String),
}

/// One package of a universe, at the revision it was checked out at.
pub struct FetchedPackage {
    pub spec: PackageSpec,
    pub local_path: PathBuf,
    /// `None` for the root package, which is used in place.
    pub backend: Option<Arc<dyn Backend>>,
    pub commit: Option<CommitId>,
    pub contents: PackageContents,
}

impl FetchedPackage {
    pub fn project_id(&self) -> &ProjectId {
        &self.spec.project_id
    }

    pub fn recipes_root(&self) -> PathBuf {
        self.spec.recipes_root(&self.local_path)
    }
}

/// Root package plus every transitive dependency, at most one entry per project.
pub struct Universe {
    root: ProjectId,
    packages: BTreeMap<ProjectId, FetchedPackage>,
}

impl Universe {
    pub(crate) fn new(root: ProjectId, packages: BTreeMap<ProjectId, FetchedPackage>) -> Self {
        Universe { root, packages }
    }

    pub fn root(&self) -> &FetchedPackage {
        // The resolver always registers the root package.
        &self.packages[&self.root]
    }

    pub fn root_id(&self) -> &ProjectId {
        &self.root
    }

    pub fn package(&self, project_id: &ProjectId) -> Option<&FetchedPackage> {
        self.packages.get(project_id)
    }

    pub fn packages(&self) -> impl Iterator<Item = &FetchedPackage> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn local_path(&self, project_id: &ProjectId) -> Option<&Path> {
        self.packages.get(project_id).map(|p| p.local_path.as_path())
    }

    pub fn view(&self, project_id: &ProjectId) -> Result<UniverseView<'_>, NameError> {
        let package = self
            .packages
            .get(project_id)
            .ok_or_else(|| NameError::UnknownPackage(project_id.clone()))?;
        Ok(UniverseView::new(self, package, self.reachable_from(project_id)))
    }

    pub fn root_view(&self) -> UniverseView<'_> {
        UniverseView::new(self, self.root(), self.reachable_from(&self.root))
    }

    /// `project_id` first, then its transitive dependencies in breadth-first order.
    fn reachable_from(&self, project_id: &ProjectId) -> Vec<ProjectId> {
        let mut seen = BTreeSet::from([project_id.clone()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([project_id.clone()]);
        while let Some(current) = queue.pop_front() {
            let Some(package) = self.packages.get(&current) else {
                continue;
            };
            order.push(current);
            for dependency in package.spec.dependencies.keys() {
                if seen.insert(dependency.clone()) {
                    queue.push_back(dependency.clone());
                }
            }
        }
        order
    }
}
