use std::{collections::BTreeMap, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{model::package::ProjectId, universe::NameError};

use super::{FetchedPackage, Universe};

/// Raw `DEPS` declaration of a recipe or module.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DepsSpec {
    /// `["module", "project/module"]`, local names are the module names.
    List(Vec<String>),
    /// `{"local_name": "project/module"}`.
    Map(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DepTarget {
    pub package: ProjectId,
    pub module: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleEntry<'a> {
    pub package: &'a ProjectId,
    pub name: &'a str,
    pub path: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeEntry<'a> {
    pub package: &'a ProjectId,
    pub name: &'a str,
    pub path: &'a Path,
}

/// Read-only projection of a [`Universe`] from one package's point of view.
pub struct UniverseView<'a> {
    universe: &'a Universe,
    package: &'a FetchedPackage,
    /// The scoped package first, then its transitive dependencies.
    visible: Vec<ProjectId>,
}

impl<'a> UniverseView<'a> {
    pub(super) fn new(
        universe: &'a Universe,
        package: &'a FetchedPackage,
        visible: Vec<ProjectId>,
    ) -> Self {
        UniverseView {
            universe,
            package,
            visible,
        }
    }

    pub fn package(&self) -> &'a FetchedPackage {
        self.package
    }

    /// Resolves every local name of `deps` to the module it refers to.
    ///
    /// A bare name is a module of the scoped package when one exists, and
    /// otherwise a visible project whose module carries the local name.
    /// `project/module` is always explicit.
    pub fn normalize_deps_spec(
        &self,
        deps: &DepsSpec,
    ) -> Result<BTreeMap<String, DepTarget>, NameError> {
        let entries: Vec<(&str, &str)> = match deps {
            DepsSpec::List(names) => names
                .iter()
                .map(|name| {
                    let local = name.rsplit_once('/').map_or(name.as_str(), |(_, m)| m);
                    (local, name.as_str())
                })
                .collect(),
            DepsSpec::Map(names) => names
                .iter()
                .map(|(local, name)| (local.as_str(), name.as_str()))
                .collect(),
        };

        let mut normalized = BTreeMap::new();
        for (local, name) in entries {
            if normalized.contains_key(local) {
                return Err(NameError::DuplicateName(local.to_string()));
            }
            let target = self.resolve_dep(local, name)?;
            debug!("DEPS `{}` of {} -> {:?}", local, self.package.project_id(), target);
            normalized.insert(local.to_string(), target);
        }
        Ok(normalized)
    }

    fn resolve_dep(&self, local: &str, name: &str) -> Result<DepTarget, NameError> {
        let (package, module) = match name.split_once('/') {
            Some((project, module)) => (self.visible_package(project, name)?, module),
            None if self.package.contents.modules.contains_key(name) => (self.package, name),
            None => (self.visible_package(name, name)?, local),
        };
        if !package.contents.modules.contains_key(module) {
            return Err(NameError::UnknownModule {
                package: package.project_id().clone(),
                module: module.to_string(),
            });
        }
        Ok(DepTarget {
            package: package.project_id().clone(),
            module: module.to_string(),
        })
    }

    fn visible_package(&self, project: &str, name: &str) -> Result<&'a FetchedPackage, NameError> {
        let project = ProjectId::new(project);
        self.visible
            .contains(&project)
            .then(|| self.universe.package(&project))
            .flatten()
            .ok_or_else(|| NameError::UnknownProject {
                package: self.package.project_id().clone(),
                name: name.to_string(),
            })
    }

    fn visible_packages(&self) -> impl Iterator<Item = &'a FetchedPackage> + '_ {
        let universe = self.universe;
        self.visible.iter().filter_map(move |id| universe.package(id))
    }

    /// Every module of the scoped package and its dependencies.
    pub fn loop_over_recipe_modules(&self) -> impl Iterator<Item = ModuleEntry<'a>> + '_ {
        self.visible_packages().flat_map(|package| {
            package.contents.modules.iter().map(move |(name, path)| ModuleEntry {
                package: package.project_id(),
                name,
                path,
            })
        })
    }

    /// Every recipe of the scoped package and its dependencies, module
    /// example and test recipes included.
    pub fn loop_over_recipes(&self) -> impl Iterator<Item = RecipeEntry<'a>> + '_ {
        self.visible_packages().flat_map(|package| {
            package.contents.recipes.iter().map(move |(name, path)| RecipeEntry {
                package: package.project_id(),
                name,
                path,
            })
        })
    }

    /// Path of recipe `name` of the scoped package.
    pub fn find_recipe(&self, name: &str) -> Result<&'a Path, NameError> {
        self.package
            .contents
            .recipes
            .get(name)
            .map(|path| path.as_path())
            .ok_or_else(|| NameError::UnknownRecipe {
                package: self.package.project_id().clone(),
                recipe: name.to_string(),
            })
    }

    /// Projects this view can see, scoped package first.
    pub fn visible_projects(&self) -> &[ProjectId] {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::universe::tests::{spec, universe};
    use pretty_assertions::assert_eq;

    fn touch(root: &Path, path: &str) {
        let path = root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    /// root -> engine, root -> tools, other is unreachable from root.
    fn fixture() -> (TempDir, Universe) {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        for path in [
            "root/recipe_modules/helper/__init__.py",
            "root/recipe_modules/helper/examples/full.py",
            "root/recipes/build.py",
            "root/recipes/ci/nightly.py",
            "engine/recipe_modules/step/__init__.py",
            "engine/recipe_modules/json/__init__.py",
            "engine/recipe_modules/engine/__init__.py",
            "engine/recipes/engine_selftest.py",
            "tools/recipe_modules/git/__init__.py",
            "other/recipe_modules/secret/__init__.py",
        ] {
            touch(base, path);
        }
        let universe = universe(
            vec![
                spec("root", &["engine", "tools"]),
                spec("engine", &[]),
                spec("tools", &[]),
                spec("other", &[]),
            ],
            base,
        );
        (dir, universe)
    }

    fn target(package: &str, module: &str) -> DepTarget {
        DepTarget {
            package: ProjectId::new(package),
            module: module.to_string(),
        }
    }

    #[test]
    fn normalize_list() {
        let (_dir, universe) = fixture();
        let view = universe.root_view();

        let deps: DepsSpec =
            serde_json::from_str(r#"["helper", "engine/step", "tools/git", "engine"]"#).unwrap();
        assert_eq!(
            view.normalize_deps_spec(&deps).unwrap(),
            BTreeMap::from([
                ("helper".to_string(), target("root", "helper")),
                ("step".to_string(), target("engine", "step")),
                ("git".to_string(), target("tools", "git")),
                ("engine".to_string(), target("engine", "engine")),
            ])
        );
    }

    #[test]
    fn normalize_map() {
        let (_dir, universe) = fixture();
        let view = universe.root_view();

        let deps: DepsSpec =
            serde_json::from_str(r#"{"j": "engine/json", "local": "helper", "step": "engine"}"#)
                .unwrap();
        assert_eq!(
            view.normalize_deps_spec(&deps).unwrap(),
            BTreeMap::from([
                ("j".to_string(), target("engine", "json")),
                ("local".to_string(), target("root", "helper")),
                ("step".to_string(), target("engine", "step")),
            ])
        );
    }

    #[test]
    fn unknown_names() {
        let (_dir, universe) = fixture();
        let view = universe.root_view();

        let unknown_project = DepsSpec::List(vec!["nope/step".to_string()]);
        assert_eq!(
            view.normalize_deps_spec(&unknown_project),
            Err(NameError::UnknownProject {
                package: ProjectId::new("root"),
                name: "nope/step".to_string(),
            })
        );

        let unreachable_project = DepsSpec::List(vec!["other/secret".to_string()]);
        assert!(matches!(
            view.normalize_deps_spec(&unreachable_project),
            Err(NameError::UnknownProject { .. })
        ));

        let unknown_module = DepsSpec::List(vec!["engine/missing".to_string()]);
        assert_eq!(
            view.normalize_deps_spec(&unknown_module),
            Err(NameError::UnknownModule {
                package: ProjectId::new("engine"),
                module: "missing".to_string(),
            })
        );

        let bare_unknown = DepsSpec::List(vec!["missing".to_string()]);
        assert!(matches!(
            view.normalize_deps_spec(&bare_unknown),
            Err(NameError::UnknownProject { .. })
        ));
    }

    #[test]
    fn duplicate_local_names() {
        let (_dir, universe) = fixture();
        let view = universe.root_view();

        let deps = DepsSpec::List(vec![
            "engine/step".to_string(),
            "engine".to_string(),
            "step".to_string(),
        ]);
        assert_eq!(
            view.normalize_deps_spec(&deps),
            Err(NameError::DuplicateName("step".to_string()))
        );
    }

    #[test]
    fn dependency_view_sees_only_its_closure() {
        let (_dir, universe) = fixture();
        let view = universe.view(&ProjectId::new("engine")).unwrap();

        let deps = DepsSpec::List(vec!["tools/git".to_string()]);
        assert!(matches!(
            view.normalize_deps_spec(&deps),
            Err(NameError::UnknownProject { .. })
        ));
        assert_eq!(
            view.loop_over_recipe_modules()
                .map(|m| m.name)
                .collect::<Vec<_>>(),
            vec!["engine", "json", "step"]
        );
    }

    #[test]
    fn loops_cover_the_closure_and_restart() {
        let (_dir, universe) = fixture();
        let view = universe.root_view();

        let modules = || {
            view.loop_over_recipe_modules()
                .map(|m| format!("{}/{}", m.package, m.name))
                .collect::<Vec<_>>()
        };
        assert_eq!(
            modules(),
            vec!["root/helper", "engine/engine", "engine/json", "engine/step", "tools/git"]
        );
        assert_eq!(modules(), modules());

        assert_eq!(
            view.loop_over_recipes()
                .map(|r| format!("{}/{}", r.package, r.name))
                .collect::<Vec<_>>(),
            vec![
                "root/build",
                "root/ci/nightly",
                "root/helper:examples/full",
                "engine/engine_selftest",
            ]
        );
    }

    #[test]
    fn find_recipe_in_scoped_package() {
        let (dir, universe) = fixture();
        let view = universe.root_view();

        assert_eq!(
            view.find_recipe("ci/nightly").unwrap(),
            dir.path().join("root/recipes/ci/nightly.py")
        );
        assert_eq!(
            view.find_recipe("helper:examples/full").unwrap(),
            dir.path().join("root/recipe_modules/helper/examples/full.py")
        );
        assert_eq!(
            view.find_recipe("engine_selftest"),
            Err(NameError::UnknownRecipe {
                package: ProjectId::new("root"),
                recipe: "engine_selftest".to_string(),
            })
        );
    }
}
