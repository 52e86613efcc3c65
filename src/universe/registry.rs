use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::trace;
use walkdir::{DirEntry, WalkDir};

pub const MODULES_DIR: &str = "recipe_modules";
pub const RECIPES_DIR: &str = "recipes";
const MODULE_RECIPE_DIRS: [&str; 2] = ["examples", "tests"];
const MODULE_MARKER: &str = "__init__.py";
const RECIPE_EXTENSION: &str = "py";
const EXPECTATIONS_SUFFIX: &str = ".expected";

/// Static lookup table of what one package provides, built from its
/// recipes tree when the package joins a universe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageContents {
    /// Module name to module directory.
    pub modules: BTreeMap<String, PathBuf>,
    /// Recipe name to recipe file.
    pub recipes: BTreeMap<String, PathBuf>,
}

impl PackageContents {
    pub fn scan(recipes_root: &Path) -> std::io::Result<PackageContents> {
        let mut contents = PackageContents::default();

        let modules_dir = recipes_root.join(MODULES_DIR);
        if modules_dir.is_dir() {
            for entry in std::fs::read_dir(&modules_dir)? {
                let entry = entry?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if is_hidden(&name) || !path.join(MODULE_MARKER).is_file() {
                    continue;
                }
                for dir in MODULE_RECIPE_DIRS {
                    for (recipe, file) in scan_recipes(&path.join(dir))? {
                        contents
                            .recipes
                            .insert(format!("{}:{}/{}", name, dir, recipe), file);
                    }
                }
                contents.modules.insert(name, path);
            }
        }

        contents
            .recipes
            .extend(scan_recipes(&recipes_root.join(RECIPES_DIR))?);

        trace!(
            "Found {} modules and {} recipes under {}",
            contents.modules.len(),
            contents.recipes.len(),
            recipes_root.display()
        );
        Ok(contents)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    is_hidden(&name) || (entry.file_type().is_dir() && name.ends_with(EXPECTATIONS_SUFFIX))
}

/// Recipes below `dir`, named by their `/`-joined path without extension.
fn scan_recipes(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut recipes = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(RECIPE_EXTENSION)
            || entry.file_name() == MODULE_MARKER
        {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let name = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        recipes.push((name, path.to_path_buf()));
    }
    Ok(recipes)
}
