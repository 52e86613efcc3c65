use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::model::ParseError;

/// Repository-relative location of the machine-readable package spec.
pub const INFRA_REPO_CONFIG_RELPATH: &str = "infra/config/recipes.cfg";

pub const SUPPORTED_API_VERSION: i64 = 2;

#[derive(Clone, Default, Hash, Deserialize, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(s: impl Into<String>) -> Self {
        ProjectId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A project id doubles as a checkout directory name, so it is restricted
    /// to `[A-Za-z0-9][A-Za-z0-9._-]*`.
    pub fn is_valid(&self) -> bool {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphanumeric() => {
                chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            }
            _ => false,
        }
    }
}

impl Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        ProjectId(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        ProjectId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub branch: Option<String>,
    pub revision: String,
}

impl DependencySpec {
    pub fn new(url: impl Into<String>, revision: impl Into<String>) -> Self {
        DependencySpec {
            url: url.into(),
            branch: None,
            revision: revision.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub api_version: i64,
    #[serde(default)]
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub canonical_repo_url: Option<String>,
    /// Empty means the whole repository is the recipes tree.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub recipes_path: String,
    #[serde(rename = "deps", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub dependencies: BTreeMap<ProjectId, DependencySpec>,
}

impl PackageSpec {
    pub fn new(project_id: impl Into<ProjectId>) -> Self {
        PackageSpec {
            api_version: SUPPORTED_API_VERSION,
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    /// Reads the package spec from a checked-out repository root.
    pub fn from_repo_root(root: &Path) -> Result<PackageSpec, ParseError> {
        Self::from_file(&root.join(INFRA_REPO_CONFIG_RELPATH))
    }

    pub fn from_file(path: &Path) -> Result<PackageSpec, ParseError> {
        debug!("Attempting to read package spec from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let spec = PackageSpec::from_json_str(&contents);
        if let Err(err) = &spec {
            error!(
                "Could not build a valid package spec from {} due to err {err}",
                path.display()
            )
        }
        spec
    }

    pub fn from_json_str(data: &str) -> Result<PackageSpec, ParseError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json_string(&self) -> Result<String, ParseError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        if self.api_version != SUPPORTED_API_VERSION {
            return Err(ParseError::UnsupportedApiVersion(
                self.api_version,
                SUPPORTED_API_VERSION,
            ));
        }
        for project_id in std::iter::once(&self.project_id).chain(self.dependencies.keys()) {
            if !project_id.is_valid() {
                return Err(ParseError::InvalidProjectId(project_id.to_string()));
            }
        }
        Ok(())
    }

    /// Root of the recipes tree inside a checkout of this package.
    pub fn recipes_root(&self, repo_root: &Path) -> PathBuf {
        if self.recipes_path.is_empty() {
            repo_root.to_path_buf()
        } else {
            repo_root.join(&self.recipes_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_minimal_spec() {
        let spec = PackageSpec::from_json_str(r#"{"api_version": 2}"#).unwrap();
        assert_eq!(
            spec,
            PackageSpec {
                api_version: 2,
                ..Default::default()
            }
        );
        assert_eq!(spec.recipes_path, "");
    }

    #[test]
    fn load_spec_with_deps() {
        let str = r#"
        {
          "api_version": 2,
          "project_id": "build",
          "recipes_path": "scripts/slave",
          "deps": {
            "recipe_engine": {
              "url": "https://example.com/recipes-py.git",
              "branch": "main",
              "revision": "2f0d4d3f6d2d7b5c1f4d0a3b0e0c6c1bd2d1a7f0"
            },
            "depot_tools": {
              "url": "https://example.com/depot_tools.git",
              "revision": "main"
            }
          }
        }"#;
        let mut expected = PackageSpec::new("build");
        expected.recipes_path = "scripts/slave".to_string();
        expected.dependencies.insert(
            ProjectId::from("recipe_engine"),
            DependencySpec {
                url: "https://example.com/recipes-py.git".to_string(),
                branch: Some("main".to_string()),
                revision: "2f0d4d3f6d2d7b5c1f4d0a3b0e0c6c1bd2d1a7f0".to_string(),
            },
        );
        expected.dependencies.insert(
            ProjectId::from("depot_tools"),
            DependencySpec::new("https://example.com/depot_tools.git", "main"),
        );
        assert_eq!(PackageSpec::from_json_str(str).unwrap(), expected);
    }

    #[test]
    fn round_trip() {
        let mut spec = PackageSpec::new("infra");
        spec.canonical_repo_url = Some("https://example.com/infra.git".to_string());
        spec.recipes_path = "recipes".to_string();
        spec.dependencies.insert(
            ProjectId::from("recipe_engine"),
            DependencySpec::new("https://example.com/recipes-py.git", "abc"),
        );

        let json = spec.to_json_string().unwrap();
        assert_eq!(PackageSpec::from_json_str(&json).unwrap(), spec);
    }

    #[test]
    fn load_invalid_json() {
        assert!(PackageSpec::from_json_str("{not json").is_err());
        assert!(PackageSpec::from_json_str(r#"{"project_id": "x"}"#).is_err());
        assert!(PackageSpec::from_json_str(r#"{"api_version": 2, "deps": {"a": {}}}"#).is_err());
    }

    #[test]
    fn load_fixture_from_resources() {
        let path = project_root::get_project_root()
            .unwrap()
            .join("resources/recipes.cfg");
        let spec = PackageSpec::from_file(&path).unwrap();
        assert_eq!(spec.project_id, ProjectId::from("example"));
        assert_eq!(spec.recipes_path, "recipes");
        assert_eq!(spec.dependencies.len(), 1);
        spec.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_specs() {
        let spec = PackageSpec {
            api_version: 1,
            ..PackageSpec::new("build")
        };
        assert!(matches!(
            spec.validate(),
            Err(ParseError::UnsupportedApiVersion(1, 2))
        ));

        assert!(matches!(
            PackageSpec::new("").validate(),
            Err(ParseError::InvalidProjectId(_))
        ));
        assert!(matches!(
            PackageSpec::new("../escape").validate(),
            Err(ParseError::InvalidProjectId(_))
        ));

        let mut spec = PackageSpec::new("build");
        spec.dependencies
            .insert(ProjectId::from("a/b"), DependencySpec::new("url", "main"));
        assert!(matches!(
            spec.validate(),
            Err(ParseError::InvalidProjectId(id)) if id == "a/b"
        ));
    }

    #[test]
    fn project_id_charset() {
        assert!(ProjectId::from("recipe_engine").is_valid());
        assert!(ProjectId::from("depot-tools.v2").is_valid());
        assert!(!ProjectId::from("_hidden").is_valid());
        assert!(!ProjectId::from("with space").is_valid());
    }
}
