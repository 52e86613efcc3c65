//! `.gitattributes` backed [`AttrOracle`].
//!
//! Files outside the recipes tree can opt into roll detection with the
//! `recipes` attribute, e.g. `*.proto recipes`.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use dashmap::DashMap;
use git2::{ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use log::{debug, trace};
use regex_lite::Regex;
use thiserror::Error;

use crate::{
    backend::CommitId,
    roll::{AttrError, AttrOracle},
};

const ATTRIBUTES_FILE: &str = ".gitattributes";
const RECIPES_ATTRIBUTE: &str = "recipes";

#[derive(Error, Debug)]
pub enum GitAttrError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Invalid attribute pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        source: regex_lite::Error,
    },
}

#[derive(Debug)]
struct Rule {
    pattern: Regex,
    set: bool,
}

#[derive(Debug)]
struct AttrFile {
    /// Directory of the attributes file, `/`-prefixed and `/`-terminated.
    dir: String,
    rules: Arc<Vec<Rule>>,
}

pub struct GitAttrChecker {
    repo_path: PathBuf,
    files: Mutex<Option<(CommitId, Arc<Vec<AttrFile>>)>>,
    rules: DashMap<Oid, Arc<Vec<Rule>>>,
}

impl GitAttrChecker {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        GitAttrChecker {
            repo_path: repo_path.into(),
            files: Mutex::new(None),
            rules: DashMap::new(),
        }
    }

    /// Whether `path` has the `recipes` attribute set at `commit`.
    pub fn check_file(&self, commit: &CommitId, path: &str) -> Result<bool, GitAttrError> {
        let files = self.attr_files(commit)?;
        Ok(has_recipes_attribute(&files, path))
    }

    fn attr_files(&self, commit: &CommitId) -> Result<Arc<Vec<AttrFile>>, GitAttrError> {
        let mut loaded = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((loaded_commit, files)) = loaded.as_ref() {
            if loaded_commit == commit {
                return Ok(files.clone());
            }
        }

        debug!("Loading {} files at {}", ATTRIBUTES_FILE, commit);
        let repo = Repository::open(&self.repo_path)?;
        let tree = repo.revparse_single(commit.as_str())?.peel_to_tree()?;

        let mut found: Vec<(String, Oid)> = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.name() == Some(ATTRIBUTES_FILE) && entry.kind() == Some(ObjectType::Blob) {
                found.push((format!("/{}", root), entry.id()));
            }
            TreeWalkResult::Ok
        })?;

        let mut files = found
            .into_iter()
            .map(|(dir, oid)| {
                Ok(AttrFile {
                    dir,
                    rules: self.rules_for(&repo, oid)?,
                })
            })
            .collect::<Result<Vec<_>, GitAttrError>>()?;
        // Deepest directories first, so the most specific file is consulted first.
        files.sort_by(|a, b| b.dir.cmp(&a.dir));

        let files = Arc::new(files);
        *loaded = Some((commit.clone(), files.clone()));
        Ok(files)
    }

    fn rules_for(&self, repo: &Repository, oid: Oid) -> Result<Arc<Vec<Rule>>, GitAttrError> {
        if let Some(rules) = self.rules.get(&oid) {
            return Ok(rules.clone());
        }
        let blob = repo.find_blob(oid)?;
        let rules = Arc::new(parse_attributes(&String::from_utf8_lossy(blob.content()))?);
        self.rules.insert(oid, rules.clone());
        Ok(rules)
    }
}

impl AttrOracle for GitAttrChecker {
    fn check_files(&self, commit: &CommitId, paths: &BTreeSet<String>) -> Result<bool, AttrError> {
        let files = self.attr_files(commit)?;
        Ok(paths
            .iter()
            .any(|path| has_recipes_attribute(&files, path)))
    }
}

fn has_recipes_attribute(files: &[AttrFile], path: &str) -> bool {
    let path = format!("/{}", path.trim_start_matches('/'));
    for file in files {
        let Some(relative) = path.strip_prefix(&file.dir) else {
            continue;
        };
        let relative = format!("/{}", relative);
        // Last matching rule of a file wins.
        if let Some(rule) = file
            .rules
            .iter()
            .rev()
            .find(|rule| rule.pattern.is_match(&relative))
        {
            trace!("{} matched {} in {}", path, rule.pattern.as_str(), file.dir);
            return rule.set;
        }
    }
    false
}

fn parse_attributes(contents: &str) -> Result<Vec<Rule>, GitAttrError> {
    contents
        .lines()
        .filter_map(parse_line)
        .map(|(pattern, set)| {
            let regex = pattern_to_regex(&pattern);
            Regex::new(&regex)
                .map(|pattern| Rule { pattern, set })
                .map_err(|source| GitAttrError::Pattern { pattern, source })
        })
        .collect()
}

/// Returns the pattern of a line touching the `recipes` attribute, and
/// whether the line sets it (`recipes`) or not (`-recipes`, `!recipes`).
fn parse_line(line: &str) -> Option<(String, bool)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = if line.starts_with("\\#") || line.starts_with("\\!") {
        &line[1..]
    } else {
        line
    };

    let (pattern, attributes) = match line.strip_prefix('"') {
        Some(quoted) => {
            let mut pattern = String::new();
            let mut escaped = false;
            let mut rest = None;
            for (i, c) in quoted.char_indices() {
                if escaped {
                    pattern.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    rest = Some(&quoted[i + 1..]);
                    break;
                } else {
                    pattern.push(c);
                }
            }
            (pattern, rest?)
        }
        None => {
            let mut fields = line.splitn(2, char::is_whitespace);
            let pattern = fields.next()?.to_string();
            (pattern, fields.next().unwrap_or_default())
        }
    };

    attributes
        .split_whitespace()
        .rev()
        .find_map(|attribute| match attribute.strip_prefix(|c| c == '-' || c == '!') {
            Some(name) => (name == RECIPES_ATTRIBUTE).then_some(false),
            None => (attribute == RECIPES_ATTRIBUTE).then_some(true),
        })
        .map(|set| (pattern, set))
}

/// Translates a gitattributes glob into a regex matched against
/// `/`-prefixed paths relative to the attributes file.
fn pattern_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut regex = String::new();
    let mut class_start: Option<usize> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let mut skip = 1;
        if escaped {
            escaped = false;
            if class_start.is_some() {
                regex.push('\\');
                regex.push(c);
            } else {
                regex.push_str(&regex_lite::escape(&c.to_string()));
            }
        } else if c == '\\' {
            escaped = true;
        } else if let Some(start) = class_start {
            if c == ']' && start + 1 < i {
                class_start = None;
                regex.push(c);
            } else if c == '!' && start + 1 == i {
                regex.push('^');
            } else if c == '[' {
                regex.push_str("\\[");
            } else {
                regex.push(c);
            }
        } else if c == '[' {
            class_start = Some(i);
            regex.push(c);
        } else if c == '?' {
            regex.push_str("[^/]");
        } else if c == '*' {
            let rest: String = chars[i..].iter().take(3).collect();
            if rest == "**/" {
                regex.push_str("((.+/)?)");
                skip = 3;
            } else if rest.starts_with("**") {
                regex.push_str(".+");
                skip = 2;
            } else {
                regex.push_str("[^/]*");
            }
        } else {
            regex.push_str(&regex_lite::escape(&c.to_string()));
        }
        i += skip;
    }

    if let Some(anchored) = regex.strip_prefix('/') {
        format!("^/{}$", anchored)
    } else {
        format!("/{}$", regex)
    }
}
