//! Roll-candidate classification.
//!
//! A commit is a roll candidate when it plausibly changes recipe behaviour
//! for downstream consumers of its package.

use std::collections::BTreeSet;

use crate::{backend::CommitId, model::package::INFRA_REPO_CONFIG_RELPATH};

pub type AttrError = Box<dyn std::error::Error + Send + Sync>;

/// Per-path repository attribute lookup.
pub trait AttrOracle: Send + Sync {
    /// Whether any of `paths` is marked as recipe-affecting at `commit`.
    fn check_files(&self, commit: &CommitId, paths: &BTreeSet<String>) -> Result<bool, AttrError>;
}

/// Decides whether the commit that changed `changed_paths` is a roll candidate.
///
/// The string checks run first; `oracle` is only consulted when none of them
/// applies, and its answer is returned as is.
pub fn is_roll_candidate(
    recipes_path: &str,
    changed_paths: &BTreeSet<String>,
    commit: &CommitId,
    oracle: &dyn AttrOracle,
) -> Result<bool, AttrError> {
    if recipes_path.is_empty() {
        return Ok(true);
    }

    if changed_paths.contains(INFRA_REPO_CONFIG_RELPATH) {
        return Ok(true);
    }

    let recipes_path = recipes_path.trim_end_matches('/');
    let in_recipes_tree = changed_paths.iter().any(|path| {
        path == recipes_path
            || path
                .strip_prefix(recipes_path)
                .is_some_and(|rest| rest.starts_with('/'))
    });
    if in_recipes_tree {
        return Ok(true);
    }

    oracle.check_files(commit, changed_paths)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedOracle {
        answer: Option<bool>,
        calls: Mutex<Vec<(CommitId, BTreeSet<String>)>>,
    }

    impl FixedOracle {
        fn answering(answer: bool) -> Self {
            FixedOracle {
                answer: Some(answer),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn unreachable() -> Self {
            FixedOracle {
                answer: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl AttrOracle for FixedOracle {
        fn check_files(
            &self,
            commit: &CommitId,
            paths: &BTreeSet<String>,
        ) -> Result<bool, AttrError> {
            self.calls
                .lock()
                .unwrap()
                .push((commit.clone(), paths.clone()));
            self.answer.ok_or_else(|| "oracle should not be called".into())
        }
    }

    fn paths(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn commit() -> CommitId {
        CommitId::new("a".repeat(40))
    }

    #[test]
    fn empty_recipes_path_is_always_a_candidate() {
        let oracle = FixedOracle::unreachable();
        for changed in [paths(&["foo", "bar"]), paths(&[]), paths(&["x/y/z"])] {
            assert!(is_roll_candidate("", &changed, &commit(), &oracle).unwrap());
        }
        assert!(oracle.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn config_change_is_a_candidate() {
        let oracle = FixedOracle::unreachable();
        let changed = paths(&["infra/config/recipes.cfg"]);
        assert!(is_roll_candidate("recipes", &changed, &commit(), &oracle).unwrap());
        assert!(oracle.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn change_inside_recipes_tree_is_a_candidate() {
        let oracle = FixedOracle::unreachable();
        for changed in [
            paths(&["recipes/foo"]),
            paths(&["recipes"]),
            paths(&["bar", "recipes/deep/nested.py"]),
        ] {
            assert!(is_roll_candidate("recipes", &changed, &commit(), &oracle).unwrap());
            assert!(is_roll_candidate("recipes/", &changed, &commit(), &oracle).unwrap());
        }
        assert!(oracle.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn sibling_with_common_prefix_is_not_inside() {
        let oracle = FixedOracle::answering(false);
        let changed = paths(&["recipes_extra/foo", "recipes.md"]);
        assert!(!is_roll_candidate("recipes", &changed, &commit(), &oracle).unwrap());
        assert_eq!(oracle.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn oracle_decides_the_rest() {
        let changed = paths(&["foo", "bar"]);

        let oracle = FixedOracle::answering(true);
        assert!(is_roll_candidate("recipes", &changed, &commit(), &oracle).unwrap());
        assert_eq!(
            *oracle.calls.lock().unwrap(),
            vec![(commit(), changed.clone())]
        );

        let oracle = FixedOracle::answering(false);
        assert!(!is_roll_candidate("recipes", &changed, &commit(), &oracle).unwrap());
        assert_eq!(*oracle.calls.lock().unwrap(), vec![(commit(), changed)]);
    }

    #[test]
    fn oracle_errors_propagate() {
        let oracle = FixedOracle::unreachable();
        assert!(is_roll_candidate("recipes", &paths(&["foo"]), &commit(), &oracle).is_err());
    }
}
