//! Resolved run configuration.
//!
//! `RunOptions` is built once per invocation from built-in defaults, an
//! optional JSON config document, and CLI overrides, then shared read-only
//! with the scheduler and every worker.
mod document;
mod resolve;

pub use document::parse_constraint;
pub use resolve::resolve;

use crate::constraint::{pattern_matches, Constraint, InvalidConstraint};
use crate::levels::{ErrorLevel, LevelSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Fully resolved execution plan for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOptions {
    pub index_file: PathBuf,
    pub filters: Vec<String>,
    pub additional_constraints: Vec<(String, Vec<Constraint>)>,
    pub compare_formula_output: bool,
    pub custom_compare_patterns: Vec<(String, String)>,
    pub disclosure_system_by_id: Vec<(String, String)>,
    pub ignore_levels: LevelSet,
    pub plugins_by_id: Vec<(String, BTreeSet<String>)>,
    pub log_directory: Option<PathBuf>,
    pub match_all: bool,
    pub name: String,
    pub parallel: bool,
    pub processes: Option<NonZeroUsize>,
    pub options: BTreeMap<String, OptionValue>,
}

impl RunOptions {
    /// Extra constraints for a test case, concatenated across every matching group.
    pub fn constraints_for<'a>(
        &'a self,
        testcase_id: &'a str,
    ) -> impl Iterator<Item = &'a Constraint> + 'a {
        self.additional_constraints
            .iter()
            .filter(move |(key, _)| pattern_matches(key, testcase_id))
            .flat_map(|(_, constraints)| constraints.iter())
    }

    /// First disclosure system whose key matches the test case.
    pub fn disclosure_system_for(&self, testcase_id: &str) -> Option<&str> {
        self.disclosure_system_by_id
            .iter()
            .find(|(key, _)| pattern_matches(key, testcase_id))
            .map(|(_, uri)| uri.as_str())
    }

    /// Union of every plugin set whose key matches the test case.
    pub fn plugins_for(&self, testcase_id: &str) -> BTreeSet<String> {
        self.plugins_by_id
            .iter()
            .filter(|(key, _)| pattern_matches(key, testcase_id))
            .flat_map(|(_, plugins)| plugins.iter().cloned())
            .collect()
    }
}

/// Levels ignored when neither the CLI nor the config document names any.
pub fn default_ignore_levels() -> LevelSet {
    [ErrorLevel::Ok].into_iter().collect()
}

/// Scalar or array value passed through to the processing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<OptionValue>),
}

/// Failure to produce a `RunOptions`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config at {path}: {reason}")]
    Invalid {
        path: String,
        reason: String,
        #[source]
        cause: Option<InvalidConstraint>,
    },
    #[error("no index file given on the command line or in the config document")]
    MissingIndex,
    #[error("index file {} does not exist", .0.display())]
    IndexNotFound(PathBuf),
}

impl ConfigError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            path: path.into(),
            reason: reason.to_string(),
            cause: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_with_groups() -> RunOptions {
        let error =
            |count, pattern: &str| Constraint::new(count, ErrorLevel::Error, pattern).expect("valid");
        RunOptions {
            index_file: PathBuf::from("index.json"),
            filters: Vec::new(),
            additional_constraints: vec![
                ("calc-001".to_string(), vec![error(1, "calc:*")]),
                ("calc-*".to_string(), vec![error(2, "dim:*")]),
                ("calc-001".to_string(), vec![error(0, "xbrl:*")]),
            ],
            compare_formula_output: false,
            custom_compare_patterns: Vec::new(),
            disclosure_system_by_id: vec![
                ("calc-*".to_string(), "efm-pragmatic".to_string()),
                ("calc-001".to_string(), "hmrc".to_string()),
            ],
            ignore_levels: default_ignore_levels(),
            plugins_by_id: vec![
                ("calc-001".to_string(), ["a".to_string()].into_iter().collect()),
                ("*".to_string(), ["b".to_string()].into_iter().collect()),
            ],
            log_directory: None,
            match_all: true,
            name: "index".to_string(),
            parallel: false,
            processes: None,
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn constraints_for_scans_every_group_in_order() {
        let options = options_with_groups();
        let patterns: Vec<&str> = options
            .constraints_for("calc-001")
            .map(Constraint::pattern)
            .collect();
        assert_eq!(patterns, vec!["calc:*", "dim:*", "xbrl:*"]);
        assert_eq!(options.constraints_for("dim-001").count(), 0);
    }

    #[test]
    fn disclosure_system_takes_first_match() {
        let options = options_with_groups();
        assert_eq!(options.disclosure_system_for("calc-001"), Some("efm-pragmatic"));
        assert_eq!(options.disclosure_system_for("other"), None);
    }

    #[test]
    fn plugins_union_across_matching_groups() {
        let options = options_with_groups();
        let plugins: Vec<String> = options.plugins_for("calc-001").into_iter().collect();
        assert_eq!(plugins, vec!["a".to_string(), "b".to_string()]);
        let plugins: Vec<String> = options.plugins_for("other").into_iter().collect();
        assert_eq!(plugins, vec!["b".to_string()]);
    }
}
