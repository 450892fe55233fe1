//! JSON config document loading and field-by-field validation.
//!
//! The document is parsed into a value tree first so every validation error
//! can name the offending field path; leaf shapes are checked with serde.
use super::{ConfigError, OptionValue};
use crate::constraint::{Constraint, InvalidConstraint};
use crate::levels::{ErrorLevel, LevelSet};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Config values as declared by the document; `None` means the key was absent.
#[derive(Debug, Default)]
pub(super) struct ConfigDocument {
    pub(super) index_file: Option<PathBuf>,
    pub(super) filters: Option<Vec<String>>,
    pub(super) additional_constraints: Vec<(String, Vec<Constraint>)>,
    pub(super) compare_formula_output: Option<bool>,
    pub(super) custom_compare_patterns: Vec<(String, String)>,
    pub(super) disclosure_system_by_id: Vec<(String, String)>,
    pub(super) ignore_levels: Option<LevelSet>,
    pub(super) plugins_by_id: Vec<(String, BTreeSet<String>)>,
    pub(super) log_directory: Option<PathBuf>,
    pub(super) match_all: Option<bool>,
    pub(super) name: Option<String>,
    pub(super) parallel: Option<bool>,
    pub(super) processes: Option<NonZeroUsize>,
    pub(super) options: BTreeMap<String, OptionValue>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConstraint {
    count: i64,
    #[serde(default)]
    level: ErrorLevel,
    pattern: String,
}

/// Load and validate the config document at `path`.
pub(super) fn load_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&bytes)
}

pub(super) fn parse_document(bytes: &[u8]) -> Result<ConfigDocument, ConfigError> {
    let root: Value =
        serde_json::from_slice(bytes).map_err(|err| ConfigError::invalid("$", err))?;
    let Value::Object(fields) = root else {
        return Err(ConfigError::invalid("$", "config document must be a JSON object"));
    };

    let mut document = ConfigDocument::default();
    for (key, value) in fields {
        let path = key.as_str();
        match path {
            "index_file" => document.index_file = leaf(path, value)?,
            "filters" => document.filters = leaf(path, value)?,
            "additional_constraints" => {
                document.additional_constraints = parse_constraint_groups(path, value)?
            }
            "compare_formula_output" => document.compare_formula_output = leaf(path, value)?,
            "custom_compare_patterns" => {
                document.custom_compare_patterns = parse_compare_patterns(path, value)?
            }
            "disclosure_system_by_id" => {
                document.disclosure_system_by_id = keyed_entries(path, value, leaf::<String>)?
            }
            "ignore_levels" => {
                let levels: Option<Vec<ErrorLevel>> = leaf(path, value)?;
                document.ignore_levels = levels.map(|levels| levels.into_iter().collect());
            }
            "plugins_by_id" => {
                document.plugins_by_id = keyed_entries(path, value, leaf::<BTreeSet<String>>)?
            }
            "log_directory" => document.log_directory = leaf(path, value)?,
            "match_all" => document.match_all = leaf(path, value)?,
            "name" => document.name = leaf(path, value)?,
            "parallel" => document.parallel = leaf(path, value)?,
            "processes" => document.processes = parse_processes(path, value)?,
            "options" => {
                document.options = keyed_entries(path, value, leaf::<OptionValue>)?
                    .into_iter()
                    .collect()
            }
            _ => return Err(ConfigError::invalid(path, "unknown config key")),
        }
    }
    Ok(document)
}

/// Parse one `{count, level?, pattern}` constraint object.
///
/// Shared with suite loaders that declare expected constraints in JSON.
pub fn parse_constraint(path: &str, value: Value) -> Result<Constraint, ConfigError> {
    let raw: RawConstraint = leaf(path, value)?;
    Constraint::new(raw.count, raw.level, raw.pattern).map_err(|err| {
        let field = match err {
            InvalidConstraint::NegativeCount(_) => "count",
            InvalidConstraint::EmptyPattern => "pattern",
        };
        ConfigError::Invalid {
            path: format!("{path}.{field}"),
            reason: "invalid constraint".to_string(),
            cause: Some(err),
        }
    })
}

fn parse_constraint_groups(
    path: &str,
    value: Value,
) -> Result<Vec<(String, Vec<Constraint>)>, ConfigError> {
    keyed_entries(path, value, |group_path, group| {
        let Value::Array(items) = group else {
            return Err(ConfigError::invalid(
                group_path,
                "expected an array of constraints",
            ));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| parse_constraint(&format!("{group_path}[{index}]"), item))
            .collect()
    })
}

fn parse_compare_patterns(path: &str, value: Value) -> Result<Vec<(String, String)>, ConfigError> {
    let pairs = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| leaf::<(String, String)>(&format!("{path}[{index}]"), item))
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(_) => keyed_entries(path, value, leaf::<String>)?,
        _ => {
            return Err(ConfigError::invalid(
                path,
                "expected an array of [pattern, replacement] pairs or an object",
            ))
        }
    };
    for (index, (pattern, _)) in pairs.iter().enumerate() {
        Regex::new(pattern).map_err(|err| ConfigError::invalid(format!("{path}[{index}]"), err))?;
    }
    Ok(pairs)
}

fn parse_processes(path: &str, value: Value) -> Result<Option<NonZeroUsize>, ConfigError> {
    let Some(raw) = leaf::<Option<i64>>(path, value)? else {
        return Ok(None);
    };
    usize::try_from(raw)
        .ok()
        .and_then(NonZeroUsize::new)
        .map(Some)
        .ok_or_else(|| {
            ConfigError::invalid(path, format!("processes must be a positive integer (got {raw})"))
        })
}

/// Walk an object in document order, parsing each value at `path.key`.
fn keyed_entries<T, F>(path: &str, value: Value, mut parse: F) -> Result<Vec<(String, T)>, ConfigError>
where
    F: FnMut(&str, Value) -> Result<T, ConfigError>,
{
    let entries: Map<String, Value> = match value {
        Value::Object(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(ConfigError::invalid(path, "expected an object keyed by test case id")),
    };
    entries
        .into_iter()
        .map(|(key, value)| {
            let parsed = parse(&format!("{path}.{key}"), value)?;
            Ok((key, parsed))
        })
        .collect()
}

fn leaf<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|err| ConfigError::invalid(path, err))
}
