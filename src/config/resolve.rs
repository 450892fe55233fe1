//! Precedence merge of defaults, config document, and CLI flags.
use super::document::{load_document, ConfigDocument};
use super::{default_ignore_levels, ConfigError, RunOptions};
use crate::cli::{MatchMode, RunArgs};
use std::path::Path;

/// Resolve CLI arguments and the config document they reference into a `RunOptions`.
///
/// Precedence from lowest to highest: built-in defaults, the `--config`
/// document, explicit CLI flags. List-valued CLI flags replace the config
/// lists rather than extending them.
pub fn resolve(args: &RunArgs) -> Result<RunOptions, ConfigError> {
    let document = match args.config.as_deref() {
        Some(path) => load_document(path)?,
        None => ConfigDocument::default(),
    };
    merge(args, document)
}

fn merge(args: &RunArgs, document: ConfigDocument) -> Result<RunOptions, ConfigError> {
    let index_file = args
        .index_file
        .clone()
        .or(document.index_file)
        .ok_or(ConfigError::MissingIndex)?;
    if !index_file.exists() {
        return Err(ConfigError::IndexNotFound(index_file));
    }

    let filters = if args.filters.is_empty() {
        document.filters.unwrap_or_default()
    } else {
        args.filters.clone()
    };
    let ignore_levels = if args.ignore_levels.is_empty() {
        document.ignore_levels.unwrap_or_else(default_ignore_levels)
    } else {
        args.ignore_levels.iter().copied().collect()
    };
    // Match everything while unfiltered; any single filter suffices once filters exist.
    let match_all = args
        .match_mode
        .map(MatchMode::is_all)
        .or(document.match_all)
        .unwrap_or(filters.is_empty());
    let name = args
        .name
        .clone()
        .or(document.name)
        .unwrap_or_else(|| default_name(&index_file));

    Ok(RunOptions {
        filters,
        additional_constraints: document.additional_constraints,
        compare_formula_output: args.compare_formula_output
            || document.compare_formula_output.unwrap_or(false),
        custom_compare_patterns: document.custom_compare_patterns,
        disclosure_system_by_id: document.disclosure_system_by_id,
        ignore_levels,
        plugins_by_id: document.plugins_by_id,
        log_directory: args.log_directory.clone().or(document.log_directory),
        match_all,
        name,
        parallel: args
            .parallel_override()
            .or(document.parallel)
            .unwrap_or(false),
        processes: args.processes.or(document.processes),
        options: document.options,
        index_file,
    })
}

fn default_name(index_file: &Path) -> String {
    index_file
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "run".to_string())
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
