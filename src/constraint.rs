//! Declarative diagnostic expectations.
use crate::levels::ErrorLevel;
use serde::Serialize;
use std::fmt;

/// Expect exactly `count` diagnostics at `level` whose identifier matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Constraint {
    count: usize,
    level: ErrorLevel,
    pattern: String,
}

/// Constraint rejected at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidConstraint {
    #[error("constraint count must be non-negative (got {0})")]
    NegativeCount(i64),
    #[error("constraint pattern must be non-empty")]
    EmptyPattern,
}

impl Constraint {
    pub fn new(
        count: i64,
        level: ErrorLevel,
        pattern: impl Into<String>,
    ) -> Result<Self, InvalidConstraint> {
        let pattern = pattern.into();
        let count = usize::try_from(count).map_err(|_| InvalidConstraint::NegativeCount(count))?;
        if pattern.is_empty() {
            return Err(InvalidConstraint::EmptyPattern);
        }
        Ok(Constraint {
            count,
            level,
            pattern,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn level(&self) -> ErrorLevel {
        self.level
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, level: ErrorLevel, identifier: &str) -> bool {
        self.level == level && pattern_matches(&self.pattern, identifier)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {} {:?}", self.count, self.level, self.pattern)
    }
}

/// Glob match where `*` matches any run of characters, including none.
///
/// Only `*` is special. `?` and character classes match themselves literally.
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, absorbed)) = backtrack {
            p = star + 1;
            t = absorbed + 1;
            backtrack = Some((star, absorbed + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|ch| *ch == '*')
}
