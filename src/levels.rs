//! Diagnostic severities and run-wide severity sets.
//!
//! Severities form a closed, totally ordered enumeration so the matcher can
//! test membership with a bit test instead of comparing strings.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Severity attached to a diagnostic or expected by a constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    #[default]
    Ok,
    Satisfied,
    Warning,
    NotSatisfied,
    Inconsistent,
    Error,
}

impl ErrorLevel {
    pub const ALL: [ErrorLevel; 6] = [
        ErrorLevel::Ok,
        ErrorLevel::Satisfied,
        ErrorLevel::Warning,
        ErrorLevel::NotSatisfied,
        ErrorLevel::Inconsistent,
        ErrorLevel::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorLevel::Ok => "ok",
            ErrorLevel::Satisfied => "satisfied",
            ErrorLevel::Warning => "warning",
            ErrorLevel::NotSatisfied => "not_satisfied",
            ErrorLevel::Inconsistent => "inconsistent",
            ErrorLevel::Error => "error",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a severity token is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error level {0:?} (expected one of ok, satisfied, warning, not_satisfied, inconsistent, error)")]
pub struct UnknownLevel(pub String);

impl FromStr for ErrorLevel {
    type Err = UnknownLevel;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        ErrorLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| UnknownLevel(raw.to_string()))
    }
}

impl Serialize for ErrorLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Set of severities, stored as a bitset.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LevelSet(u8);

impl LevelSet {
    pub fn empty() -> Self {
        LevelSet(0)
    }

    pub fn insert(&mut self, level: ErrorLevel) {
        self.0 |= level.bit();
    }

    pub fn contains(&self, level: ErrorLevel) -> bool {
        self.0 & level.bit() != 0
    }

    /// Members in severity order.
    pub fn iter(&self) -> impl Iterator<Item = ErrorLevel> + '_ {
        ErrorLevel::ALL
            .into_iter()
            .filter(move |level| self.contains(*level))
    }
}

impl FromIterator<ErrorLevel> for LevelSet {
    fn from_iter<I: IntoIterator<Item = ErrorLevel>>(iter: I) -> Self {
        let mut set = LevelSet::empty();
        for level in iter {
            set.insert(level);
        }
        set
    }
}

impl fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for LevelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
