//! Constraint matching for a single test case.
//!
//! Ignored severities are dropped first, then each remaining constraint counts
//! the diagnostics it covers. Counting is non-consuming: one diagnostic can
//! satisfy several constraints.
use crate::constraint::Constraint;
use crate::engine::Diagnostic;
use crate::levels::LevelSet;
use serde::Serialize;

/// A constraint whose observed count differs from the declared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsatisfiedConstraint {
    pub constraint: Constraint,
    pub actual: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Pass,
    Fail,
}

/// Outcome of matching one test case's diagnostics against its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub testcase_id: String,
    pub outcome: MatchOutcome,
    pub unsatisfied: Vec<UnsatisfiedConstraint>,
    pub unexpected: Vec<Diagnostic>,
    /// Diagnostics left after ignored levels were removed.
    pub considered: usize,
}

impl MatchResult {
    pub fn passed(&self) -> bool {
        self.outcome == MatchOutcome::Pass
    }
}

/// Match `diagnostics` against `constraints`, in declared order.
///
/// With no applicable constraints every non-ignored diagnostic is unexpected,
/// so an empty constraint list means "no diagnostics expected".
pub fn evaluate<'a, I>(
    testcase_id: &str,
    diagnostics: &[Diagnostic],
    constraints: I,
    ignore_levels: &LevelSet,
) -> MatchResult
where
    I: IntoIterator<Item = &'a Constraint>,
{
    let considered: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|diagnostic| !ignore_levels.contains(diagnostic.severity))
        .collect();
    let applicable: Vec<&Constraint> = constraints
        .into_iter()
        .filter(|constraint| !ignore_levels.contains(constraint.level()))
        .collect();

    let unsatisfied = applicable
        .iter()
        .filter_map(|constraint| {
            let actual = considered
                .iter()
                .filter(|diagnostic| constraint.matches(diagnostic.severity, &diagnostic.identifier))
                .count();
            (actual != constraint.count()).then(|| UnsatisfiedConstraint {
                constraint: (*constraint).clone(),
                actual,
            })
        })
        .collect::<Vec<_>>();

    let unexpected = considered
        .iter()
        .filter(|diagnostic| {
            !applicable
                .iter()
                .any(|constraint| constraint.matches(diagnostic.severity, &diagnostic.identifier))
        })
        .map(|diagnostic| (*diagnostic).clone())
        .collect::<Vec<_>>();

    let outcome = if unsatisfied.is_empty() && unexpected.is_empty() {
        MatchOutcome::Pass
    } else {
        MatchOutcome::Fail
    };
    MatchResult {
        testcase_id: testcase_id.to_string(),
        outcome,
        unsatisfied,
        unexpected,
        considered: considered.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::ErrorLevel;

    fn diagnostic(severity: ErrorLevel, identifier: &str) -> Diagnostic {
        Diagnostic {
            severity,
            identifier: identifier.to_string(),
            message: String::new(),
        }
    }

    fn constraint(count: i64, level: ErrorLevel, pattern: &str) -> Constraint {
        Constraint::new(count, level, pattern).expect("valid constraint")
    }

    fn ignore(levels: &[ErrorLevel]) -> LevelSet {
        levels.iter().copied().collect()
    }

    #[test]
    fn vacuous_success_without_constraints_or_diagnostics() {
        let constraints: [Constraint; 0] = [];
        let result = evaluate("tc", &[], &constraints, &ignore(&[ErrorLevel::Ok]));
        assert!(result.passed());
        assert_eq!(result.considered, 0);
    }

    #[test]
    fn ignored_diagnostics_never_count() {
        let diagnostics = [diagnostic(ErrorLevel::Ok, "info")];
        let constraints: [Constraint; 0] = [];
        let result = evaluate("tc", &diagnostics, &constraints, &ignore(&[ErrorLevel::Ok]));
        assert!(result.passed());
    }

    #[test]
    fn single_wildcard_constraint_needs_exactly_one_diagnostic() {
        let constraints = [constraint(1, ErrorLevel::Error, "*")];
        let levels = ignore(&[ErrorLevel::Ok]);

        let one = [diagnostic(ErrorLevel::Error, "a")];
        assert!(evaluate("tc", &one, &constraints, &levels).passed());

        let none: [Diagnostic; 0] = [];
        let result = evaluate("tc", &none, &constraints, &levels);
        assert!(!result.passed());
        assert_eq!(result.unsatisfied[0].actual, 0);

        let two = [
            diagnostic(ErrorLevel::Error, "a"),
            diagnostic(ErrorLevel::Error, "b"),
        ];
        let result = evaluate("tc", &two, &constraints, &levels);
        assert!(!result.passed());
        assert_eq!(result.unsatisfied[0].actual, 2);
        assert!(result.unexpected.is_empty());
    }

    #[test]
    fn unexpected_diagnostic_fails_even_when_constraints_balance() {
        let constraints = [constraint(1, ErrorLevel::Error, "calc:*")];
        let diagnostics = [
            diagnostic(ErrorLevel::Error, "calc:sum"),
            diagnostic(ErrorLevel::Error, "dim:member"),
        ];
        let result = evaluate("tc", &diagnostics, &constraints, &ignore(&[ErrorLevel::Ok]));
        assert!(!result.passed());
        assert!(result.unsatisfied.is_empty());
        assert_eq!(result.unexpected, vec![diagnostics[1].clone()]);
    }

    #[test]
    fn level_must_match_for_coverage() {
        let constraints = [constraint(0, ErrorLevel::Error, "*")];
        let diagnostics = [diagnostic(ErrorLevel::Warning, "w")];
        let result = evaluate("tc", &diagnostics, &constraints, &ignore(&[ErrorLevel::Ok]));
        assert!(!result.passed());
        assert!(result.unsatisfied.is_empty());
        assert_eq!(result.unexpected.len(), 1);
    }

    #[test]
    fn matching_is_not_consuming() {
        let constraints = [
            constraint(1, ErrorLevel::Error, "*"),
            constraint(1, ErrorLevel::Error, "calc:*"),
        ];
        let diagnostics = [diagnostic(ErrorLevel::Error, "calc:sum")];
        let result = evaluate("tc", &diagnostics, &constraints, &ignore(&[ErrorLevel::Ok]));
        assert!(result.passed(), "{result:?}");
    }

    #[test]
    fn ignored_levels_drop_matching_constraints_too() {
        let constraints = [
            constraint(1, ErrorLevel::Ok, "*"),
            constraint(2, ErrorLevel::Warning, "1.2.3"),
        ];
        let diagnostics = [
            diagnostic(ErrorLevel::Ok, "loaded"),
            diagnostic(ErrorLevel::Warning, "1.2.3"),
        ];
        let result = evaluate(
            "testcase1",
            &diagnostics,
            &constraints,
            &ignore(&[ErrorLevel::Warning]),
        );
        assert!(result.passed(), "{result:?}");
        assert_eq!(result.considered, 1);
    }

    #[test]
    fn unsatisfied_constraints_keep_declared_order() {
        let constraints = [
            constraint(2, ErrorLevel::Error, "b"),
            constraint(1, ErrorLevel::Error, "a"),
        ];
        let result = evaluate("tc", &[], &constraints, &ignore(&[]));
        let patterns: Vec<&str> = result
            .unsatisfied
            .iter()
            .map(|entry| entry.constraint.pattern())
            .collect();
        assert_eq!(patterns, vec!["b", "a"]);
    }
}
