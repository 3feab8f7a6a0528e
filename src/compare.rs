//! Stage-specific comparison rules.
//!
//! Every comparator is a pure function of the fixture and the actual result.
//! [`compare`] dispatches on the fixture's stage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapter::{CodeDescription, ExecutionOutcome, StageResult};
use crate::fixture::{CodePredicate, Expectation, Fixture, TokenDescriptor};

/// Verdict of a comparator. `message` is empty when `passed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub passed: bool,
    pub message: String,
}

impl Comparison {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Compares `actual` against the fixture's expectation.
///
/// A crash never satisfies any expectation, not even an expected rejection.
pub fn compare(fixture: &Fixture, actual: &StageResult) -> Comparison {
    match (&fixture.expected, actual) {
        (_, StageResult::Crashed(reason)) => Comparison::fail(format!("compiler crashed: {}", reason)),
        (Expectation::Tokens(expected), StageResult::Tokens(actual)) => compare_tokens(expected, actual),
        (Expectation::Ast(expected), StageResult::Ast(actual)) => compare_ast(expected, actual),
        (Expectation::Diagnostic(expected), StageResult::Diagnostic(actual)) => {
            compare_diagnostic(fixture.expect_failure, expected.as_deref(), actual.as_deref())
        }
        (Expectation::Code(predicates), StageResult::Code(code)) => compare_code(predicates, code),
        (Expectation::ExitCode(expected), StageResult::Execution(outcome)) => {
            compare_execution(*expected, outcome)
        }
        (_, StageResult::Diagnostic(Some(diagnostic))) => {
            Comparison::fail(format!("{} stage rejected the input: \"{}\"", fixture.stage, diagnostic))
        }
        (expected, actual) => Comparison::fail(format!(
            "cannot compare a {} expectation with a {} result",
            expected.stage(),
            actual.shape()
        )),
    }
}

// =============================================================================
// LEXICAL
// =============================================================================

pub fn compare_tokens(expected: &[TokenDescriptor], actual: &[TokenDescriptor]) -> Comparison {
    for (index, (want, got)) in expected.iter().zip(actual).enumerate() {
        if !want.accepts(got) {
            return Comparison::fail(format!(
                "token mismatch at index {}: expected {}, got {}",
                index, want, got
            ));
        }
    }
    if expected.len() != actual.len() {
        let shared = expected.len().min(actual.len());
        let next = match (expected.get(shared), actual.get(shared)) {
            (Some(missing), None) => format!("missing {}", missing),
            (None, Some(extra)) => format!("unexpected {}", extra),
            _ => String::new(),
        };
        return Comparison::fail(format!(
            "expected {} tokens, got {} ({} at index {})",
            expected.len(),
            actual.len(),
            next,
            shared
        ));
    }
    Comparison::pass()
}

// =============================================================================
// SYNTACTIC
// =============================================================================

static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static AROUND_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*([()\[\]])\s*").expect("valid regex"));
static AROUND_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").expect("valid regex"));

/// Canonical form of an AST description. Brackets carry no surrounding
/// whitespace and every comma is followed by exactly one space.
pub fn canonicalize_ast(description: &str) -> String {
    let collapsed = SPACE.replace_all(description.trim(), " ");
    let tight = AROUND_BRACKET.replace_all(&collapsed, "$1");
    AROUND_COMMA.replace_all(&tight, ", ").into_owned()
}

pub fn compare_ast(expected: &str, actual: &str) -> Comparison {
    let expected = canonicalize_ast(expected);
    let actual = canonicalize_ast(actual);
    if expected == actual {
        return Comparison::pass();
    }
    let column = expected
        .chars()
        .zip(actual.chars())
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected.chars().count().min(actual.chars().count()));
    Comparison::fail(format!(
        "AST mismatch at column {}\n  expected: {}\n  actual:   {}",
        column, expected, actual
    ))
}

// =============================================================================
// SEMANTIC
// =============================================================================

/// Semantic acceptance rule.
///
/// Without `expect_failure` any diagnostic fails. With it, a missing
/// diagnostic fails and an expected text must occur, case-insensitively,
/// inside the actual diagnostic.
pub fn compare_diagnostic(expect_failure: bool, expected: Option<&str>, actual: Option<&str>) -> Comparison {
    match (expect_failure, actual) {
        (false, None) => Comparison::pass(),
        (false, Some(actual)) => Comparison::fail(format!("unexpected diagnostic: \"{}\"", actual)),
        (true, None) => Comparison::fail("expected diagnostic, got none"),
        (true, Some(actual)) => match expected {
            None => Comparison::pass(),
            Some(expected) if actual.to_lowercase().contains(&expected.to_lowercase()) => {
                Comparison::pass()
            }
            Some(expected) => Comparison::fail(format!(
                "expected diagnostic containing \"{}\", got \"{}\"",
                expected, actual
            )),
        },
    }
}

// =============================================================================
// CODE GENERATION
// =============================================================================

pub fn compare_code(predicates: &[CodePredicate], code: &CodeDescription) -> Comparison {
    let unmet: Vec<String> = predicates
        .iter()
        .filter(|predicate| !predicate.holds(code))
        .map(|predicate| format!("{} (found {})", predicate, predicate.observed(code)))
        .collect();
    if unmet.is_empty() {
        Comparison::pass()
    } else {
        Comparison::fail(format!("unmet code predicates: {}", unmet.join("; ")))
    }
}

// =============================================================================
// INTEGRATION
// =============================================================================

pub fn compare_execution(expected: i64, outcome: &ExecutionOutcome) -> Comparison {
    if let Some(reason) = &outcome.abnormal {
        return Comparison::fail(format!("program terminated abnormally: {}", reason));
    }
    match outcome.return_value {
        Some(actual) if actual == expected => Comparison::pass(),
        Some(actual) => Comparison::fail(format!("expected return value {}, got {}", expected, actual)),
        None => Comparison::fail(format!("expected return value {}, got none", expected)),
    }
}
