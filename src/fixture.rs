//! Fixture definitions.
//!
//! A [`Fixture`] is a named, immutable test case bound to one [`Stage`].
//! Its [`Expectation`] is stage-typed: the registry rejects fixtures whose
//! expectation shape does not belong to their stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::adapter::CodeDescription;
use crate::errors::{HarnessError, Result};
use crate::stage::Stage;

// =============================================================================
// TOKEN DESCRIPTORS
// =============================================================================

/// A lexer token as `KIND` or `KIND(literal)`.
///
/// When used as an expectation, a descriptor without a literal matches any
/// token of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenDescriptor {
    pub kind: String,
    pub literal: Option<String>,
}

impl TokenDescriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            literal: None,
        }
    }

    pub fn with_literal(kind: impl Into<String>, literal: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            literal: Some(literal.into()),
        }
    }

    /// Whether `actual` satisfies this descriptor taken as an expectation.
    pub fn accepts(&self, actual: &TokenDescriptor) -> bool {
        self.kind == actual.kind
            && match &self.literal {
                Some(literal) => actual.literal.as_deref() == Some(literal.as_str()),
                None => true,
            }
    }
}

impl fmt::Display for TokenDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Some(literal) => write!(f, "{}({})", self.kind, literal),
            None => f.write_str(&self.kind),
        }
    }
}

impl FromStr for TokenDescriptor {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, literal) = match s.find('(') {
            Some(open) => {
                let Some(inner) = s[open + 1..].strip_suffix(')') else {
                    return Err(HarnessError::InvalidToken(s.to_string()));
                };
                (&s[..open], Some(inner.to_string()))
            }
            None => (s, None),
        };
        let valid_kind = !kind.is_empty()
            && kind
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_kind {
            return Err(HarnessError::InvalidToken(s.to_string()));
        }
        Ok(Self {
            kind: kind.to_string(),
            literal,
        })
    }
}

impl TryFrom<String> for TokenDescriptor {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TokenDescriptor> for String {
    fn from(token: TokenDescriptor) -> Self {
        token.to_string()
    }
}

// =============================================================================
// CODE PREDICATES
// =============================================================================

/// A structural assertion over generated code.
///
/// Predicates are checked against a [`CodeDescription`] rather than raw
/// assembly text, so incidental formatting of the output never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CodePredicate {
    /// `returns <int>`: some return site yields this literal.
    ReturnsLiteral(i64),
    /// `allocates-stack`
    AllocatesStack,
    /// `branches`: at least one conditional jump.
    BranchesConditionally,
    /// `calls <name>`
    Calls(String),
    /// `max-instructions <n>`
    MaxInstructions(usize),
}

impl CodePredicate {
    pub fn holds(&self, code: &CodeDescription) -> bool {
        match self {
            CodePredicate::ReturnsLiteral(value) => code.return_literals.contains(value),
            CodePredicate::AllocatesStack => code.stack_slots > 0,
            CodePredicate::BranchesConditionally => code.conditional_branches > 0,
            CodePredicate::Calls(name) => code.calls.iter().any(|c| c == name),
            CodePredicate::MaxInstructions(max) => code.instruction_count <= *max,
        }
    }

    /// What the description actually shows for this predicate, for failure messages.
    pub fn observed(&self, code: &CodeDescription) -> String {
        match self {
            CodePredicate::ReturnsLiteral(_) => format!("return literals {:?}", code.return_literals),
            CodePredicate::AllocatesStack => format!("{} stack slots", code.stack_slots),
            CodePredicate::BranchesConditionally => {
                format!("{} conditional branches", code.conditional_branches)
            }
            CodePredicate::Calls(_) => format!("calls {:?}", code.calls),
            CodePredicate::MaxInstructions(_) => format!("{} instructions", code.instruction_count),
        }
    }
}

impl fmt::Display for CodePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodePredicate::ReturnsLiteral(value) => write!(f, "returns {}", value),
            CodePredicate::AllocatesStack => f.write_str("allocates-stack"),
            CodePredicate::BranchesConditionally => f.write_str("branches"),
            CodePredicate::Calls(name) => write!(f, "calls {}", name),
            CodePredicate::MaxInstructions(max) => write!(f, "max-instructions {}", max),
        }
    }
}

impl FromStr for CodePredicate {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HarnessError::InvalidPredicate(s.to_string());
        let mut words = s.split_whitespace();
        let head = words.next().ok_or_else(invalid)?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(invalid());
        }
        match (head, arg) {
            ("returns", Some(value)) => value
                .parse()
                .map(CodePredicate::ReturnsLiteral)
                .map_err(|_| invalid()),
            ("allocates-stack", None) => Ok(CodePredicate::AllocatesStack),
            ("branches", None) => Ok(CodePredicate::BranchesConditionally),
            ("calls", Some(name)) => Ok(CodePredicate::Calls(name.to_string())),
            ("max-instructions", Some(max)) => max
                .parse()
                .map(CodePredicate::MaxInstructions)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for CodePredicate {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CodePredicate> for String {
    fn from(predicate: CodePredicate) -> Self {
        predicate.to_string()
    }
}

// =============================================================================
// EXPECTATIONS AND FIXTURES
// =============================================================================

/// Stage-typed expected value of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    Tokens(Vec<TokenDescriptor>),
    /// Canonical description of the parse tree.
    Ast(String),
    /// Expected diagnostic text; `None` means no particular text.
    Diagnostic(Option<String>),
    Code(Vec<CodePredicate>),
    /// Expected program return value.
    ExitCode(i64),
}

impl Expectation {
    /// The stage this expectation shape belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Expectation::Tokens(_) => Stage::Lexical,
            Expectation::Ast(_) => Stage::Syntactic,
            Expectation::Diagnostic(_) => Stage::Semantic,
            Expectation::Code(_) => Stage::CodeGen,
            Expectation::ExitCode(_) => Stage::Integration,
        }
    }
}

/// A named, immutable test case bound to one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fixture {
    pub stage: Stage,
    pub name: String,
    pub input: String,
    pub expected: Expectation,
    /// Semantic fixtures only: the analyzer must reject the input.
    pub expect_failure: bool,
}

impl Fixture {
    pub fn lexical(name: impl Into<String>, input: impl Into<String>, tokens: Vec<TokenDescriptor>) -> Self {
        Self::build(Stage::Lexical, name, input, Expectation::Tokens(tokens), false)
    }

    pub fn syntactic(name: impl Into<String>, input: impl Into<String>, ast: impl Into<String>) -> Self {
        Self::build(Stage::Syntactic, name, input, Expectation::Ast(ast.into()), false)
    }

    /// A semantic fixture that must be accepted without any diagnostic.
    pub fn semantic_ok(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self::build(Stage::Semantic, name, input, Expectation::Diagnostic(None), false)
    }

    /// A semantic fixture that must be rejected with a diagnostic containing `message`.
    pub fn semantic_error(
        name: impl Into<String>,
        input: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::build(
            Stage::Semantic,
            name,
            input,
            Expectation::Diagnostic(Some(message.into())),
            true,
        )
    }

    /// A semantic fixture that must be rejected with any diagnostic.
    pub fn semantic_rejects(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self::build(Stage::Semantic, name, input, Expectation::Diagnostic(None), true)
    }

    pub fn codegen(name: impl Into<String>, input: impl Into<String>, predicates: Vec<CodePredicate>) -> Self {
        Self::build(Stage::CodeGen, name, input, Expectation::Code(predicates), false)
    }

    pub fn integration(name: impl Into<String>, input: impl Into<String>, exit_code: i64) -> Self {
        Self::build(Stage::Integration, name, input, Expectation::ExitCode(exit_code), false)
    }

    /// Builds a fixture without checking it; the registry validates on registration.
    pub fn build(
        stage: Stage,
        name: impl Into<String>,
        input: impl Into<String>,
        expected: Expectation,
        expect_failure: bool,
    ) -> Self {
        Self {
            stage,
            name: name.into(),
            input: input.into(),
            expected,
            expect_failure,
        }
    }

    /// Checks that the expectation is coherent with the stage.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::invalid_fixture(&self.name, "name must not be empty"));
        }
        if self.expected.stage() != self.stage {
            return Err(HarnessError::invalid_fixture(
                &self.name,
                format!(
                    "{} fixture carries a {} expectation",
                    self.stage,
                    self.expected.stage()
                ),
            ));
        }
        if self.expect_failure && self.stage != Stage::Semantic {
            return Err(HarnessError::invalid_fixture(
                &self.name,
                "expect_failure is only meaningful for semantic fixtures",
            ));
        }
        if let Expectation::Diagnostic(Some(_)) = &self.expected {
            if !self.expect_failure {
                return Err(HarnessError::invalid_fixture(
                    &self.name,
                    "an expected diagnostic requires expect_failure: true",
                ));
            }
        }
        Ok(())
    }
}
