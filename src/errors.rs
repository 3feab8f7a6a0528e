//! Harness error taxonomy.
//!
//! Only setup errors live here: registry construction, fixture loading,
//! configuration. Everything that goes wrong while a fixture runs is
//! captured as an [`Outcome`](crate::report::Outcome) instead and never
//! escapes the runner.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::stage::Stage;

/// Result alias used throughout the crate.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Setup-time failures. These are the only errors allowed to abort a run.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("fixture '{name}' is already registered for the {stage} stage")]
    #[diagnostic(
        code(kcc::registry::duplicate),
        help("fixture names must be unique within a stage")
    )]
    DuplicateFixture { stage: Stage, name: String },

    #[error("fixture '{name}' is invalid: {reason}")]
    #[diagnostic(code(kcc::fixture::invalid))]
    InvalidFixture { name: String, reason: String },

    #[error("invalid token descriptor '{0}'")]
    #[diagnostic(
        code(kcc::fixture::token),
        help("write tokens as KIND or KIND(literal), e.g. IDENTIFIER(x)")
    )]
    InvalidToken(String),

    #[error("invalid code predicate '{0}'")]
    #[diagnostic(
        code(kcc::fixture::predicate),
        help("expected one of: returns <int>, allocates-stack, branches, calls <name>, max-instructions <n>")
    )]
    InvalidPredicate(String),

    #[error("unknown stage '{0}'")]
    #[diagnostic(
        code(kcc::stage::unknown),
        help("stages are: lexical, syntactic, semantic, codegen, integration")
    )]
    UnknownStage(String),

    #[error("fixture registry is already initialized")]
    #[diagnostic(
        code(kcc::registry::initialized),
        help("call registry::reset() before installing a new registry")
    )]
    RegistryInitialized,

    #[error("failed to read '{}'", path.display())]
    #[diagnostic(code(kcc::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}'", path.display())]
    #[diagnostic(code(kcc::fixture::parse))]
    FixtureParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to walk fixture directory")]
    #[diagnostic(code(kcc::fixture::walk))]
    Walk(#[from] walkdir::Error),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(kcc::config))]
    Config(String),

    #[error("failed to serialize report")]
    #[diagnostic(code(kcc::report))]
    Report(#[from] serde_json::Error),

    #[error("failed to write output")]
    #[diagnostic(code(kcc::output))]
    Output(#[source] std::io::Error),
}

impl HarnessError {
    pub(crate) fn invalid_fixture(name: &str, reason: impl Into<String>) -> Self {
        HarnessError::InvalidFixture {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
