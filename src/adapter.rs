//! The Stage Adapter contract.
//!
//! An adapter maps a source string to a stage-specific [`StageResult`] by
//! calling into the compiler under test. It is the harness's failure
//! isolation boundary: a crashing compiler must come back as
//! [`StageResult::Crashed`], never as an unwinding panic. A crash always fails
//! its fixture, including fixtures that expect the input to be rejected.
//! `Err(AdapterFault)` is reserved for faults of the harness side of the
//! boundary (missing binary, unreadable output, contract violations).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fixture::TokenDescriptor;
use crate::stage::Stage;

pub mod command;

pub use command::CommandAdapter;

// =============================================================================
// STAGE RESULTS
// =============================================================================

/// Structural description of generated code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeDescription {
    /// Literal values returned by return sites, in emission order.
    pub return_literals: Vec<i64>,
    pub stack_slots: usize,
    pub conditional_branches: usize,
    /// Names of called functions, in emission order.
    pub calls: Vec<String>,
    pub instruction_count: usize,
}

/// What happened when the generated program was executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub return_value: Option<i64>,
    /// Abnormal termination (signal, crash), if any.
    pub abnormal: Option<String>,
}

impl ExecutionOutcome {
    pub fn returned(value: i64) -> Self {
        Self {
            return_value: Some(value),
            abnormal: None,
        }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            return_value: None,
            abnormal: Some(reason.into()),
        }
    }
}

/// The actual result produced by a stage for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StageResult {
    Tokens(Vec<TokenDescriptor>),
    Ast(String),
    Diagnostic(Option<String>),
    Code(CodeDescription),
    Execution(ExecutionOutcome),
    /// The compiler itself crashed (panic, fatal signal) before answering.
    Crashed(String),
}

impl StageResult {
    /// The stage whose native shape this is. A crash belongs to no stage.
    pub fn native_stage(&self) -> Option<Stage> {
        match self {
            StageResult::Tokens(_) => Some(Stage::Lexical),
            StageResult::Ast(_) => Some(Stage::Syntactic),
            StageResult::Diagnostic(_) => Some(Stage::Semantic),
            StageResult::Code(_) => Some(Stage::CodeGen),
            StageResult::Execution(_) => Some(Stage::Integration),
            StageResult::Crashed(_) => None,
        }
    }

    /// Short name of the result shape, for messages.
    pub fn shape(&self) -> &'static str {
        self.native_stage().map_or("crash", Stage::as_str)
    }

    pub fn diagnostic(message: impl Into<String>) -> Self {
        StageResult::Diagnostic(Some(message.into()))
    }

    /// Checks the output-shape contract for `stage`.
    ///
    /// Every stage may answer with its native shape, with a diagnostic
    /// rejecting the input, or with a crash.
    pub fn check_shape(&self, stage: Stage) -> Result<(), AdapterFault> {
        let rejected = matches!(self, StageResult::Diagnostic(Some(_)));
        match self.native_stage() {
            Some(native) if native != stage && !rejected => Err(AdapterFault::ContractViolation {
                stage,
                returned: native,
            }),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// FAULTS
// =============================================================================

/// A fault on the harness side of the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterFault {
    #[error("adapter panicked: {0}")]
    Panicked(String),
    #[error("contract violation: {stage} adapter returned a {returned} result")]
    ContractViolation { stage: Stage, returned: Stage },
    #[error("compiler unavailable: {0}")]
    Unavailable(String),
    #[error("malformed compiler output: {0}")]
    MalformedOutput(String),
    #[error("timed out")]
    TimedOut,
    #[error("{0} adapter is still busy with an abandoned call")]
    Busy(Stage),
    #[error("no adapter registered for the {0} stage")]
    Missing(Stage),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// ADAPTERS
// =============================================================================

/// Uniform invocation contract for one pipeline stage.
pub trait StageAdapter: Send + Sync {
    fn run(&self, input: &str) -> Result<StageResult, AdapterFault>;

    /// Like [`run`](Self::run), for a caller that stops waiting after
    /// `timeout`. Adapters that own external resources override this to
    /// release them once the deadline has passed.
    fn run_within(&self, input: &str, _timeout: Duration) -> Result<StageResult, AdapterFault> {
        self.run(input)
    }

    /// Whether concurrent calls are safe. Non-reentrant adapters are
    /// serialized by the runner.
    fn is_reentrant(&self) -> bool {
        false
    }
}

/// Adapter over an in-process compiler stage given as a closure.
///
/// A panic inside the closure is the compiler crashing and comes back as
/// [`StageResult::Crashed`].
pub struct FnAdapter<F> {
    stage: Stage,
    reentrant: bool,
    collaborator: F,
}

impl<F> FnAdapter<F>
where
    F: Fn(&str) -> StageResult + Send + Sync,
{
    pub fn new(stage: Stage, collaborator: F) -> Self {
        Self {
            stage,
            reentrant: false,
            collaborator,
        }
    }

    /// Declares that the collaborator tolerates concurrent calls.
    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }
}

impl<F> StageAdapter for FnAdapter<F>
where
    F: Fn(&str) -> StageResult + Send + Sync,
{
    fn run(&self, input: &str) -> Result<StageResult, AdapterFault> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.collaborator)(input)));
        Ok(result.unwrap_or_else(|payload| {
            let reason = panic_message(payload.as_ref());
            tracing::debug!(stage = %self.stage, %reason, "collaborator crashed");
            StageResult::Crashed(reason)
        }))
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

/// One adapter slot per stage, selected by the stage tag.
#[derive(Clone, Default)]
pub struct AdapterSet {
    slots: [Option<Arc<dyn StageAdapter>>; 5],
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `adapter` for `stage`, replacing any previous one.
    pub fn with(mut self, stage: Stage, adapter: impl StageAdapter + 'static) -> Self {
        self.slots[stage.index()] = Some(Arc::new(adapter));
        self
    }

    pub fn insert(&mut self, stage: Stage, adapter: Arc<dyn StageAdapter>) {
        self.slots[stage.index()] = Some(adapter);
    }

    pub fn get(&self, stage: Stage) -> Option<&Arc<dyn StageAdapter>> {
        self.slots[stage.index()].as_ref()
    }

    /// Stages without an adapter, in declaration order.
    pub fn missing(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.get(*stage).is_none())
            .collect()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed: Vec<Stage> = Stage::ALL
            .into_iter()
            .filter(|stage| self.get(*stage).is_some())
            .collect();
        f.debug_struct("AdapterSet").field("installed", &installed).finish()
    }
}
