//! Deterministic, stage-by-stage conformance harness for the Kayte C
//! compiler pipeline.
//!
//! Fixtures live in a [`FixtureRegistry`], are run by a [`TestRunner`]
//! through one [`StageAdapter`] per [`Stage`], judged by the comparators in
//! [`compare`], and folded into a [`SuiteReport`].

pub mod adapter;
pub mod builtin;
pub mod cli;
pub mod compare;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod fixture;
pub mod registry;
pub mod report;
pub mod runner;
pub mod stage;

pub use crate::adapter::{AdapterFault, AdapterSet, CommandAdapter, FnAdapter, StageAdapter, StageResult};
pub use crate::errors::{HarnessError, Result};
pub use crate::fixture::{Expectation, Fixture};
pub use crate::registry::FixtureRegistry;
pub use crate::report::{Outcome, StageReport, SuiteReport, Verdict};
pub use crate::runner::{CancelToken, RunOptions, TestRunner};
pub use crate::stage::Stage;

/// Everything needed to define fixtures and drive a run.
pub mod prelude {
    pub use crate::adapter::{
        AdapterFault, AdapterSet, CodeDescription, CommandAdapter, ExecutionOutcome, FnAdapter,
        StageAdapter, StageResult,
    };
    pub use crate::errors::{HarnessError, Result};
    pub use crate::fixture::{CodePredicate, Expectation, Fixture, TokenDescriptor};
    pub use crate::registry::FixtureRegistry;
    pub use crate::report::{Outcome, StageReport, SuiteReport, Verdict};
    pub use crate::runner::{CancelToken, RunOptions, TestRunner};
    pub use crate::stage::Stage;
}
