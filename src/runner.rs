//! Test runner: drives every registered fixture through its stage adapter.
//!
//! Stages run in declaration order and fixtures in registration order. No
//! fixture can abort the run: adapter faults, adapter panics, contract
//! violations and timeouts all become `Errored` outcomes, and only the
//! outcome of the fixture concerned.
//!
//! Each adapter invocation runs on its own thread and is awaited for at
//! most [`RunOptions::timeout`], measured from the moment the adapter is
//! called. The adapter is told the same deadline through
//! [`StageAdapter::run_within`]; one that cannot stop early is abandoned and
//! its thread keeps running in the background until the adapter returns.
//!
//! Calls to a non-reentrant adapter are serialized by a per-stage gate that
//! the caller holds for the whole call, so time spent queueing for the gate
//! never counts against the timeout. While an abandoned call of such an
//! adapter is still running, the next call first waits up to one timeout for
//! it and otherwise errors with [`AdapterFault::Busy`] without calling the
//! adapter again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::adapter::{panic_message, AdapterFault, AdapterSet, StageAdapter, StageResult};
use crate::compare::compare;
use crate::fixture::Fixture;
use crate::registry::FixtureRegistry;
use crate::report::{Outcome, StageReport, SuiteReport};
use crate::stage::Stage;

/// Name prefix of the threads that call into adapters.
pub const INVOCATION_THREAD_PREFIX: &str = "kcc-call-";

/// Extra wait after a timeout for an adapter that stops at its deadline.
const CLEANUP_GRACE: Duration = Duration::from_millis(50);

/// Execution knobs that never influence the content of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Upper bound for a single adapter invocation.
    pub timeout: Duration,
    /// 1 runs sequentially; more runs the fixtures of a stage on a pool.
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            workers: 1,
        }
    }
}

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Checked before each fixture starts; running invocations are not
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Reply = mpsc::Receiver<Result<StageResult, AdapterFault>>;

/// Runs fixtures against a set of stage adapters.
pub struct TestRunner {
    adapters: AdapterSet,
    options: RunOptions,
    /// One gate per stage, held around calls to non-reentrant adapters. It
    /// keeps the reply channel of a call that was abandoned on timeout.
    gates: [Mutex<Option<Reply>>; 5],
}

impl TestRunner {
    pub fn new(adapters: AdapterSet, options: RunOptions) -> Self {
        Self {
            adapters,
            options,
            gates: Default::default(),
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    /// Runs every fixture of `registry` to completion.
    pub fn run(&self, registry: &FixtureRegistry) -> SuiteReport {
        self.run_with_cancel(registry, &CancelToken::new())
    }

    /// Runs until done or until `cancel` fires. A cancelled run still
    /// returns a report: every produced outcome is kept, skipped fixtures
    /// are counted as not run and the report is marked incomplete.
    pub fn run_with_cancel(&self, registry: &FixtureRegistry, cancel: &CancelToken) -> SuiteReport {
        let pool = self.build_pool();
        let reports: Vec<StageReport> = Stage::ALL
            .into_iter()
            .map(|stage| self.run_stage_on(registry, stage, cancel, pool.as_ref()))
            .collect();
        let suite = SuiteReport::from_stage_reports(reports);
        info!(
            passed = suite.total_passed(),
            total = suite.total_count(),
            complete = suite.is_complete(),
            "suite finished"
        );
        suite
    }

    /// Runs the fixtures of a single stage.
    pub fn run_stage(&self, registry: &FixtureRegistry, stage: Stage, cancel: &CancelToken) -> StageReport {
        let pool = self.build_pool();
        self.run_stage_on(registry, stage, cancel, pool.as_ref())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(stage = %stage))]
    fn run_stage_on(
        &self,
        registry: &FixtureRegistry,
        stage: Stage,
        cancel: &CancelToken,
        pool: Option<&rayon::ThreadPool>,
    ) -> StageReport {
        let fixtures: Vec<&Arc<Fixture>> = registry.all_fixtures(stage).collect();

        // Slots are indexed by registration position, so the report order
        // does not depend on completion order.
        let slots: Vec<Option<Outcome>> = match pool {
            Some(pool) if fixtures.len() > 1 => pool.install(|| {
                fixtures
                    .par_iter()
                    .map(|fixture| self.run_unless_cancelled(fixture, cancel))
                    .collect()
            }),
            _ => fixtures
                .iter()
                .map(|fixture| self.run_unless_cancelled(fixture, cancel))
                .collect(),
        };

        let not_run = slots.iter().filter(|slot| slot.is_none()).count();
        let outcomes: Vec<Outcome> = slots.into_iter().flatten().collect();
        let report = StageReport::partial(stage, outcomes, not_run);
        info!(
            passed = report.passed_count(),
            total = report.total(),
            not_run,
            "stage finished"
        );
        report
    }

    fn run_unless_cancelled(&self, fixture: &Arc<Fixture>, cancel: &CancelToken) -> Option<Outcome> {
        if cancel.is_cancelled() {
            debug!(fixture = %fixture.name, "skipped after cancellation");
            return None;
        }
        Some(self.run_fixture(fixture))
    }

    /// Runs one fixture and classifies the result.
    pub fn run_fixture(&self, fixture: &Arc<Fixture>) -> Outcome {
        let stage = fixture.stage;
        let result = match self.adapters.get(stage) {
            Some(adapter) => self.invoke(stage, adapter, &fixture.input),
            None => Err(AdapterFault::Missing(stage)),
        };

        let actual = match result {
            Ok(actual) => actual,
            Err(fault) => {
                warn!(stage = %stage, fixture = %fixture.name, error = %fault, "fixture errored");
                return Outcome::error(Arc::clone(fixture), None, fault.to_string());
            }
        };
        if let Err(fault) = actual.check_shape(stage) {
            warn!(stage = %stage, fixture = %fixture.name, error = %fault, "fixture errored");
            return Outcome::error(Arc::clone(fixture), Some(actual), fault.to_string());
        }

        let comparison = compare(fixture, &actual);
        if comparison.passed {
            Outcome::pass(Arc::clone(fixture), actual)
        } else {
            debug!(stage = %stage, fixture = %fixture.name, message = %comparison.message, "fixture failed");
            Outcome::fail(Arc::clone(fixture), actual, comparison.message)
        }
    }

    /// Calls `adapter`, bounded by the timeout.
    fn invoke(
        &self,
        stage: Stage,
        adapter: &Arc<dyn StageAdapter>,
        input: &str,
    ) -> Result<StageResult, AdapterFault> {
        if adapter.is_reentrant() {
            let reply = self.spawn_call(stage, adapter, input)?;
            return self.await_reply(&reply);
        }

        let mut abandoned = self.gates[stage.index()].lock();
        if let Some(reply) = abandoned.take() {
            match reply.recv_timeout(self.options.timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    *abandoned = Some(reply);
                    return Err(AdapterFault::Busy(stage));
                }
                _ => debug!(stage = %stage, "abandoned call returned"),
            }
        }
        let reply = self.spawn_call(stage, adapter, input)?;
        let result = self.await_reply(&reply);
        if matches!(result, Err(AdapterFault::TimedOut)) {
            *abandoned = Some(reply);
        }
        result
    }

    /// Starts `adapter` on a dedicated thread.
    fn spawn_call(&self, stage: Stage, adapter: &Arc<dyn StageAdapter>, input: &str) -> Result<Reply, AdapterFault> {
        let adapter = Arc::clone(adapter);
        let input = input.to_owned();
        let timeout = self.options.timeout;
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name(format!("{}{}", INVOCATION_THREAD_PREFIX, stage))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| adapter.run_within(&input, timeout)))
                    .unwrap_or_else(|payload| Err(AdapterFault::Panicked(panic_message(payload.as_ref()))));
                // A send error only means the runner stopped waiting.
                let _ = tx.send(result);
            })
            .map_err(|e| AdapterFault::Unavailable(format!("failed to spawn invocation thread: {}", e)))?;
        Ok(rx)
    }

    /// Waits for the reply. A reply arriving after the timeout is discarded,
    /// but the adapter gets [`CLEANUP_GRACE`] to release what it holds.
    fn await_reply(&self, reply: &Reply) -> Result<StageResult, AdapterFault> {
        match reply.recv_timeout(self.options.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if reply.recv_timeout(CLEANUP_GRACE).is_ok() {
                    debug!("late reply discarded");
                }
                Err(AdapterFault::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(AdapterFault::Panicked("invocation thread exited without a result".into()))
            }
        }
    }

    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        if self.options.workers <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("kcc-worker-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("failed to create thread pool ({}), running sequentially", e);
                None
            }
        }
    }
}
