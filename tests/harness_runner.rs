// Runner behaviour end to end: verdicts, isolation, timeouts, cancellation
// and ordering under parallel execution.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{registry_of, tokens, toy_adapters};
use kcc_conformance::builtin::kayte_registry;
use kcc_conformance::prelude::*;

fn runner(adapters: AdapterSet) -> TestRunner {
    TestRunner::new(adapters, RunOptions::default())
}

// =============================================================================
// VERDICTS
// =============================================================================

#[test]
fn lexical_fixture_passes() {
    let registry = registry_of(vec![Fixture::lexical(
        "declaration",
        "int x;",
        tokens("INT IDENTIFIER(x) SEMICOLON"),
    )]);
    let report = runner(toy_adapters()).run(&registry);
    let lexical = report.stage(Stage::Lexical);
    assert_eq!(lexical.total(), 1);
    assert_eq!(lexical.outcomes()[0].verdict(), Verdict::Passed);
    assert_eq!(lexical.outcomes()[0].message(), "");
}

#[test]
fn diagnostic_wording_drift_fails_quoting_both() {
    let registry = registry_of(vec![Fixture::semantic_error(
        "Redeclaration Error",
        "int x; int x;",
        "Variable 'x' already declared",
    )]);
    let adapters = AdapterSet::new().with(
        Stage::Semantic,
        FnAdapter::new(Stage::Semantic, |_: &str| {
            StageResult::diagnostic("redeclaration: 'x' already declared")
        }),
    );
    let report = runner(adapters).run(&registry);
    let outcome = &report.stage(Stage::Semantic).outcomes()[0];
    assert_eq!(outcome.verdict(), Verdict::Failed);
    assert!(outcome.message().contains("Variable 'x' already declared"));
    assert!(outcome.message().contains("redeclaration: 'x' already declared"));
}

#[test]
fn integration_return_value_matches() {
    let registry = registry_of(vec![Fixture::integration("product", "int main(){return 6*7;}", 42)]);
    let report = runner(toy_adapters()).run(&registry);
    assert_eq!(report.stage(Stage::Integration).outcomes()[0].verdict(), Verdict::Passed);
    assert!(report.all_passed());
}

#[test]
fn empty_stages_are_reported_with_zero_rate() {
    let registry = registry_of(vec![Fixture::lexical("semi", ";", tokens("SEMICOLON"))]);
    let report = runner(toy_adapters()).run(&registry);
    let codegen = report.stage(Stage::CodeGen);
    assert_eq!(codegen.total(), 0);
    assert_eq!(codegen.pass_rate(), 0.0);
    assert_eq!(report.stages().len(), 5);
    assert_eq!(report.total_count(), 1);
}

#[test]
fn builtin_suite_passes_against_the_toy_compiler() {
    let registry = kayte_registry().unwrap();
    let report = runner(toy_adapters()).run(&registry);
    for stage in report.stages() {
        for outcome in stage.outcomes() {
            assert!(
                outcome.passed(),
                "{} / {}: {}",
                stage.stage(),
                outcome.fixture().name,
                outcome.message()
            );
        }
    }
    assert_eq!(report.total_count(), 22);
    assert_eq!(report.total_passed(), 22);
    assert_eq!(report.pass_rate(), 1.0);
}

#[test]
fn rejected_input_in_the_parser_is_a_failure() {
    let registry = registry_of(vec![Fixture::syntactic("unknown", "int int int", "VarDecl(int, x)")]);
    let report = runner(toy_adapters()).run(&registry);
    let outcome = &report.stage(Stage::Syntactic).outcomes()[0];
    assert_eq!(outcome.verdict(), Verdict::Failed);
    assert!(outcome.message().starts_with("syntactic stage rejected the input"));
}

#[test]
fn collaborator_crash_is_a_failure_not_an_error() {
    let registry = registry_of(vec![Fixture::codegen(
        "crash",
        "int main(){}",
        vec!["returns 0".parse().unwrap()],
    )]);
    let adapters = AdapterSet::new().with(
        Stage::CodeGen,
        FnAdapter::new(Stage::CodeGen, |_: &str| -> StageResult { panic!("register allocator exploded") }),
    );
    let report = runner(adapters).run(&registry);
    let outcome = &report.stage(Stage::CodeGen).outcomes()[0];
    assert_eq!(outcome.verdict(), Verdict::Failed);
    assert!(outcome.message().contains("compiler crashed: register allocator exploded"));
}

#[test]
fn crashing_checker_does_not_satisfy_an_expected_rejection() {
    let registry = registry_of(vec![Fixture::semantic_rejects("must reject", "int x; int x;")]);
    let adapters = AdapterSet::new().with(
        Stage::Semantic,
        FnAdapter::new(Stage::Semantic, |_: &str| -> StageResult { panic!("null deref in type checker") }),
    );
    let report = runner(adapters).run(&registry);
    let outcome = &report.stage(Stage::Semantic).outcomes()[0];
    assert_eq!(outcome.verdict(), Verdict::Failed);
    assert_eq!(outcome.message(), "compiler crashed: null deref in type checker");
    assert_eq!(
        outcome.actual(),
        Some(&StageResult::Crashed("null deref in type checker".into()))
    );
}

// =============================================================================
// ERRORS AND ISOLATION
// =============================================================================

struct Flaky;

impl StageAdapter for Flaky {
    fn run(&self, input: &str) -> Result<StageResult, AdapterFault> {
        match input {
            "fault" => Err(AdapterFault::Unavailable("compiler binary vanished".into())),
            "panic" => panic!("adapter bug"),
            "shape" => Ok(StageResult::Ast("Return(0)".into())),
            _ => Ok(StageResult::Tokens(common::lex(input))),
        }
    }
}

#[test]
fn faults_are_isolated_to_their_fixture() {
    let registry = registry_of(vec![
        Fixture::lexical("before", "int", tokens("INT")),
        Fixture::lexical("faulty", "fault", tokens("INT")),
        Fixture::lexical("panicky", "panic", tokens("INT")),
        Fixture::lexical("misshapen", "shape", tokens("INT")),
        Fixture::lexical("after", "void", tokens("VOID")),
    ]);
    let report = runner(AdapterSet::new().with(Stage::Lexical, Flaky)).run(&registry);
    let lexical = report.stage(Stage::Lexical);
    let verdicts: Vec<Verdict> = lexical.outcomes().iter().map(Outcome::verdict).collect();
    assert_eq!(
        verdicts,
        [
            Verdict::Passed,
            Verdict::Errored,
            Verdict::Errored,
            Verdict::Errored,
            Verdict::Passed
        ]
    );
    assert_eq!(
        lexical.outcomes()[1].message(),
        "compiler unavailable: compiler binary vanished"
    );
    assert_eq!(lexical.outcomes()[2].message(), "adapter panicked: adapter bug");
    assert_eq!(
        lexical.outcomes()[3].message(),
        "contract violation: lexical adapter returned a syntactic result"
    );
    assert_eq!(lexical.errored_count(), 3);
    assert!(report.is_complete());
}

#[test]
fn missing_adapter_errors_every_fixture_of_the_stage() {
    let registry = registry_of(vec![
        Fixture::lexical("semi", ";", tokens("SEMICOLON")),
        Fixture::codegen("ret", "int main() { return 42; }", vec!["returns 42".parse().unwrap()]),
    ]);
    let report = runner(AdapterSet::new().with(Stage::Lexical, common::lexer())).run(&registry);
    assert!(report.stage(Stage::Lexical).outcomes()[0].passed());
    let codegen = &report.stage(Stage::CodeGen).outcomes()[0];
    assert_eq!(codegen.verdict(), Verdict::Errored);
    assert_eq!(codegen.message(), "no adapter registered for the codegen stage");
}

#[test]
fn slow_invocation_times_out() {
    let registry = registry_of(vec![
        Fixture::integration("hang", "hang", 0),
        Fixture::integration("quick", "int main(){return 42;}", 42),
    ]);
    let adapters = AdapterSet::new().with(
        Stage::Integration,
        FnAdapter::new(Stage::Integration, |input: &str| {
            if input == "hang" {
                thread::sleep(Duration::from_secs(2));
            }
            StageResult::Execution(ExecutionOutcome::returned(42))
        })
        .reentrant(),
    );
    let options = RunOptions {
        timeout: Duration::from_millis(100),
        workers: 1,
    };
    let report = TestRunner::new(adapters, options).run(&registry);
    let outcomes = report.stage(Stage::Integration).outcomes();
    assert_eq!(outcomes[0].verdict(), Verdict::Errored);
    assert_eq!(outcomes[0].message(), "timed out");
    assert!(outcomes[1].passed());
}

// =============================================================================
// DETERMINISM, CANCELLATION, PARALLELISM
// =============================================================================

#[test]
fn identical_runs_produce_identical_reports() {
    let registry = kayte_registry().unwrap();
    let runner = runner(toy_adapters());
    let first = runner.run(&registry);
    let second = runner.run(&registry);
    assert_eq!(first, second);
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
}

#[test]
fn stage_order_does_not_depend_on_registration_order() {
    let registry = registry_of(vec![
        Fixture::integration("late", "int main(){return 42;}", 42),
        Fixture::lexical("early", "int", tokens("INT")),
    ]);
    let report = runner(toy_adapters()).run(&registry);
    let order: Vec<Stage> = report.stages().iter().map(StageReport::stage).collect();
    assert_eq!(order, Stage::ALL.to_vec());
}

#[test]
fn cancellation_yields_a_partial_report() {
    let registry = registry_of(vec![
        Fixture::lexical("first", "int", tokens("INT")),
        Fixture::lexical("second", "void", tokens("VOID")),
        Fixture::lexical("third", ";", tokens("SEMICOLON")),
        Fixture::integration("never", "int main(){return 42;}", 42),
    ]);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let adapters = toy_adapters().with(
        Stage::Lexical,
        FnAdapter::new(Stage::Lexical, move |input: &str| {
            trigger.cancel();
            StageResult::Tokens(common::lex(input))
        }),
    );
    let report = runner(adapters).run_with_cancel(&registry, &cancel);

    assert!(!report.is_complete());
    assert!(!report.all_passed());
    let lexical = report.stage(Stage::Lexical);
    assert_eq!(lexical.total(), 1);
    assert!(lexical.outcomes()[0].passed());
    assert_eq!(lexical.not_run(), 2);
    assert_eq!(report.stage(Stage::Integration).not_run(), 1);
}

#[test]
fn parallel_runs_keep_registration_order() {
    let fixtures: Vec<Fixture> = (0..8)
        .map(|i| Fixture::integration(format!("case-{}", i), i.to_string(), i))
        .collect();
    let registry = registry_of(fixtures);
    let adapter = || {
        FnAdapter::new(Stage::Integration, |input: &str| {
            let value: i64 = input.parse().unwrap_or(0);
            // Earlier fixtures finish last.
            thread::sleep(Duration::from_millis((8 - value as u64) * 10));
            StageResult::Execution(ExecutionOutcome::returned(value))
        })
        .reentrant()
    };

    let parallel = TestRunner::new(
        AdapterSet::new().with(Stage::Integration, adapter()),
        RunOptions {
            workers: 4,
            ..RunOptions::default()
        },
    )
    .run(&registry);
    let sequential = runner(AdapterSet::new().with(Stage::Integration, adapter())).run(&registry);

    let names: Vec<&str> = parallel
        .stage(Stage::Integration)
        .outcomes()
        .iter()
        .map(|o| o.fixture().name.as_str())
        .collect();
    let expected: Vec<String> = (0..8).map(|i| format!("case-{}", i)).collect();
    assert_eq!(names, expected);
    assert_eq!(parallel, sequential);
}

#[test]
fn non_reentrant_adapters_are_serialized() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (in_flight_c, peak_c) = (Arc::clone(&in_flight), Arc::clone(&peak));
    let adapter = FnAdapter::new(Stage::Lexical, move |input: &str| {
        let now = in_flight_c.fetch_add(1, Ordering::SeqCst) + 1;
        peak_c.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        in_flight_c.fetch_sub(1, Ordering::SeqCst);
        StageResult::Tokens(common::lex(input))
    });

    let fixtures: Vec<Fixture> = (0..8)
        .map(|i| Fixture::lexical(format!("n{}", i), i.to_string(), vec![TokenDescriptor::new("NUMBER")]))
        .collect();
    let registry = registry_of(fixtures);
    let options = RunOptions {
        workers: 4,
        ..RunOptions::default()
    };
    let report = TestRunner::new(AdapterSet::new().with(Stage::Lexical, adapter), options).run(&registry);

    assert_eq!(report.stage(Stage::Lexical).passed_count(), 8);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[test]
fn gate_queueing_does_not_count_against_the_timeout() {
    let adapter = || {
        FnAdapter::new(Stage::Lexical, |input: &str| {
            thread::sleep(Duration::from_millis(40));
            StageResult::Tokens(common::lex(input))
        })
    };
    let fixtures: Vec<Fixture> = (0..8)
        .map(|i| Fixture::lexical(format!("n{}", i), i.to_string(), vec![TokenDescriptor::new("NUMBER")]))
        .collect();
    let registry = registry_of(fixtures);
    let run = |workers| {
        let options = RunOptions {
            timeout: Duration::from_millis(100),
            workers,
        };
        TestRunner::new(AdapterSet::new().with(Stage::Lexical, adapter()), options).run(&registry)
    };

    let sequential = run(1);
    let parallel = run(4);
    assert_eq!(sequential.stage(Stage::Lexical).passed_count(), 8);
    assert_eq!(parallel, sequential);
}

#[test]
fn parallel_timeouts_match_sequential_ones() {
    let fixtures: Vec<Fixture> = ["slow", "1", "slow", "2", "3", "slow"]
        .iter()
        .enumerate()
        .map(|(i, input)| Fixture::integration(format!("case-{}", i), *input, 1))
        .collect();
    let registry = registry_of(fixtures);
    let run = |workers| {
        let adapter = FnAdapter::new(Stage::Integration, |input: &str| {
            if input == "slow" {
                thread::sleep(Duration::from_millis(600));
            }
            StageResult::Execution(ExecutionOutcome::returned(1))
        })
        .reentrant();
        let options = RunOptions {
            timeout: Duration::from_millis(100),
            workers,
        };
        TestRunner::new(AdapterSet::new().with(Stage::Integration, adapter), options).run(&registry)
    };

    let parallel = run(4);
    let sequential = run(1);
    let verdicts: Vec<Verdict> = parallel
        .stage(Stage::Integration)
        .outcomes()
        .iter()
        .map(Outcome::verdict)
        .collect();
    assert_eq!(
        verdicts,
        [
            Verdict::Errored,
            Verdict::Passed,
            Verdict::Errored,
            Verdict::Passed,
            Verdict::Passed,
            Verdict::Errored
        ]
    );
    assert_eq!(parallel, sequential);
}

/// Blocks on input "hang" until the test drops the paired sender.
struct Stuck {
    calls: Arc<AtomicUsize>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl StageAdapter for Stuck {
    fn run(&self, input: &str) -> Result<StageResult, AdapterFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input == "hang" {
            let _ = self.release.lock().unwrap().recv();
        }
        Ok(StageResult::Tokens(common::lex(input)))
    }
}

#[test]
fn hung_non_reentrant_adapter_is_not_called_again_until_it_returns() {
    let calls = Arc::new(AtomicUsize::new(0));
    let (release, receiver) = mpsc::channel::<()>();
    let adapter = Stuck {
        calls: Arc::clone(&calls),
        release: Mutex::new(receiver),
    };
    let registry = registry_of(vec![
        Fixture::lexical("hang", "hang", tokens("IDENTIFIER")),
        Fixture::lexical("a", "int", tokens("INT")),
        Fixture::lexical("b", "void", tokens("VOID")),
        Fixture::lexical("c", ";", tokens("SEMICOLON")),
    ]);
    let options = RunOptions {
        timeout: Duration::from_millis(100),
        workers: 1,
    };
    let runner = TestRunner::new(AdapterSet::new().with(Stage::Lexical, adapter), options);

    let report = runner.run(&registry);
    let messages: Vec<&str> = report
        .stage(Stage::Lexical)
        .outcomes()
        .iter()
        .map(Outcome::message)
        .collect();
    let busy = "lexical adapter is still busy with an abandoned call";
    assert_eq!(messages, ["timed out", busy, busy, busy]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Once the abandoned call returns the stage is usable again.
    drop(release);
    let report = runner.run(&registry);
    assert_eq!(report.stage(Stage::Lexical).passed_count(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}
