//! The `kcc-conformance` command-line interface.
//!
//! Exit codes: 0 when every fixture ran and passed, 1 when any fixture
//! failed, errored or was not run, 2 when setup failed.

use std::panic;
use std::process;
use std::sync::Once;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use tracing::{debug, warn};

use crate::builtin::kayte_registry;
use crate::config::HarnessConfig;
use crate::discovery::load_registry;
use crate::errors::{HarnessError, Result};
use crate::registry::FixtureRegistry;
use crate::runner::{TestRunner, INVOCATION_THREAD_PREFIX};

pub mod args;
pub mod output;

use args::{Command, FixtureSource, Format, HarnessArgs};

pub const EXIT_PASSED: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_SETUP: i32 = 2;

/// The main entry point for the CLI.
pub fn run() {
    init_tracing();
    quiet_collaborator_panics();
    let args = HarnessArgs::parse();
    let code = match execute(args.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            EXIT_SETUP
        }
    };
    process::exit(code);
}

/// Runs one subcommand and returns the process exit code.
pub fn execute(command: Command) -> Result<i32> {
    match command {
        Command::Run {
            config,
            source,
            workers,
            timeout_ms,
            format,
        } => {
            let mut config = match config {
                Some(path) => HarnessConfig::load(path)?,
                None => HarnessConfig::default(),
            };
            if let Some(workers) = workers {
                config.workers = workers;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            config.validate()?;

            let registry = load_fixtures(&source, &config)?;
            let runner = TestRunner::new(config.adapters(), config.run_options());
            for stage in runner.adapters().missing() {
                if registry.count(stage) > 0 {
                    warn!(stage = %stage, "no compiler command configured; fixtures will error");
                }
            }
            let report = runner.run(&registry);

            match format {
                Format::Json => println!("{}", report.to_json()?),
                Format::Text => {
                    let mut stdout = StandardStream::stdout(color_choice(config.use_colors));
                    output::render_report(&mut stdout, &report).map_err(HarnessError::Output)?;
                }
            }
            Ok(if report.all_passed() { EXIT_PASSED } else { EXIT_FAILED })
        }
        Command::List { source, stage } => {
            let config = HarnessConfig::default();
            let registry = load_fixtures(&source, &config)?;
            let mut stdout = StandardStream::stdout(color_choice(config.use_colors));
            output::render_list(&mut stdout, &registry, stage).map_err(HarnessError::Output)?;
            Ok(EXIT_PASSED)
        }
    }
}

fn load_fixtures(source: &FixtureSource, config: &HarnessConfig) -> Result<FixtureRegistry> {
    if source.builtin {
        return kayte_registry();
    }
    let root = source.fixtures.as_ref().unwrap_or(&config.fixture_root);
    let registry = load_registry(root)?;
    if registry.is_empty() {
        warn!(root = %root.display(), "no fixtures found");
    }
    Ok(registry)
}

fn color_choice(use_colors: bool) -> ColorChoice {
    if use_colors {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs a stderr `fmt` subscriber, only when `RUST_LOG` is set.
///
/// Safe to call more than once. Enable with e.g.
/// `RUST_LOG=kcc_conformance=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

/// Keeps the default panic banner off stderr for panics raised inside
/// adapter invocations. Those are caught and reported per fixture; every
/// other panic still reaches the previous hook.
pub fn quiet_collaborator_panics() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        if is_invocation_thread(thread.name()) {
            debug!(thread = thread.name().unwrap_or_default(), "{}", info);
        } else {
            previous(info);
        }
    }));
}

fn is_invocation_thread(name: Option<&str>) -> bool {
    name.map_or(false, |name| name.starts_with(INVOCATION_THREAD_PREFIX))
}
