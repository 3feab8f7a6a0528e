//! Text rendering of reports and fixture listings.
//!
//! Everything writes to a [`WriteColor`], so the same code serves the
//! terminal (`StandardStream`) and tests (`termcolor::Buffer`).

// ============================================================================
// REPORT
// ============================================================================

use std::io::{self, Write};

use difference::{Changeset, Difference};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::adapter::StageResult;
use crate::compare::canonicalize_ast;
use crate::fixture::Expectation;
use crate::registry::FixtureRegistry;
use crate::report::{Outcome, StageReport, SuiteReport, Verdict};
use crate::stage::Stage;

/// Writes the full text report: one section per stage, then the summary.
pub fn render_report(out: &mut impl WriteColor, report: &SuiteReport) -> io::Result<()> {
    for stage in report.stages() {
        render_stage(out, stage)?;
        writeln!(out)?;
    }

    write_colored(out, Color::Cyan, true, "Overall")?;
    writeln!(
        out,
        ": {}/{} passed ({:.1}%)",
        report.total_passed(),
        report.total_count(),
        report.pass_rate() * 100.0
    )?;
    if !report.is_complete() {
        let not_run: usize = report.stages().iter().map(StageReport::not_run).sum();
        write_colored(out, Color::Yellow, true, "Cancelled")?;
        writeln!(out, ": {} fixtures not run", not_run)?;
    }
    if report.all_passed() {
        write_colored(out, Color::Green, true, "All tests passed!")?;
        writeln!(out)?;
    } else if report.total_passed() < report.total_count() {
        let failed = report.total_count() - report.total_passed();
        write_colored(out, Color::Red, true, &format!("{} test(s) failed", failed))?;
        writeln!(out)?;
    }
    match report.fingerprint() {
        Ok(fingerprint) => writeln!(out, "Fingerprint: {}", fingerprint)?,
        Err(e) => writeln!(out, "Fingerprint unavailable: {}", e)?,
    }
    Ok(())
}

fn render_stage(out: &mut impl WriteColor, stage: &StageReport) -> io::Result<()> {
    write_colored(out, Color::Cyan, true, stage.stage().title())?;
    writeln!(
        out,
        "  {}/{} passed ({:.1}%)",
        stage.passed_count(),
        stage.total(),
        stage.pass_rate() * 100.0
    )?;
    for outcome in stage.outcomes() {
        render_outcome(out, outcome)?;
    }
    if stage.not_run() > 0 {
        writeln!(out, "  ({} not run)", stage.not_run())?;
    }
    Ok(())
}

fn render_outcome(out: &mut impl WriteColor, outcome: &Outcome) -> io::Result<()> {
    let (label, color) = match outcome.verdict() {
        Verdict::Passed => ("PASS", Color::Green),
        Verdict::Failed => ("FAIL", Color::Red),
        Verdict::Errored => ("ERROR", Color::Magenta),
    };
    write!(out, "  ")?;
    write_colored(out, color, true, label)?;
    writeln!(out, ": {}", outcome.fixture().name)?;
    if outcome.passed() {
        return Ok(());
    }

    // Syntactic failures get a word diff instead of the raw message.
    if let (Expectation::Ast(expected), Some(StageResult::Ast(actual))) =
        (&outcome.fixture().expected, outcome.actual())
    {
        return render_word_diff(out, &canonicalize_ast(expected), &canonicalize_ast(actual));
    }
    for line in outcome.message().lines() {
        writeln!(out, "      {}", line)?;
    }
    Ok(())
}

fn render_word_diff(out: &mut impl WriteColor, expected: &str, actual: &str) -> io::Result<()> {
    let changeset = Changeset::new(expected, actual, " ");
    write!(out, "      ")?;
    for diff in &changeset.diffs {
        match diff {
            Difference::Same(text) => write!(out, "{} ", text)?,
            Difference::Rem(text) => {
                write_colored(out, Color::Red, false, &format!("[-{}-]", text))?;
                write!(out, " ")?;
            }
            Difference::Add(text) => {
                write_colored(out, Color::Green, false, &format!("{{+{}+}}", text))?;
                write!(out, " ")?;
            }
        }
    }
    writeln!(out)
}

// ============================================================================
// LISTING
// ============================================================================

/// Lists fixture names per stage; `only` restricts the listing to one stage.
pub fn render_list(out: &mut impl WriteColor, registry: &FixtureRegistry, only: Option<Stage>) -> io::Result<()> {
    for stage in Stage::ALL {
        if only.is_some_and(|only| only != stage) {
            continue;
        }
        write_colored(out, Color::Cyan, true, stage.title())?;
        writeln!(out, " ({})", registry.count(stage))?;
        for fixture in registry.all_fixtures(stage) {
            writeln!(out, "  {}", fixture.name)?;
        }
    }
    Ok(())
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn write_colored(out: &mut impl WriteColor, color: Color, bold: bool, text: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold))?;
    write!(out, "{}", text)?;
    out.reset()
}
