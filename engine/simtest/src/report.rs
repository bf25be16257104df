//! Aggregation and reporting.
//!
//! The aggregator is the only consumer of the result channel and the only
//! writer of the master [`Outcome`]. Every fragment it merges is also shown
//! live: one glyph per test case, wrapped to the display width, or one line
//! per test case in verbose mode. Failure details are held back until the
//! final summary so they do not tear the progress rows.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use sim_channel::Channel;
use sim_outcome::{CoverageData, Outcome, TestResult, TestStatus};

use crate::{Mode, RunError};

/// Terminal columns taken by one progress glyph.
pub const GLYPH_COLUMNS: usize = 2;

const DEFAULT_COLUMNS: usize = 80;

/// Configured display width: the `COLUMNS` variable exported by the shell,
/// or 80 columns. The terminal itself is not queried.
pub fn display_width() -> usize {
    configured_width(std::env::var("COLUMNS").ok().as_deref())
}

/// Width for a `COLUMNS` value. Unset, unparsable, or zero means 80.
pub fn configured_width(columns: Option<&str>) -> usize {
    columns
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&columns| columns > 0)
        .unwrap_or(DEFAULT_COLUMNS)
}

fn glyph(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "✅",
        TestStatus::Failed => "❌",
        TestStatus::Crashed => "💥",
    }
}

fn label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Passed => "PASS",
        TestStatus::Failed => "FAIL",
        TestStatus::Crashed => "CRASH",
    }
}

/// Everything a completed run produced.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub mode: Mode,
    pub outcome: Outcome,
    /// Merged coverage; `None` for filtered runs.
    pub coverage: Option<CoverageData>,
    /// Wall time of the whole run.
    pub elapsed: Duration,
    /// Expectation files written (TRAIN only).
    pub rewritten: usize,
}

impl RunReport {
    /// Process exit code: 0 when clean, 1 on any failure, 2 when nothing ran.
    pub fn exit_code(&self) -> i32 {
        if self.outcome.has_failures() {
            1
        } else if self.outcome.summary.executed == 0 {
            2
        } else {
            0
        }
    }
}

/// Renders live progress and the final summary.
pub struct Reporter<W: Write> {
    out: W,
    verbose: bool,
    glyphs_per_row: usize,
    row: usize,
    details: Vec<String>,
}

impl<W: Write> Reporter<W> {
    /// A reporter for a display `width` columns wide.
    pub fn new(out: W, verbose: bool, width: usize) -> Self {
        Reporter {
            out,
            verbose,
            glyphs_per_row: (width / GLYPH_COLUMNS).max(1),
            row: 0,
            details: Vec::new(),
        }
    }

    /// Show the results of one fragment.
    pub fn fragment(&mut self, fragment: &Outcome) -> io::Result<()> {
        for (name, result) in &fragment.results {
            if self.verbose {
                writeln!(
                    self.out,
                    "{}: {name} ({:.2?})",
                    label(result.status),
                    result.duration
                )?;
            } else {
                self.out.write_all(glyph(result.status).as_bytes())?;
                self.row += 1;
                if self.row == self.glyphs_per_row {
                    self.row = 0;
                    writeln!(self.out)?;
                }
            }
            if !result.status.is_passed() {
                self.details.push(detail(name, result));
            }
        }
        self.out.flush()
    }

    /// Print held-back failure details, the run's problems, and totals.
    pub fn final_summary(&mut self, report: &RunReport) -> io::Result<()> {
        let outcome = &report.outcome;
        if self.row != 0 {
            self.row = 0;
            writeln!(self.out)?;
        }

        for detail in &self.details {
            writeln!(self.out)?;
            write!(self.out, "{detail}")?;
        }

        if !outcome.unused_expectation_files.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Unused expectation files:")?;
            for path in &outcome.unused_expectation_files {
                writeln!(self.out, "  {}", path.display())?;
            }
        }

        if !outcome.uncovered_modules.is_empty() {
            writeln!(self.out)?;
            writeln!(self.out, "Modules with no recipes:")?;
            for module in &outcome.uncovered_modules {
                writeln!(self.out, "  {module}")?;
            }
        }

        writeln!(self.out)?;
        writeln!(self.out, "{} Summary:", report.mode)?;
        writeln!(
            self.out,
            "  {} passed, {} failed, {} crashed ({} executed)",
            outcome.passed(),
            outcome.failed(),
            outcome.crashed(),
            outcome.summary.executed
        )?;
        if let Some(coverage) = &report.coverage {
            writeln!(
                self.out,
                "  Coverage: {:.1}% ({}/{} lines)",
                coverage.percentage(),
                coverage.covered_lines(),
                coverage.total_lines()
            )?;
        }
        if report.mode.is_train() {
            writeln!(self.out, "  Rewrote {} expectation files", report.rewritten)?;
        }
        writeln!(
            self.out,
            "  Completed in {:.2?} ({:.2?} in tests)",
            report.elapsed, outcome.summary.test_time
        )?;

        writeln!(self.out)?;
        if outcome.has_failures() {
            writeln!(self.out, "FAILED")?;
        } else if outcome.summary.executed == 0 {
            writeln!(self.out, "NO TESTS RUN")?;
        } else {
            writeln!(self.out, "OK")?;
        }
        self.out.flush()
    }
}

fn detail(name: &str, result: &TestResult) -> String {
    let mut text = format!("{}: {name}\n", label(result.status));
    for message in &result.messages {
        for line in message.lines() {
            text.push_str("  ");
            text.push_str(line);
            text.push('\n');
        }
    }
    text
}

/// Drain `results` into `outcome`, reporting each fragment.
///
/// Returns once every worker has released the channel.
pub fn aggregate<W: Write>(
    results: &Channel<Outcome>,
    outcome: &mut Outcome,
    reporter: &mut Reporter<W>,
) -> Result<(), RunError> {
    while let Some(fragment) = results.get()? {
        reporter.fragment(&fragment).map_err(RunError::report)?;
        outcome.merge(fragment);
    }
    tracing::debug!(executed = outcome.summary.executed, "results drained");
    Ok(())
}

/// Merge every worker's coverage file.
pub fn merge_coverage(files: &[PathBuf]) -> Result<CoverageData, RunError> {
    let mut coverage = CoverageData::new();
    for file in files {
        coverage.merge(CoverageData::load(file)?);
    }
    Ok(coverage)
}
