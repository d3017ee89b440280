// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The summary printed once all runs are complete.

use super::helpers::{DisplayTestDuration, Styles};
use crate::{
    errors::SummarizeParseError,
    helpers::{FormattedDuration, plural, relative_package_path},
    testjson::{Execution, TestName},
};
use bitflags::bitflags;
use owo_colors::OwoColorize;
use serde::Deserialize;
use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
};

bitflags! {
    /// The sections of the summary to print.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct SummarizeFlags: u8 {
        /// List skipped tests.
        const SKIPPED = 1 << 0;
        /// List failed tests.
        const FAILED = 1 << 1;
        /// List lines `go test` wrote to standard error.
        const ERRORS = 1 << 2;
        /// Include test output with skipped and failed tests.
        const OUTPUT = 1 << 3;
    }
}

impl SummarizeFlags {
    /// Returns these flags with the given sections removed.
    pub fn without(self, hide: &[SummarySection]) -> Self {
        hide.iter()
            .fold(self, |flags, section| flags - section.flag())
    }
}

impl Default for SummarizeFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// A section of the summary that can be hidden.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SummarySection {
    /// The list of skipped tests.
    Skipped,
    /// The list of failed tests.
    Failed,
    /// The list of errors.
    Errors,
    /// Test output in the skipped and failed lists.
    Output,
}

impl SummarySection {
    fn flag(self) -> SummarizeFlags {
        match self {
            Self::Skipped => SummarizeFlags::SKIPPED,
            Self::Failed => SummarizeFlags::FAILED,
            Self::Errors => SummarizeFlags::ERRORS,
            Self::Output => SummarizeFlags::OUTPUT,
        }
    }
}

impl FromStr for SummarySection {
    type Err = SummarizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            "errors" => Ok(Self::Errors),
            "output" => Ok(Self::Output),
            other => Err(SummarizeParseError {
                input: other.to_owned(),
            }),
        }
    }
}

impl fmt::Display for SummarySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
            Self::Errors => write!(f, "errors"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Prints the end-of-run summary of an [`Execution`].
#[derive(Debug, Default)]
pub struct SummaryPrinter {
    flags: SummarizeFlags,
    module_path: Option<String>,
    styles: Box<Styles>,
}

impl SummaryPrinter {
    /// Creates a new printer that prints every section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sections to print.
    pub fn set_flags(&mut self, flags: SummarizeFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Sets the Go module path, which is stripped from package names.
    pub fn set_module_path(&mut self, module_path: impl Into<String>) -> &mut Self {
        self.module_path = Some(module_path.into());
        self
    }

    /// Colorizes output.
    pub fn colorize(&mut self) -> &mut Self {
        self.styles.colorize();
        self
    }

    /// Writes the summary.
    pub fn write(&self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        if self.flags.contains(SummarizeFlags::SKIPPED) {
            self.write_skipped(execution, writer)?;
        }
        if self.flags.contains(SummarizeFlags::FAILED) {
            self.write_failed(execution, writer)?;
        }
        if self.flags.contains(SummarizeFlags::ERRORS) {
            self.write_errors(execution, writer)?;
        }
        self.write_done(execution, writer)
    }

    fn write_skipped(&self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        let mut skipped = execution.skipped().peekable();
        if skipped.peek().is_none() {
            return Ok(());
        }

        writeln!(writer, "\n{}", "=== Skipped".style(self.styles.skip))?;
        for tc in skipped {
            writeln!(
                writer,
                "=== {}: {} {} {}",
                "SKIP".style(self.styles.skip),
                self.package_path(&tc.package),
                tc.name,
                DisplayTestDuration(tc.elapsed),
            )?;
            if self.flags.contains(SummarizeFlags::OUTPUT) {
                if let Some(package) = execution.package(&tc.package) {
                    write_lines(package.output_lines(tc), writer)?;
                }
            }
        }
        Ok(())
    }

    fn write_failed(&self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        // Roots with failed subtests are represented by those subtests.
        let failed: Vec<_> = execution
            .failed()
            .into_iter()
            .filter(|tc| !tc.has_failed_subtest)
            .collect();
        if failed.is_empty() {
            return Ok(());
        }

        writeln!(writer, "\n{}", "=== Failed".style(self.styles.fail))?;
        for tc in &failed {
            let path = self.package_path(&tc.package);
            if tc.name.is_empty() {
                writeln!(writer, "=== {}: {path}", "FAIL".style(self.styles.fail))?;
            } else {
                writeln!(
                    writer,
                    "=== {}: {path} {} {}",
                    "FAIL".style(self.styles.fail),
                    tc.name,
                    DisplayTestDuration(tc.elapsed),
                )?;
            }

            if !self.flags.contains(SummarizeFlags::OUTPUT) {
                continue;
            }
            let Some(package) = execution.package(&tc.package) else {
                continue;
            };
            if tc.name.is_empty() {
                write_lines(
                    package.output(&TestName::default()).iter().map(String::as_str),
                    writer,
                )?;
            } else {
                write_lines(package.output_lines(tc), writer)?;
            }
        }
        Ok(())
    }

    fn write_errors(&self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        let errors = execution.errors();
        if errors.is_empty() {
            return Ok(());
        }

        writeln!(writer, "\n{}", "=== Errors".style(self.styles.fail))?;
        for error in errors {
            writeln!(writer, "{error}")?;
        }
        Ok(())
    }

    fn write_done(&self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        let runs = execution.runs();
        let total = execution.total();
        let skipped = execution.skipped().count();
        let failed = execution.failed_count();
        let errors = execution.errors().len();

        write!(writer, "\n{} ", "DONE".style(self.styles.count))?;
        if runs > 1 {
            write!(writer, "{runs} {}, ", plural::runs_str(runs))?;
        }
        write!(writer, "{total} {}", plural::tests_str(total))?;
        if skipped > 0 {
            write!(writer, ", {skipped} skipped")?;
        }
        if failed > 0 {
            write!(
                writer,
                ", {} {}",
                failed.style(self.styles.fail),
                plural::failures_str(failed)
            )?;
        }
        if errors > 0 {
            write!(
                writer,
                ", {} {}",
                errors.style(self.styles.fail),
                plural::errors_str(errors)
            )?;
        }
        writeln!(writer, " in {}", FormattedDuration(execution.elapsed()))
    }

    fn package_path<'a>(&self, package: &'a str) -> &'a str {
        relative_package_path(package, self.module_path.as_deref())
    }
}

fn write_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    writer: &mut dyn Write,
) -> io::Result<()> {
    for line in lines {
        writer.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testjson::TestEvent;
    use bytes::Bytes;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const STREAM: &str = indoc! {r#"
        {"Action":"run","Package":"example.com/m/a","Test":"TestSkip"}
        {"Action":"output","Package":"example.com/m/a","Test":"TestSkip","Output":"    a_test.go:3: not today\n"}
        {"Action":"skip","Package":"example.com/m/a","Test":"TestSkip","Elapsed":0}
        {"Action":"run","Package":"example.com/m/a","Test":"TestRoot"}
        {"Action":"run","Package":"example.com/m/a","Test":"TestRoot/ok"}
        {"Action":"pass","Package":"example.com/m/a","Test":"TestRoot/ok","Elapsed":0}
        {"Action":"run","Package":"example.com/m/a","Test":"TestRoot/bad"}
        {"Action":"output","Package":"example.com/m/a","Test":"TestRoot/bad","Output":"    a_test.go:9: boom\n"}
        {"Action":"fail","Package":"example.com/m/a","Test":"TestRoot/bad","Elapsed":0.1}
        {"Action":"fail","Package":"example.com/m/a","Test":"TestRoot","Elapsed":0.1}
        {"Action":"fail","Package":"example.com/m/a","Elapsed":0.2}
        {"Action":"output","Package":"example.com/m/b","Output":"panic: bad init\n"}
        {"Action":"fail","Package":"example.com/m/b","Elapsed":0}
    "#};

    fn execution() -> Execution {
        let mut execution = Execution::new();
        for line in STREAM.lines() {
            let event = TestEvent::parse(Bytes::copy_from_slice(line.as_bytes()))
                .expect("valid event in fixture");
            execution.add(&event);
        }
        execution.add_error("a_test.go:1:1: expected 'package'");
        execution.end();
        execution
    }

    fn render(flags: SummarizeFlags) -> String {
        let mut printer = SummaryPrinter::new();
        printer.set_flags(flags).set_module_path("example.com/m");
        let mut out = Vec::new();
        printer.write(&execution(), &mut out).expect("wrote to buffer");
        let out = String::from_utf8(out).expect("output is UTF-8");

        // The elapsed time isn't deterministic.
        let (head, _) = out.rsplit_once(" in ").expect("DONE line has a duration");
        head.to_owned()
    }

    #[test]
    fn full_summary() {
        assert_eq!(
            render(SummarizeFlags::all()),
            indoc! {"

                === Skipped
                === SKIP: a TestSkip (0.000s)
                    a_test.go:3: not today

                === Failed
                === FAIL: a TestRoot/bad (0.100s)
                    a_test.go:9: boom
                === FAIL: b
                panic: bad init

                === Errors
                a_test.go:1:1: expected 'package'

                DONE 4 tests, 1 skipped, 3 failures, 1 error"}
        );
    }

    #[test]
    fn hidden_sections() {
        let flags = SummarizeFlags::all().without(&[
            SummarySection::Skipped,
            SummarySection::Errors,
            SummarySection::Output,
        ]);
        assert_eq!(
            render(flags),
            indoc! {"

                === Failed
                === FAIL: a TestRoot/bad (0.100s)
                === FAIL: b

                DONE 4 tests, 1 skipped, 3 failures, 1 error"}
        );
    }

    #[test_case("skipped", Ok(SummarySection::Skipped))]
    #[test_case("output", Ok(SummarySection::Output))]
    #[test_case("passed", Err(SummarizeParseError { input: "passed".to_owned() }))]
    fn parse_section(input: &str, expected: Result<SummarySection, SummarizeParseError>) {
        assert_eq!(input.parse::<SummarySection>(), expected);
    }
}
