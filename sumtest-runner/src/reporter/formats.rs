// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The line-oriented formats: one line per package or per test, or `go test`'s own output.

use super::helpers::{DisplayTestDuration, Styles, result_glyph};
use crate::{
    helpers::{FormattedDuration, relative_package_path},
    testjson::{Action, Execution, Package, PackageResult, TestEvent, TestName},
};
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// One line per package: `✓  pkg (1.234s)`.
pub(super) fn write_pkgname(
    event: &TestEvent,
    execution: &Execution,
    module_path: Option<&str>,
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let Some(package) = execution.package(&event.package) else {
        return Ok(());
    };

    if !event.is_package_event() {
        if event.action == Action::Fail {
            write_failed_test_output(event, package, writer)?;
        }
        return Ok(());
    }
    let Some(result) = package.run_result(event.action) else {
        return Ok(());
    };
    write!(
        writer,
        "{}  {}",
        result_glyph(result).style(styles.for_result(result)),
        relative_package_path(&event.package, module_path),
    )?;
    write_package_suffix(package, result, writer)?;
    writeln!(writer)?;
    write_test_main_output(package, writer)
}

/// One line per test: `PASS pkg.TestName (0.010s)`.
pub(super) fn write_testname(
    event: &TestEvent,
    execution: &Execution,
    module_path: Option<&str>,
    styles: &Styles,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let Some(package) = execution.package(&event.package) else {
        return Ok(());
    };
    let path = relative_package_path(&event.package, module_path);

    if event.is_package_event() {
        let Some(result) = package.run_result(event.action) else {
            return Ok(());
        };
        write_test_main_output(package, writer)?;
        let label = match result {
            PackageResult::Pass => "PASS",
            PackageResult::Fail => "FAIL",
            PackageResult::Skip => "EMPTY",
        };
        write!(
            writer,
            "{} {}",
            label.style(styles.for_result(result)),
            path
        )?;
        write_package_suffix(package, result, writer)?;
        return writeln!(writer);
    }

    let (label, style, tc) = match event.action {
        Action::Pass => ("PASS", styles.pass, package.passed().last()),
        Action::Skip => ("SKIP", styles.skip, package.skipped().last()),
        Action::Fail => {
            write_failed_test_output(event, package, writer)?;
            ("FAIL", styles.fail, package.last_failed_by_name(&event.test))
        }
        _ => return Ok(()),
    };
    let Some(tc) = tc.filter(|tc| tc.name == event.test) else {
        return Ok(());
    };
    writeln!(
        writer,
        "{} {}.{} {}",
        label.style(style),
        path,
        tc.name,
        DisplayTestDuration(tc.elapsed),
    )
}

/// Everything `go test -v` would have printed.
pub(super) fn write_standard_verbose(event: &TestEvent, writer: &mut dyn Write) -> io::Result<()> {
    if event.action == Action::Output {
        writer.write_all(event.output_str().as_bytes())?;
    }
    Ok(())
}

/// What `go test` without `-v` would have printed: package results and failed test output.
pub(super) fn write_standard_quiet(
    event: &TestEvent,
    execution: &Execution,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if event.is_package_event() {
        if event.action == Action::Output && event.output_str() != "PASS\n" {
            writer.write_all(event.output_str().as_bytes())?;
        }
        return Ok(());
    }

    if event.action == Action::Fail {
        if let Some(package) = execution.package(&event.package) {
            write_failed_test_output(event, package, writer)?;
        }
    }
    Ok(())
}

fn write_failed_test_output(
    event: &TestEvent,
    package: &Package,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if let Some(tc) = package.last_failed_by_name(&event.test) {
        for line in package.output_lines(tc) {
            writer.write_all(line.as_bytes())?;
        }
    }
    Ok(())
}

fn write_test_main_output(package: &Package, writer: &mut dyn Write) -> io::Result<()> {
    if package.test_main_failed() {
        for line in package.output(&TestName::default()) {
            writer.write_all(line.as_bytes())?;
        }
    }
    Ok(())
}

fn write_package_suffix(
    package: &Package,
    result: PackageResult,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if result == PackageResult::Skip {
        return Ok(());
    }
    if package.cached() {
        write!(writer, " (cached)")?;
    } else if let Some(elapsed) = package.elapsed() {
        write!(writer, " ({})", FormattedDuration(elapsed))?;
    }
    if let Some(coverage) = package.coverage() {
        write!(writer, " ({coverage})")?;
    }
    Ok(())
}
