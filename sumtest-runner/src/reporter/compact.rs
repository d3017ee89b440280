// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The compact progress format.
//!
//! Each finished package is shown as a glyph followed by its path. Packages that pass or are
//! skipped are packed onto the current line when their path shares a directory with the
//! previous entry, showing only the part of the path that differs:
//!
//! ```text
//! ✓ api/v1 ✓ v2 ∅ ↰internal ✓ ↰cmd
//! ✖ store
//! ```
//!
//! A `↰` marks a back-step: the entry shares the grandparent directory of the previous entry
//! rather than its parent. Failures always get their own line, followed by the output of the
//! failed test.

use super::helpers::{DisplayTestDuration, Styles, result_glyph};
use crate::{
    helpers::{DisplayBracketedHhMmSs, display_width, relative_package_path},
    testjson::{Action, Execution, Package, PackageResult, TestEvent, TestName},
};
use owo_colors::OwoColorize;
use std::io::{self, Write};

const BACK_STEP: &str = "↰";
const ELLIPSIS: &str = "…/";

#[derive(Debug)]
pub(super) struct CompactFormatter {
    width: usize,
    wall_clock: bool,
    // The path of the last package printed on the current line.
    last_path: Option<String>,
    column: usize,
    // The number of directories the current line has descended below its first entry.
    level: usize,
}

impl CompactFormatter {
    pub(super) fn new(width: usize, wall_clock: bool) -> Self {
        Self {
            width,
            wall_clock,
            last_path: None,
            column: 0,
            level: 0,
        }
    }

    pub(super) fn write_event(
        &mut self,
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

        if !event.is_package_event() {
            if event.action == Action::Fail {
                self.write_test_failure(event, package, path, styles, writer)?;
            }
            return Ok(());
        }

        let Some(result) = package.run_result(event.action) else {
            return Ok(());
        };
        match result {
            PackageResult::Fail => {
                self.write_package_failure(execution, package, path, styles, writer)
            }
            result => self.write_entry(execution, result, path, styles, writer),
        }
    }

    /// Ends the current line so that other output starts on a line of its own.
    pub(super) fn interrupt(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        if self.column > 0 {
            writeln!(writer)?;
        }
        self.reset();
        Ok(())
    }

    pub(super) fn finish(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        self.interrupt(writer)
    }

    fn write_entry(
        &mut self,
        execution: &Execution,
        result: PackageResult,
        path: &str,
        styles: &Styles,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let glyph = result_glyph(result);
        let style = styles.for_result(result);

        let join = match (&self.last_path, self.column) {
            (Some(prev), column) if column > 0 => find_join(prev, path, self.level),
            _ => None,
        };

        match join {
            Some(join) => {
                let marker = if join.back_step { BACK_STEP } else { "" };
                // " ✓ ↰name"
                let entry_width = 1
                    + display_width(glyph)
                    + 1
                    + display_width(marker)
                    + display_width(join.remainder);
                if self.column + entry_width <= self.width {
                    write!(
                        writer,
                        " {} {}{}",
                        glyph.style(style),
                        marker,
                        join.remainder.style(styles.path)
                    )?;
                    self.column += entry_width;
                    if join.back_step {
                        self.level = self.level.saturating_sub(1);
                    }
                    self.level += segments(join.remainder) - 1;
                } else {
                    self.start_line(execution, writer)?;
                    write!(
                        writer,
                        "{} {}{}",
                        glyph.style(style),
                        ELLIPSIS,
                        join.remainder.style(styles.path)
                    )?;
                    self.column += display_width(glyph)
                        + 1
                        + display_width(ELLIPSIS)
                        + display_width(join.remainder);
                }
            }
            None => {
                self.start_line(execution, writer)?;
                write!(writer, "{} {}", glyph.style(style), path.style(styles.path))?;
                self.column += display_width(glyph) + 1 + display_width(path);
            }
        }

        self.last_path = Some(path.to_owned());
        Ok(())
    }

    fn write_package_failure(
        &mut self,
        execution: &Execution,
        package: &Package,
        path: &str,
        styles: &Styles,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        self.start_line(execution, writer)?;
        writeln!(
            writer,
            "{} {}",
            result_glyph(PackageResult::Fail).style(styles.fail),
            path.style(styles.path)
        )?;
        if package.test_main_failed() {
            for line in package.output(&TestName::default()) {
                writer.write_all(line.as_bytes())?;
            }
        }
        self.reset();
        Ok(())
    }

    fn write_test_failure(
        &mut self,
        event: &TestEvent,
        package: &Package,
        path: &str,
        styles: &Styles,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let Some(tc) = package.last_failed_by_name(&event.test) else {
            return Ok(());
        };
        self.interrupt(writer)?;
        writeln!(
            writer,
            "{} {}.{} {}",
            result_glyph(PackageResult::Fail).style(styles.fail),
            path.style(styles.path),
            tc.name.style(styles.fail),
            DisplayTestDuration(tc.elapsed),
        )?;
        for line in package.output_lines(tc) {
            writer.write_all(line.as_bytes())?;
        }
        self.reset();
        Ok(())
    }

    fn start_line(&mut self, execution: &Execution, writer: &mut dyn Write) -> io::Result<()> {
        self.interrupt(writer)?;
        if self.wall_clock {
            let prefix = DisplayBracketedHhMmSs(execution.elapsed()).to_string();
            write!(writer, "{prefix}")?;
            self.column = display_width(&prefix);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last_path = None;
        self.column = 0;
        self.level = 0;
    }
}

#[derive(Debug, Eq, PartialEq)]
struct Join<'a> {
    // The part of the path after the shared directory.
    remainder: &'a str,
    back_step: bool,
}

/// Decides whether `path` can be appended to a line whose last entry is `prev`.
///
/// `path` joins if it lives under the parent directory of `prev`, or, while the line is nested
/// below its first entry, under the grandparent directory of `prev`.
fn find_join<'a>(prev: &str, path: &'a str, level: usize) -> Option<Join<'a>> {
    let (parent, _) = prev.rsplit_once('/')?;
    if let Some(remainder) = strip_dir(path, parent) {
        return Some(Join {
            remainder,
            back_step: false,
        });
    }

    if level == 0 {
        return None;
    }
    let (grandparent, _) = parent.rsplit_once('/')?;
    strip_dir(path, grandparent).map(|remainder| Join {
        remainder,
        back_step: true,
    })
}

fn strip_dir<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    path.strip_prefix(dir)?
        .strip_prefix('/')
        .filter(|rest| !rest.is_empty())
}

fn segments(path: &str) -> usize {
    path.split('/').count()
}
