// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::testjson::{PackageResult, TestDuration};
use owo_colors::Style;
use std::fmt;

#[derive(Debug, Default)]
pub(super) struct Styles {
    pub(super) is_colorized: bool,
    pub(super) count: Style,
    pub(super) pass: Style,
    pub(super) fail: Style,
    pub(super) skip: Style,
    pub(super) path: Style,
}

impl Styles {
    pub(super) fn colorize(&mut self) {
        self.is_colorized = true;
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.path = Style::new().cyan();
    }

    pub(super) fn for_result(&self, result: PackageResult) -> Style {
        match result {
            PackageResult::Pass => self.pass,
            PackageResult::Fail => self.fail,
            PackageResult::Skip => self.skip,
        }
    }
}

pub(super) fn result_glyph(result: PackageResult) -> &'static str {
    match result {
        PackageResult::Pass => "✓",
        PackageResult::Fail => "✖",
        PackageResult::Skip => "∅",
    }
}

/// Displays a test duration as `(1.234s)`, or `(unfinished)` for tests that never finished.
pub(super) struct DisplayTestDuration(pub(super) TestDuration);

impl fmt::Display for DisplayTestDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            TestDuration::Finished(duration) => {
                write!(f, "({})", crate::helpers::FormattedDuration(duration))
            }
            TestDuration::NeverFinished => write!(f, "(unfinished)"),
        }
    }
}
