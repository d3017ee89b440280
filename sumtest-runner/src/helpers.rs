// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for sumtest-runner.

use std::{fmt, time::Duration};
use unicode_width::UnicodeWidthStr;

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "run" if `count` is 1, otherwise "runs".
    pub fn runs_str(count: usize) -> &'static str {
        if count == 1 { "run" } else { "runs" }
    }

    /// Returns "failure" if `count` is 1, otherwise "failures".
    pub fn failures_str(count: usize) -> &'static str {
        if count == 1 { "failure" } else { "failures" }
    }

    /// Returns "error" if `count` is 1, otherwise "errors".
    pub fn errors_str(count: usize) -> &'static str {
        if count == 1 { "error" } else { "errors" }
    }
}

/// Formats a duration the way `go test` does: seconds with millisecond precision.
#[derive(Debug)]
pub(crate) struct FormattedDuration(pub(crate) Duration);

impl fmt::Display for FormattedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

/// Formats a duration as a bracketed `[hh:mm:ss] ` prefix.
pub(crate) struct DisplayBracketedHhMmSs(pub(crate) Duration);

impl fmt::Display for DisplayBracketedHhMmSs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.0.as_secs();
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;

        write!(f, "[{hours:02}:{mins:02}:{secs:02}] ")
    }
}

/// Returns the number of terminal columns `s` occupies.
pub(crate) fn display_width(s: &str) -> usize {
    s.width()
}

/// Returns the package path with the module prefix removed, if it has one.
///
/// The module root itself is displayed as `.`.
pub(crate) fn relative_package_path<'a>(package: &'a str, module: Option<&str>) -> &'a str {
    let Some(module) = module.filter(|m| !m.is_empty()) else {
        return package;
    };
    if package == module {
        return ".";
    }
    package
        .strip_prefix(module)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::ZERO, "[00:00:00] "; "zero")]
    #[test_case(Duration::from_millis(61_500), "[00:01:01] "; "minute")]
    #[test_case(Duration::from_secs(3 * 3600 + 7), "[03:00:07] "; "hours")]
    fn bracketed_hh_mm_ss(duration: Duration, expected: &str) {
        assert_eq!(DisplayBracketedHhMmSs(duration).to_string(), expected);
    }

    #[test]
    fn formatted_duration() {
        assert_eq!(
            FormattedDuration(Duration::from_millis(1234)).to_string(),
            "1.234s"
        );
    }

    #[test_case("example.com/mod/pkg/a", Some("example.com/mod"), "pkg/a"; "nested")]
    #[test_case("example.com/mod", Some("example.com/mod"), "."; "root")]
    #[test_case("example.com/module2/x", Some("example.com/mod"), "example.com/module2/x"; "sibling prefix")]
    #[test_case("example.com/mod/pkg", None, "example.com/mod/pkg"; "no module")]
    fn relative_paths(package: &str, module: Option<&str>, expected: &str) {
        assert_eq!(relative_package_path(package, module), expected);
    }
}
