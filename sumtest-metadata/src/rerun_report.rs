// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// A summary of every test that failed at least once over a run, including reruns.
///
/// This is the JSON form of the rerun report written by `sumtest --rerun-fails-report`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RerunReportSummary {
    /// The version of the format. Currently always [`Self::FORMAT_VERSION`].
    pub format_version: u32,

    /// The tests that failed at least once, sorted by package and then by name.
    pub tests: Vec<RerunTestSummary>,
}

impl RerunReportSummary {
    /// The current format version.
    pub const FORMAT_VERSION: u32 = 1;

    /// Creates a new summary from the given tests.
    pub fn new(tests: Vec<RerunTestSummary>) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            tests,
        }
    }

    /// Parses a summary from JSON.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Returns the number of tests that passed on at least one attempt.
    pub fn flaky_count(&self) -> usize {
        self.tests
            .iter()
            .filter(|test| test.status == RerunTestStatus::Flaky)
            .count()
    }

    /// Returns the number of tests that failed on every attempt.
    pub fn failing_count(&self) -> usize {
        self.tests
            .iter()
            .filter(|test| test.status == RerunTestStatus::Failing)
            .count()
    }
}

/// The attempts made for a single test that failed at least once.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RerunTestSummary {
    /// The import path of the package the test belongs to.
    pub package: String,

    /// The full name of the test, with subtests joined by `/`.
    ///
    /// Empty if the package failed outside of any test (for example in `TestMain`).
    pub name: String,

    /// The number of attempts that ran to completion, passing or failing.
    pub runs: usize,

    /// The number of attempts that failed.
    pub failures: usize,

    /// Whether the test is flaky or consistently failing.
    pub status: RerunTestStatus,
}

impl RerunTestSummary {
    /// Returns the `package.Name` form of this test used in text reports.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

/// The classification of a test that failed at least once.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerunTestStatus {
    /// The test failed on some attempts and passed on others.
    Flaky,

    /// The test failed on every attempt.
    Failing,
}

impl RerunTestStatus {
    /// Returns the status as a static string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flaky => "flaky",
            Self::Failing => "failing",
        }
    }
}

impl fmt::Display for RerunTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
