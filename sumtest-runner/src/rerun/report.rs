// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::WriteReportError,
    helpers::plural,
    testjson::{Execution, TestName},
};
use camino::Utf8Path;
use serde::Deserialize;
use std::{collections::BTreeMap, fmt, str::FromStr};
use sumtest_metadata::{RerunReportSummary, RerunTestStatus, RerunTestSummary};
use swrite::{SWrite, swriteln};

/// The format a rerun report is written in.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RerunReportFormat {
    /// One `pkg.Test: N runs, M failures` line per test.
    #[default]
    Text,

    /// A [`RerunReportSummary`] serialized as JSON.
    Json,
}

impl FromStr for RerunReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unrecognized rerun report format `{other}` (known formats: text, json)"
            )),
        }
    }
}

impl fmt::Display for RerunReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A report of every test that failed at least once, across the initial run and any reruns.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RerunReport {
    summary: RerunReportSummary,
}

impl RerunReport {
    /// Builds the report from an execution that accumulated every run.
    ///
    /// A test that passed in at least one attempt is flaky; otherwise it is failing. Packages
    /// that failed outside of any test are reported with an empty name, as a single failed run.
    pub fn from_execution(execution: &Execution) -> Self {
        let mut tests = Vec::new();
        for (package_name, package) in execution.packages() {
            if package.test_main_failed() {
                tests.push(RerunTestSummary {
                    package: package_name.to_owned(),
                    name: String::new(),
                    runs: 1,
                    failures: 1,
                    status: RerunTestStatus::Failing,
                });
            }

            let mut failures: BTreeMap<&TestName, usize> = BTreeMap::new();
            for tc in package.failed() {
                *failures.entry(&tc.name).or_default() += 1;
            }
            for (name, failures) in failures {
                let passes = package
                    .passed()
                    .iter()
                    .filter(|tc| &tc.name == name)
                    .count();
                tests.push(RerunTestSummary {
                    package: package_name.to_owned(),
                    name: name.to_string(),
                    runs: passes + failures,
                    failures,
                    status: if passes > 0 {
                        RerunTestStatus::Flaky
                    } else {
                        RerunTestStatus::Failing
                    },
                });
            }
        }

        Self {
            summary: RerunReportSummary::new(tests),
        }
    }

    /// Returns the serializable form of the report.
    pub fn summary(&self) -> &RerunReportSummary {
        &self.summary
    }

    /// Returns the tests in the report, sorted by package then name.
    pub fn tests(&self) -> &[RerunTestSummary] {
        &self.summary.tests
    }

    /// Returns true if no test failed.
    pub fn is_empty(&self) -> bool {
        self.summary.tests.is_empty()
    }

    /// Renders the report as text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for test in &self.summary.tests {
            swriteln!(
                out,
                "{}: {} {}, {} {}",
                test.qualified_name(),
                test.runs,
                plural::runs_str(test.runs),
                test.failures,
                plural::failures_str(test.failures),
            );
        }
        out
    }

    /// Writes the report to `path` in the given format.
    pub fn write_to_path(
        &self,
        path: &Utf8Path,
        format: RerunReportFormat,
    ) -> Result<(), WriteReportError> {
        let contents = match format {
            RerunReportFormat::Text => self.to_text(),
            RerunReportFormat::Json => {
                let mut json = serde_json::to_string_pretty(&self.summary).map_err(|error| {
                    WriteReportError::Json {
                        path: path.to_owned(),
                        error,
                    }
                })?;
                json.push('\n');
                json
            }
        };

        let fs_error = |error| WriteReportError::Fs {
            path: path.to_owned(),
            error,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(fs_error)?;
        }
        std::fs::write(path, contents).map_err(fs_error)
    }
}
