// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ParseEventError;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// The action reported by a single `go test -json` event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The package's test binary started (newer toolchains only).
    Start,
    /// A test started running.
    Run,
    /// A parallel test was paused.
    Pause,
    /// A paused test continued running.
    Cont,
    /// A test or package passed.
    Pass,
    /// A test or package failed.
    Fail,
    /// Benchmark output.
    Bench,
    /// A line of output.
    Output,
    /// A test or package was skipped.
    Skip,
}

impl Action {
    /// Returns true for the actions that end a test or package.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }

    /// Returns the wire name of this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Run => "run",
            Self::Pause => "pause",
            Self::Cont => "cont",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Bench => "bench",
            Self::Output => "output",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name of a test, with subtests joined by `/`.
///
/// The empty name refers to the package itself.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TestName(String);

impl TestName {
    /// Creates a new test name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the full name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this refers to the package rather than a test.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Splits the name into its root test and the subtest path below it.
    ///
    /// The subtest part is empty for root tests.
    pub fn split(&self) -> (&str, &str) {
        self.0.split_once('/').unwrap_or((&self.0, ""))
    }

    /// Returns the name of the root test.
    pub fn root(&self) -> &str {
        self.split().0
    }

    /// Returns true if this is a subtest.
    pub fn is_subtest(&self) -> bool {
        self.0.contains('/')
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single event decoded from `go test -json` output.
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// When the event was emitted.
    pub time: Option<DateTime<FixedOffset>>,

    /// What happened.
    pub action: Action,

    /// The import path of the package.
    pub package: String,

    /// The test, or empty for package-level events.
    pub test: TestName,

    /// Elapsed seconds, set for terminal actions.
    pub elapsed: Option<f64>,

    /// Output text, set for `output` actions. Includes the trailing newline if there was one.
    pub output: Option<String>,

    raw: Bytes,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<FixedOffset>>,
    action: Action,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    package: String,
    #[serde(default, skip_serializing_if = "TestName::is_empty")]
    test: TestName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

impl TestEvent {
    /// Decodes a line of output, without its line terminator.
    pub fn parse(raw: Bytes) -> Result<Self, ParseEventError> {
        if raw.starts_with(b"FAIL") {
            return Err(ParseEventError::BadEvent);
        }
        let wire: WireEvent = serde_json::from_slice(&raw).map_err(ParseEventError::Json)?;
        Ok(Self {
            time: wire.time,
            action: wire.action,
            package: wire.package,
            test: wire.test,
            elapsed: wire.elapsed,
            output: wire.output,
            raw,
        })
    }

    /// Creates an event that was not read from `go test`, such as the failure recorded for a test
    /// that never finished.
    ///
    /// The raw form is generated as JSON so the event can be persisted like any other.
    pub fn synthesized(action: Action, package: impl Into<String>, test: TestName) -> Self {
        let wire = WireEvent {
            time: Some(chrono::Local::now().fixed_offset()),
            action,
            package: package.into(),
            test,
            elapsed: None,
            output: None,
        };
        let raw = Bytes::from(serde_json::json!(&wire).to_string());
        Self {
            time: wire.time,
            action: wire.action,
            package: wire.package,
            test: wire.test,
            elapsed: None,
            output: None,
            raw,
        }
    }

    /// Returns the bytes this event was decoded from, without the line terminator.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Returns true if this is a package-level event.
    pub fn is_package_event(&self) -> bool {
        self.test.is_empty()
    }

    /// Returns the elapsed time, rounded to the millisecond.
    ///
    /// Missing, negative or non-finite values are treated as zero.
    pub fn elapsed_duration(&self) -> Duration {
        match self.elapsed {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                Duration::from_millis((secs * 1000.0).round() as u64)
            }
            _ => Duration::ZERO,
        }
    }

    /// Returns the output text, or the empty string.
    pub fn output_str(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }
}
