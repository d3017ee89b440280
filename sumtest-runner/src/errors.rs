// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by sumtest.

use crate::{reporter::FormatKind, rerun::ProcessExit};
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error::Error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse sumtest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<ConfigError>),
}

/// Error returned while parsing a [`MaxFail`](crate::config::MaxFail) value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized value for max-fail: {reason}")]
pub struct MaxFailParseError {
    /// The reason parsing failed.
    pub reason: String,
}

impl MaxFailParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Error returned while parsing a [`FormatKind`] value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(
    "unrecognized format `{input}` (known formats: {})",
    FormatKind::variants().iter().join(", ")
)]
pub struct FormatKindParseError {
    /// The input that failed to parse.
    pub input: String,
}

/// Error returned while parsing a [`SummarizeFlags`](crate::reporter::SummarizeFlags) section name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized summary section `{input}` (known sections: skipped, failed, errors, output)")]
pub struct SummarizeParseError {
    /// The input that failed to parse.
    pub input: String,
}

/// An error that occurred while decoding a single line of `go test -json` output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseEventError {
    /// The line is the `FAIL` marker that test2json emits when it cannot parse test output.
    #[error("bad output from test2json")]
    BadEvent,

    /// The line is not a valid JSON event.
    #[error("error decoding JSON event")]
    Json(#[source] serde_json::Error),
}

/// An error that aborted a scan of `go test -json` output.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// A line on standard output could not be decoded as an event.
    #[error("failed to parse test output: {line}")]
    DecodeEvent {
        /// The offending line, lossily converted to UTF-8.
        line: String,

        /// The underlying error.
        #[source]
        error: ParseEventError,
    },

    /// Reading standard output failed.
    #[error("error reading standard output")]
    ReadStdout(#[source] std::io::Error),

    /// Reading standard error failed.
    #[error("error reading standard error")]
    ReadStderr(#[source] std::io::Error),

    /// An event handler requested that the scan stop.
    #[error("event handler aborted the scan")]
    Handler(#[source] EventHandlerError),
}

/// An error returned by an [`EventHandler`](crate::testjson::EventHandler).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventHandlerError {
    /// Writing to the output stream failed.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// Writing to a file failed.
    #[error("error writing to `{file}`")]
    Fs {
        /// The file being written to.
        file: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The configured number of failures was reached.
    #[error("stopped after {failed} failures (max-fail: {max_fail})")]
    MaxFailExceeded {
        /// The number of failures observed so far.
        failed: usize,

        /// The configured maximum.
        max_fail: usize,
    },
}

/// An error that occurred while launching `go test`.
#[derive(Debug, Error)]
#[error("running command `{}` failed", shell_words::join(.command))]
pub struct LaunchError {
    command: Vec<String>,
    #[source]
    error: std::io::Error,
}

impl LaunchError {
    /// Creates a new `LaunchError`.
    pub fn new(command: Vec<String>, error: std::io::Error) -> Self {
        Self { command, error }
    }

    /// Returns the command line that failed to run.
    pub fn command(&self) -> &[String] {
        &self.command
    }
}

/// An error returned by the rerun orchestrator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RerunError {
    /// Too many tests failed in the initial run to make reruns worthwhile.
    #[error("number of test failures ({count}) exceeds maximum ({max}) for rerun")]
    TooManyFailures {
        /// The number of failures in the initial run.
        count: usize,

        /// The configured ceiling.
        max: usize,
    },

    /// The previous round produced build or runtime errors.
    #[error("rerun aborted: previous round had errors")]
    PreviousRoundErrors {
        /// The errors recorded during the round.
        errors: Vec<String>,
    },

    /// A test process panicked, so some tests may not have run.
    #[error("rerun aborted: suspected crash, some tests may not have run")]
    SuspectedCrash {
        /// The packages that panicked.
        packages: Vec<String>,
    },

    /// `go test` exited with a code that isn't 0 or 1.
    #[error("rerun aborted: unexpected exit code ({exit})")]
    UnexpectedExitCode {
        /// How the process exited.
        exit: ProcessExit,
    },

    /// Launching `go test` for a round failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Scanning the output of a round failed.
    #[error("error scanning output of rerun round {round}")]
    Scan {
        /// The round that failed (1-based).
        round: usize,

        /// The underlying error.
        #[source]
        error: ScanError,
    },

    /// Waiting for the process to exit failed.
    #[error("error waiting for `go test` to exit")]
    Wait(#[source] std::io::Error),

    /// Tests were still failing after the last round.
    #[error("tests failed after reruns ({exit})")]
    TestsFailed {
        /// The last non-zero exit seen in the final round.
        exit: ProcessExit,
    },
}

impl RerunError {
    /// Returns true if this error means the rerun could not be carried out, as opposed to tests
    /// still failing.
    pub fn is_abort(&self) -> bool {
        !matches!(self, Self::TestsFailed { .. })
    }
}

/// An error that occurred while writing a rerun report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportError {
    /// Writing the report file failed.
    #[error("error writing rerun report to `{path}`")]
    Fs {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Serializing the report failed.
    #[error("error serializing rerun report to `{path}`")]
    Json {
        /// The report path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// Displays an error along with its chain of causes, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        let mut source = self.error.source();
        while let Some(error) = source {
            write!(f, "\n  caused by:\n  - {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
