// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use owo_colors::OwoColorize;
use std::error::Error;
use sumtest_metadata::SumtestExitCode;
use sumtest_runner::{
    errors::{
        ConfigParseError, EventHandlerError, LaunchError, RerunError, ScanError,
        WriteReportError,
    },
    rerun::ProcessExit,
};
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("argument conflict")]
    ArgumentConflict { message: String },
    #[error("error creating Tokio runtime")]
    RuntimeCreateError {
        #[source]
        err: std::io::Error,
    },
    #[error("error creating output files")]
    OutputFileCreateError {
        #[source]
        err: EventHandlerError,
    },
    #[error("error launching go test")]
    LaunchError {
        #[from]
        err: LaunchError,
    },
    #[error("error waiting for go test")]
    WaitError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: EventHandlerError,
    },
    #[error("error writing summary")]
    WriteSummaryError {
        #[source]
        err: std::io::Error,
    },
    #[error("error writing rerun report")]
    WriteReportError {
        #[from]
        err: WriteReportError,
    },
    #[error("failed to decode go test output")]
    DecodeFailed {
        #[source]
        err: ScanError,
    },
    #[error("max-fail exceeded")]
    MaxFailExceeded { failed: usize, max_fail: usize },
    #[error("rerun aborted")]
    RerunAborted {
        #[source]
        err: RerunError,
    },
    #[error("tests failed")]
    TestsFailed { exit: ProcessExit },
    #[error("tests failed after reruns")]
    RerunTestsFailed { exit: ProcessExit },
}

impl ExpectedError {
    pub(crate) fn argument_conflict(message: impl Into<String>) -> Self {
        Self::ArgumentConflict {
            message: message.into(),
        }
    }

    /// Classifies an error returned by a scan of `go test` output.
    pub(crate) fn from_scan(err: ScanError) -> Self {
        match err {
            ScanError::Handler(EventHandlerError::MaxFailExceeded { failed, max_fail }) => {
                Self::MaxFailExceeded { failed, max_fail }
            }
            ScanError::Handler(err) => Self::WriteOutputError { err },
            err => Self::DecodeFailed { err },
        }
    }

    /// Classifies an error returned by the rerun orchestrator.
    pub(crate) fn from_rerun(err: RerunError) -> Self {
        match err {
            RerunError::TestsFailed { exit } => Self::RerunTestsFailed { exit },
            RerunError::Scan {
                error: error @ ScanError::Handler(_),
                ..
            } => Self::from_scan(error),
            err => Self::RerunAborted { err },
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ArgumentConflict { .. }
            | Self::RuntimeCreateError { .. }
            | Self::LaunchError { .. }
            | Self::WaitError { .. } => SumtestExitCode::SETUP_ERROR,
            Self::OutputFileCreateError { .. }
            | Self::WriteOutputError { .. }
            | Self::WriteSummaryError { .. }
            | Self::WriteReportError { .. } => SumtestExitCode::WRITE_OUTPUT_ERROR,
            Self::DecodeFailed { .. } => SumtestExitCode::DECODE_FAILED,
            Self::MaxFailExceeded { .. } => SumtestExitCode::MAX_FAIL_EXCEEDED,
            Self::RerunAborted { .. } => SumtestExitCode::RERUN_ABORTED,
            // go test's own codes (1 for failures, 2 for build errors) are passed through.
            Self::TestsFailed { exit } => match exit.code {
                Some(code) if code != 0 => code,
                _ => SumtestExitCode::TEST_RUN_FAILED,
            },
            Self::RerunTestsFailed { .. } => SumtestExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::ArgumentConflict { message } => {
                error!("{message}");
                None
            }
            Self::RuntimeCreateError { err } => {
                error!("error creating Tokio runtime");
                Some(err as &dyn Error)
            }
            Self::OutputFileCreateError { err } => {
                error!("{err}");
                err.source()
            }
            Self::LaunchError { err } => {
                error!(
                    "failed to execute `{}`",
                    shell_words::join(err.command()).style(styles.bold)
                );
                err.source()
            }
            Self::WaitError { err } => {
                error!("error waiting for go test to exit");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("error writing test output");
                Some(err as &dyn Error)
            }
            Self::WriteSummaryError { err } => {
                error!("error writing summary");
                Some(err as &dyn Error)
            }
            Self::WriteReportError { err } => {
                error!("{err}");
                err.source()
            }
            Self::DecodeFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::MaxFailExceeded { failed, max_fail } => {
                error!(
                    "stopped the run after {} failures (max-fail: {max_fail})",
                    failed.style(styles.bold)
                );
                None
            }
            Self::RerunAborted { err } => {
                error!("{err}");
                if let RerunError::PreviousRoundErrors { errors } = err {
                    for line in errors {
                        error!(target: NO_HEADING, "  {line}");
                    }
                }
                err.source()
            }
            Self::TestsFailed { .. } | Self::RerunTestsFailed { .. } => {
                // The summary already lists what failed.
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some(1), SumtestExitCode::TEST_RUN_FAILED; "test failure")]
    #[test_case(Some(2), SumtestExitCode::BUILD_FAILED; "build failure")]
    #[test_case(Some(101), 101; "passed through")]
    #[test_case(None, SumtestExitCode::TEST_RUN_FAILED; "killed by signal")]
    fn tests_failed_exit_codes(code: Option<i32>, expected: i32) {
        let error = ExpectedError::TestsFailed {
            exit: ProcessExit { code },
        };
        assert_eq!(error.process_exit_code(), expected);
    }

    #[test]
    fn rerun_errors_are_classified() {
        let failed = ExpectedError::from_rerun(RerunError::TestsFailed {
            exit: ProcessExit::from_code(1),
        });
        assert_eq!(failed.process_exit_code(), SumtestExitCode::TEST_RUN_FAILED);

        let aborted = ExpectedError::from_rerun(RerunError::TooManyFailures { count: 12, max: 10 });
        assert_eq!(aborted.process_exit_code(), SumtestExitCode::RERUN_ABORTED);

        let max_fail = ExpectedError::from_rerun(RerunError::Scan {
            round: 1,
            error: ScanError::Handler(EventHandlerError::MaxFailExceeded {
                failed: 2,
                max_fail: 2,
            }),
        });
        assert_eq!(
            max_fail.process_exit_code(),
            SumtestExitCode::MAX_FAIL_EXCEEDED
        );
    }

    #[test]
    fn scan_errors_are_classified() {
        let decode = ExpectedError::from_scan(ScanError::ReadStdout(std::io::Error::other("eof")));
        assert_eq!(decode.process_exit_code(), SumtestExitCode::DECODE_FAILED);

        let write = ExpectedError::from_scan(ScanError::Handler(EventHandlerError::Io(
            std::io::Error::other("broken pipe"),
        )));
        assert_eq!(write.process_exit_code(), SumtestExitCode::WRITE_OUTPUT_ERROR);
    }
}
