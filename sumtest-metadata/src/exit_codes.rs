// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `sumtest` failures.
///
/// `sumtest` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// If `go test` exits with a code that isn't covered here, that code is passed through unchanged.
pub enum SumtestExitCode {}

impl SumtestExitCode {
    /// No errors occurred and sumtest exited normally.
    pub const OK: i32 = 0;

    /// One or more tests failed, including after any reruns.
    ///
    /// This matches the exit code `go test` uses for test failures.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// The test run produced build or other diagnostic errors on standard error.
    pub const BUILD_FAILED: i32 = 2;

    /// Rerunning failed tests was refused or aborted.
    ///
    /// This happens if too many tests failed initially, if a rerun round produced build errors,
    /// if a crash was suspected, or if `go test` exited with an unexpected code.
    pub const RERUN_ABORTED: i32 = 3;

    /// The run was stopped early because the maximum number of failures was reached.
    pub const MAX_FAIL_EXCEEDED: i32 = 4;

    /// A user issue happened while setting up a sumtest invocation, for example a malformed
    /// config file or a `go` binary that couldn't be started.
    pub const SETUP_ERROR: i32 = 96;

    /// The output of `go test -json` could not be decoded.
    pub const DECODE_FAILED: i32 = 97;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
