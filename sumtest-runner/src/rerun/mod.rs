// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rerunning failed tests to tell flaky tests apart from broken ones.
//!
//! After an initial run, [`Rerunner`] launches `go test` again for each failed test, for a
//! bounded number of rounds, recording every round into the same [`Execution`](crate::testjson::Execution).
//! [`RerunReport`] then summarizes how each test fared across all attempts.

mod imp;
mod report;
mod selection;

pub use imp::*;
pub use report::*;
pub use selection::{RerunSelection, run_expression};
