// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for [sumtest](https://crates.io/crates/sumtest).
//!
//! sumtest can produce a report of tests that were rerun after failing, and exits with documented
//! exit codes. This crate provides the types needed to consume both without depending on the full
//! runner.

mod exit_codes;
mod rerun_report;

pub use exit_codes::*;
pub use rerun_report::*;
