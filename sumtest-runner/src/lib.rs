// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [sumtest](https://crates.io/crates/sumtest): aggregating
//! `go test -json` output, rerunning failed tests and printing progress.
//!
//! The basic flow is:
//!
//! 1. Launch `go test -json` with a [`launch::GoTestCommand`].
//! 2. [`testjson::scan`] its output into a [`testjson::Execution`], passing every event to an
//!    [`testjson::EventHandler`] such as a [`reporter::Reporter`].
//! 3. Optionally, rerun failed tests with a [`rerun::Rerunner`], which records each round into
//!    the same execution.
//! 4. Print a summary with a [`reporter::SummaryPrinter`].

pub mod config;
pub mod errors;
mod helpers;
pub mod launch;
pub mod reporter;
pub mod rerun;
pub mod testjson;
mod time;

pub use helpers::plural;
