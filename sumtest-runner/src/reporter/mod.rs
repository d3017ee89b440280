// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints progress and summaries of `go test` runs.
//!
//! The main type here is [`Reporter`], an [`EventHandler`](crate::testjson::EventHandler)
//! constructed via a [`ReporterBuilder`]. [`SummaryPrinter`] prints the summary once all runs are
//! complete.

mod compact;
mod formats;
mod helpers;
mod imp;
mod summary;

pub use imp::*;
pub use summary::*;
