// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of `go test -json` output.
//!
//! The main entry points are [`scan`] and [`scan_into`], which read the two output streams of
//! `go test`, record events into an [`Execution`] and pass each one to an [`EventHandler`].

mod event;
mod execution;
mod handler;
mod scan;

pub use event::*;
pub use execution::*;
pub use handler::*;
pub use scan::*;
