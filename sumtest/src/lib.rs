// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `sumtest` binary: runs `go test -json`, prints progress in a chosen format followed by a
//! summary, and optionally reruns failed tests.
//!
//! This crate is not meant to be used as a library. For the event aggregation, formatting and
//! rerun logic, see [`sumtest_runner`].

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;

use errors::Result;
