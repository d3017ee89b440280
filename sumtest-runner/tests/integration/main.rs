// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: scanning, reporting, rerunning and writing reports through the public API.

mod fixtures;
mod pipeline;
#[cfg(unix)]
mod subprocess;
