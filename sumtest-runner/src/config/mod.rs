// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for sumtest.
//!
//! Configuration is read from an embedded default config, layered with
//! `.config/sumtest.toml` (or a file passed in explicitly). Command-line options and `SUMTEST_*`
//! environment variables are applied on top of it by the binary.

mod imp;
mod max_fail;

pub use imp::*;
pub use max_fail::*;
