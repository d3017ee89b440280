// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::MaxFail;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    reporter::{FormatKind, SummarizeFlags, SummarySection},
    rerun::{RerunOpts, RerunReportFormat},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Overall configuration for sumtest.
#[derive(Clone, Debug)]
pub struct SumtestConfig {
    root: Utf8PathBuf,
    inner: SumtestConfigDeserialize,
}

impl SumtestConfig {
    /// The default location of the config within a directory.
    pub const CONFIG_PATH: &'static str = ".config/sumtest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/sumtest.toml` under
    /// `root`.
    ///
    /// Unknown keys are reported as warnings. Relative paths in the config are resolved against
    /// `root`.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_impl(root, config_file, |config_file, unknown| {
            warn!(
                "ignoring unknown configuration keys in config file {config_file}: {}",
                unknown.iter().join(", ")
            );
        })
    }

    // A custom unknown_callback can be passed in while testing.
    fn from_sources_impl(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        mut unknown_callback: impl FnMut(&Utf8Path, &BTreeSet<String>),
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let (inner, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            unknown_callback(&config_file, &unknown);
        }

        Ok(Self { root, inner })
    }

    /// Returns the output format.
    pub fn format(&self) -> FormatKind {
        self.inner.format
    }

    /// Returns true if new lines of compact output get an elapsed time prefix.
    pub fn wall_clock(&self) -> bool {
        self.inner.wall_clock
    }

    /// Returns the max-fail setting.
    pub fn max_fail(&self) -> MaxFail {
        self.inner.max_fail
    }

    /// Returns true if non-JSON lines on standard output should be treated as diagnostics.
    pub fn ignore_non_json_output_lines(&self) -> bool {
        self.inner.ignore_non_json_output_lines
    }

    /// Returns the summary sections to show.
    pub fn summarize(&self) -> SummarizeFlags {
        SummarizeFlags::all().without(&self.inner.hide_summary)
    }

    /// Returns the path to write events to, if any.
    pub fn jsonfile(&self) -> Option<Utf8PathBuf> {
        self.inner.jsonfile.as_deref().map(|path| self.root.join(path))
    }

    /// Returns the path to write standard error to, if any.
    pub fn stderr_file(&self) -> Option<Utf8PathBuf> {
        self.inner.stderr_file.as_deref().map(|path| self.root.join(path))
    }

    /// Returns the rerun options.
    pub fn rerun_opts(&self) -> RerunOpts {
        let rerun = &self.inner.rerun;
        RerunOpts {
            max_attempts: rerun.max_attempts,
            max_initial_failures: rerun.max_initial_failures,
            root_cases_only: rerun.root_cases_only,
        }
    }

    /// Returns the path to write the rerun report to, if any.
    pub fn rerun_report(&self) -> Option<Utf8PathBuf> {
        self.inner.rerun.report.as_deref().map(|path| self.root.join(path))
    }

    /// Returns the format of the rerun report.
    pub fn rerun_report_format(&self) -> RerunReportFormat {
        self.inner.rerun.report_format
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(SumtestConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let config: SumtestConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                ignored.insert(path.to_string());
            })
            .map_err(|error| ConfigParseErrorKind::DeserializeError(Box::new(error)))?;

        Ok((config, ignored))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SumtestConfigDeserialize {
    format: FormatKind,
    wall_clock: bool,
    max_fail: MaxFail,
    ignore_non_json_output_lines: bool,
    #[serde(default)]
    hide_summary: Vec<SummarySection>,
    #[serde(default)]
    jsonfile: Option<Utf8PathBuf>,
    #[serde(default)]
    stderr_file: Option<Utf8PathBuf>,
    rerun: RerunConfigDeserialize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RerunConfigDeserialize {
    max_attempts: usize,
    max_initial_failures: usize,
    root_cases_only: bool,
    report_format: RerunReportFormat,
    #[serde(default)]
    report: Option<Utf8PathBuf>,
}
