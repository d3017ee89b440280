// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{compact::CompactFormatter, formats, helpers::Styles};
use crate::{
    errors::{EventHandlerError, FormatKindParseError},
    testjson::{EventHandler, Execution, TestEvent},
};
use serde::{Deserialize, de::Error as _};
use std::{
    fmt,
    io::{self, Write},
    str::FromStr,
};
use tracing::debug;

const DEFAULT_WIDTH: usize = 80;

/// The format progress is printed in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FormatKind {
    /// Finished packages packed onto as few lines as possible.
    #[default]
    Compact,

    /// One line per package.
    PkgName,

    /// One line per test.
    TestName,

    /// The output of `go test -v`.
    StandardVerbose,

    /// The output of `go test`.
    StandardQuiet,
}

impl FormatKind {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &[
            "compact",
            "pkgname",
            "testname",
            "standard-verbose",
            "standard-quiet",
        ]
    }

    /// Returns the string representation of this format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::PkgName => "pkgname",
            Self::TestName => "testname",
            Self::StandardVerbose => "standard-verbose",
            Self::StandardQuiet => "standard-quiet",
        }
    }
}

impl FromStr for FormatKind {
    type Err = FormatKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "compact" => Self::Compact,
            "pkgname" => Self::PkgName,
            "testname" => Self::TestName,
            "standard-verbose" => Self::StandardVerbose,
            "standard-quiet" => Self::StandardQuiet,
            other => {
                return Err(FormatKindParseError {
                    input: other.to_owned(),
                });
            }
        };
        Ok(kind)
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FormatKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Builds a [`Reporter`].
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    format: FormatKind,
    wall_clock: bool,
    width: Option<usize>,
    module_path: Option<String>,
    colorize: bool,
}

impl ReporterBuilder {
    /// Sets the format to print progress in.
    pub fn set_format(&mut self, format: FormatKind) -> &mut Self {
        self.format = format;
        self
    }

    /// Prefixes each new line of compact output with the time elapsed since the start.
    pub fn set_wall_clock(&mut self, wall_clock: bool) -> &mut Self {
        self.wall_clock = wall_clock;
        self
    }

    /// Sets the terminal width used to pack compact output. Defaults to the width of the
    /// terminal, or 80 columns if that can't be determined.
    pub fn set_width(&mut self, width: usize) -> &mut Self {
        self.width = Some(width);
        self
    }

    /// Sets the Go module path, which is stripped from package names.
    pub fn set_module_path(&mut self, module_path: impl Into<String>) -> &mut Self {
        self.module_path = Some(module_path.into());
        self
    }

    /// Colorizes output.
    pub fn set_colorize(&mut self, colorize: bool) -> &mut Self {
        self.colorize = colorize;
        self
    }

    /// Creates a reporter that writes to `writer`.
    pub fn build<W: Write>(&self, writer: W) -> Reporter<W> {
        let mut styles: Box<Styles> = Box::default();
        if self.colorize {
            styles.colorize();
        }

        let state = match self.format {
            FormatKind::Compact => {
                let width = self.width.unwrap_or_else(terminal_width);
                FormatState::Compact(CompactFormatter::new(width, self.wall_clock))
            }
            FormatKind::PkgName => FormatState::PkgName,
            FormatKind::TestName => FormatState::TestName,
            FormatKind::StandardVerbose => FormatState::StandardVerbose,
            FormatKind::StandardQuiet => FormatState::StandardQuiet,
        };

        Reporter {
            writer,
            state,
            module_path: self.module_path.clone(),
            styles,
        }
    }
}

fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((columns, _)) if columns > 0 => usize::from(columns),
        Ok(_) => DEFAULT_WIDTH,
        Err(error) => {
            debug!(%error, "unable to determine terminal width, using {DEFAULT_WIDTH}");
            DEFAULT_WIDTH
        }
    }
}

#[derive(Debug)]
enum FormatState {
    Compact(CompactFormatter),
    PkgName,
    TestName,
    StandardVerbose,
    StandardQuiet,
}

/// Prints progress as events arrive.
///
/// Created through [`ReporterBuilder`].
#[derive(Debug)]
pub struct Reporter<W> {
    writer: W,
    state: FormatState,
    module_path: Option<String>,
    styles: Box<Styles>,
}

impl<W: Write> Reporter<W> {
    /// Returns the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn write_event(&mut self, event: &TestEvent, execution: &Execution) -> io::Result<()> {
        let module_path = self.module_path.as_deref();
        let writer: &mut dyn Write = &mut self.writer;
        match &mut self.state {
            FormatState::Compact(compact) => {
                compact.write_event(event, execution, module_path, &self.styles, writer)
            }
            FormatState::PkgName => {
                formats::write_pkgname(event, execution, module_path, &self.styles, writer)
            }
            FormatState::TestName => {
                formats::write_testname(event, execution, module_path, &self.styles, writer)
            }
            FormatState::StandardVerbose => formats::write_standard_verbose(event, writer),
            FormatState::StandardQuiet => formats::write_standard_quiet(event, execution, writer),
        }
    }

    fn write_stderr(&mut self, line: &str) -> io::Result<()> {
        if let FormatState::Compact(compact) = &mut self.state {
            compact.interrupt(&mut self.writer)?;
        }
        writeln!(self.writer, "{line}")
    }
}

impl<W: Write> EventHandler for Reporter<W> {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        self.write_event(event, execution)
            .and_then(|()| self.writer.flush())
            .map_err(EventHandlerError::Io)
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        self.write_stderr(line)
            .and_then(|()| self.writer.flush())
            .map_err(EventHandlerError::Io)
    }

    fn finish(&mut self) -> Result<(), EventHandlerError> {
        if let FormatState::Compact(compact) = &mut self.state {
            compact.finish(&mut self.writer).map_err(EventHandlerError::Io)?;
        }
        self.writer.flush().map_err(EventHandlerError::Io)
    }
}
