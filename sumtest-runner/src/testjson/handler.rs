// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    event::{Action, TestEvent},
    execution::Execution,
};
use crate::{config::MaxFail, errors::EventHandlerError};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::File,
    io::{BufWriter, Write},
};

/// Receives every event of a scan after it has been recorded into the [`Execution`].
///
/// Handlers are composed by wrapping: each wrapper does its own work and forwards to the handler
/// it wraps.
pub trait EventHandler {
    /// Handles a single event. The execution already reflects the event.
    ///
    /// Returning an error stops the scan.
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError>;

    /// Handles a line that isn't an event, usually one written to standard error.
    ///
    /// Errors are logged by the scanner and never stop the scan.
    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError>;

    /// Called once all runs are complete.
    fn finish(&mut self) -> Result<(), EventHandlerError> {
        Ok(())
    }
}

impl<H: EventHandler + ?Sized> EventHandler for &mut H {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        (**self).handle_event(event, execution)
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        (**self).handle_stderr(line)
    }

    fn finish(&mut self) -> Result<(), EventHandlerError> {
        (**self).finish()
    }
}

impl<H: EventHandler + ?Sized> EventHandler for Box<H> {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        (**self).handle_event(event, execution)
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        (**self).handle_stderr(line)
    }

    fn finish(&mut self) -> Result<(), EventHandlerError> {
        (**self).finish()
    }
}

/// A handler that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn handle_event(&mut self, _: &TestEvent, _: &Execution) -> Result<(), EventHandlerError> {
        Ok(())
    }

    fn handle_stderr(&mut self, _: &str) -> Result<(), EventHandlerError> {
        Ok(())
    }
}

#[derive(Debug)]
struct FileSink {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    fn create(path: &Utf8Path) -> Result<Self, EventHandlerError> {
        let fs_error = |error| EventHandlerError::Fs {
            file: path.to_owned(),
            error,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(fs_error)?;
        }
        let file = File::create(path).map_err(fs_error)?;
        Ok(Self {
            path: path.to_owned(),
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, line: &[u8]) -> Result<(), EventHandlerError> {
        self.writer
            .write_all(line)
            .and_then(|()| self.writer.write_all(b"\n"))
            .map_err(|error| self.error(error))
    }

    fn flush(&mut self) -> Result<(), EventHandlerError> {
        self.writer.flush().map_err(|error| self.error(error))
    }

    fn error(&self, error: std::io::Error) -> EventHandlerError {
        EventHandlerError::Fs {
            file: self.path.clone(),
            error,
        }
    }
}

/// Writes every event verbatim to a file, and optionally every diagnostic line to another file,
/// before forwarding to the wrapped handler.
#[derive(Debug)]
pub struct JsonFileHandler<H> {
    inner: H,
    events: Option<FileSink>,
    stderr: Option<FileSink>,
}

impl<H: EventHandler> JsonFileHandler<H> {
    /// Creates the output files (and their parent directories) and wraps `inner`.
    pub fn create(
        inner: H,
        events_path: Option<&Utf8Path>,
        stderr_path: Option<&Utf8Path>,
    ) -> Result<Self, EventHandlerError> {
        Ok(Self {
            inner,
            events: events_path.map(FileSink::create).transpose()?,
            stderr: stderr_path.map(FileSink::create).transpose()?,
        })
    }

    /// Returns the wrapped handler.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: EventHandler> EventHandler for JsonFileHandler<H> {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        if let Some(events) = &mut self.events {
            events.write_line(event.raw())?;
        }
        self.inner.handle_event(event, execution)
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        let written = match &mut self.stderr {
            Some(stderr) => stderr.write_line(line.as_bytes()),
            None => Ok(()),
        };
        // Forward even if the write failed.
        let forwarded = self.inner.handle_stderr(line);
        written.and(forwarded)
    }

    fn finish(&mut self) -> Result<(), EventHandlerError> {
        for sink in [&mut self.events, &mut self.stderr].into_iter().flatten() {
            sink.flush()?;
        }
        self.inner.finish()
    }
}

/// Stops the scan once the number of failures reaches the configured maximum.
#[derive(Debug)]
pub struct MaxFailHandler<H> {
    inner: H,
    max_fail: MaxFail,
}

impl<H: EventHandler> MaxFailHandler<H> {
    /// Wraps `inner`.
    pub fn new(inner: H, max_fail: MaxFail) -> Self {
        Self { inner, max_fail }
    }
}

impl<H: EventHandler> EventHandler for MaxFailHandler<H> {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        self.inner.handle_event(event, execution)?;

        if event.action == Action::Fail {
            let failed = execution.failed_count();
            if let Some(max_fail) = self.max_fail.is_exceeded(failed) {
                return Err(EventHandlerError::MaxFailExceeded { failed, max_fail });
            }
        }
        Ok(())
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        self.inner.handle_stderr(line)
    }

    fn finish(&mut self) -> Result<(), EventHandlerError> {
        self.inner.finish()
    }
}
