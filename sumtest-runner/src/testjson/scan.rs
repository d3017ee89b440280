// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading `go test -json` output into an [`Execution`].
//!
//! Standard output and standard error are read concurrently. Each reader decodes lines and sends
//! them over a channel to a single loop which owns the execution and the handler, so all
//! mutation happens in one place.

use super::{event::TestEvent, execution::Execution, handler::EventHandler};
use crate::errors::{DisplayErrorChain, ParseEventError, ScanError};
use bytes::Bytes;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Options that control how output is scanned.
#[derive(Clone, Debug, Default)]
pub struct ScanConfig {
    ignore_non_json_output_lines: bool,
}

impl ScanConfig {
    /// Creates a new `ScanConfig` with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// If true, lines on standard output that are not JSON are treated as diagnostics rather than
    /// aborting the scan.
    pub fn set_ignore_non_json_output_lines(&mut self, ignore: bool) -> &mut Self {
        self.ignore_non_json_output_lines = ignore;
        self
    }
}

/// Scans output into a new execution.
pub async fn scan<O, E>(
    config: &ScanConfig,
    stdout: O,
    stderr: E,
    handler: &mut dyn EventHandler,
) -> Result<Execution, ScanError>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut execution = Execution::new();
    scan_into(config, &mut execution, stdout, stderr, handler).await?;
    Ok(execution)
}

/// Scans output into an existing execution.
///
/// The execution is finished with [`Execution::end`] whether or not the scan succeeds. The
/// failures synthesized for tests that never finished are only passed to `handler` if the scan
/// succeeded.
pub async fn scan_into<O, E>(
    config: &ScanConfig,
    execution: &mut Execution,
    stdout: O,
    stderr: E,
    handler: &mut dyn EventHandler,
) -> Result<(), ScanError>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    debug!(run = execution.runs() + 1, "scanning go test output");

    let result = {
        let (sender, mut receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let readers = async {
            let (stdout_res, stderr_res) = tokio::join!(
                read_stdout(stdout, config.ignore_non_json_output_lines, sender.clone()),
                read_stderr(stderr, sender),
            );
            stdout_res.and(stderr_res)
        };
        let consumer = async {
            while let Some(line) = receiver.recv().await {
                dispatch(execution, handler, line)?;
            }
            Ok::<_, ScanError>(())
        };
        tokio::pin!(readers, consumer);

        tokio::select! {
            consumed = &mut consumer => match consumed {
                // The channel is closed, so both readers are done.
                Ok(()) => readers.await,
                // The readers are dropped along with the channel.
                Err(error) => Err(error),
            },
            read = &mut readers => {
                let consumed = consumer.await;
                consumed.and(read)
            }
        }
    };

    let end_events = execution.end();
    match result {
        Ok(()) => {
            for event in &end_events {
                handler
                    .handle_event(event, execution)
                    .map_err(ScanError::Handler)?;
            }
            Ok(())
        }
        Err(error) => {
            debug!(%error, "scan failed");
            Err(error)
        }
    }
}

#[derive(Debug)]
enum ScanLine {
    Event(TestEvent),
    // A line on stdout that isn't an event, but isn't fatal either.
    Diagnostic(String),
    Stderr(String),
}

fn dispatch(
    execution: &mut Execution,
    handler: &mut dyn EventHandler,
    line: ScanLine,
) -> Result<(), ScanError> {
    match line {
        ScanLine::Event(event) => {
            execution.add(&event);
            handler
                .handle_event(&event, execution)
                .map_err(ScanError::Handler)
        }
        ScanLine::Diagnostic(line) => {
            report_diagnostic(handler, &line);
            Ok(())
        }
        ScanLine::Stderr(line) => {
            report_diagnostic(handler, &line);
            execution.add_error(&line);
            Ok(())
        }
    }
}

fn report_diagnostic(handler: &mut dyn EventHandler, line: &str) {
    if let Err(error) = handler.handle_stderr(line) {
        warn!("failed to handle diagnostic output: {}", DisplayErrorChain::new(error));
    }
}

async fn read_stdout<R: AsyncRead + Unpin>(
    stdout: R,
    ignore_non_json: bool,
    sender: mpsc::Sender<ScanLine>,
) -> Result<(), ScanError> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(ScanError::ReadStdout)?;
        if read == 0 {
            return Ok(());
        }

        let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let line = match TestEvent::parse(Bytes::copy_from_slice(raw)) {
            Ok(event) => ScanLine::Event(event),
            Err(error @ ParseEventError::BadEvent) => {
                let text = String::from_utf8_lossy(raw);
                warn!("{error}: {text}");
                ScanLine::Diagnostic(format!("{error}: {text}"))
            }
            Err(_) if ignore_non_json => {
                ScanLine::Diagnostic(String::from_utf8_lossy(raw).into_owned())
            }
            Err(error) => {
                return Err(ScanError::DecodeEvent {
                    line: String::from_utf8_lossy(raw).into_owned(),
                    error,
                });
            }
        };

        if sender.send(line).await.is_err() {
            // The consumer stopped early.
            return Ok(());
        }
    }
}

async fn read_stderr<R: AsyncRead + Unpin>(
    stderr: R,
    sender: mpsc::Sender<ScanLine>,
) -> Result<(), ScanError> {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(ScanError::ReadStderr)?;
        if read == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']).to_owned();
        if sender.send(ScanLine::Stderr(line)).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::EventHandlerError,
        testjson::{Action, PackageResult},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recording {
        events: Vec<(Action, String)>,
        stderr: Vec<String>,
        abort_on_fail: bool,
    }

    impl EventHandler for Recording {
        fn handle_event(
            &mut self,
            event: &TestEvent,
            execution: &Execution,
        ) -> Result<(), EventHandlerError> {
            // Handlers see the execution after the event was recorded.
            if event.action == Action::Run {
                let package = execution.package(&event.package).expect("package recorded");
                assert!(package.running().any(|tc| tc.name == event.test));
            }
            self.events.push((event.action, event.test.to_string()));
            if self.abort_on_fail && event.action == Action::Fail {
                return Err(EventHandlerError::MaxFailExceeded {
                    failed: 1,
                    max_fail: 1,
                });
            }
            Ok(())
        }

        fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
            self.stderr.push(line.to_owned());
            Ok(())
        }
    }

    const STDOUT: &str = indoc! {r#"
        {"Action":"run","Package":"pkg","Test":"TestA"}
        {"Action":"output","Package":"pkg","Test":"TestA","Output":"=== RUN   TestA\n"}

        {"Action":"fail","Package":"pkg","Test":"TestA","Elapsed":0.1}
        {"Action":"run","Package":"pkg","Test":"TestHang"}
        FAIL	pkg [setup failed]
        {"Action":"fail","Package":"pkg","Elapsed":0.2}
    "#};

    #[tokio::test]
    async fn scan_records_everything() {
        let mut handler = Recording::default();
        let stderr = "# pkg\npkg/a.go:1: oops\n";
        let execution = scan(
            &ScanConfig::new(),
            STDOUT.as_bytes(),
            stderr.as_bytes(),
            &mut handler,
        )
        .await
        .expect("scan succeeded");

        assert!(execution.is_done());
        assert_eq!(execution.runs(), 1);
        assert_eq!(execution.errors(), ["pkg/a.go:1: oops".to_owned()]);

        let package = execution.package("pkg").expect("package exists");
        assert_eq!(package.failed().len(), 2);
        assert_eq!(package.running().count(), 0);

        // The synthesized failure comes last.
        assert_eq!(
            handler.events.last(),
            Some(&(Action::Fail, "TestHang".to_owned()))
        );
        assert_eq!(handler.events.len(), 6);

        let mut stderr = handler.stderr.clone();
        stderr.sort();
        assert_eq!(
            stderr,
            vec![
                "# pkg".to_owned(),
                "bad output from test2json: FAIL\tpkg [setup failed]".to_owned(),
                "pkg/a.go:1: oops".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn non_json_is_fatal_by_default() {
        let mut handler = Recording::default();
        let stdout = "{\"Action\":\"run\",\"Package\":\"pkg\",\"Test\":\"TestA\"}\nhello\n";
        let mut execution = Execution::new();
        let error = scan_into(
            &ScanConfig::new(),
            &mut execution,
            stdout.as_bytes(),
            &b""[..],
            &mut handler,
        )
        .await
        .expect_err("non-JSON line is fatal");

        assert!(
            matches!(&error, ScanError::DecodeEvent { line, .. } if line == "hello"),
            "{error:?}"
        );
        // Finalized anyway, but the synthesized failure isn't reported.
        assert!(execution.is_done());
        assert_eq!(execution.failed_count(), 1);
        assert_eq!(handler.events, vec![(Action::Run, "TestA".to_owned())]);
    }

    #[tokio::test]
    async fn non_json_ignored_when_configured() {
        let mut handler = Recording::default();
        let stdout = "hello\n{\"Action\":\"skip\",\"Package\":\"pkg\",\"Elapsed\":0}\n";
        let mut config = ScanConfig::new();
        config.set_ignore_non_json_output_lines(true);

        let execution = scan(&config, stdout.as_bytes(), &b""[..], &mut handler)
            .await
            .expect("scan succeeded");

        assert_eq!(handler.stderr, vec!["hello".to_owned()]);
        assert!(execution.errors().is_empty());
        assert_eq!(
            execution.package("pkg").map(|package| package.result()),
            Some(PackageResult::Skip)
        );
    }

    #[tokio::test]
    async fn handler_abort_stops_scan() {
        let mut handler = Recording {
            abort_on_fail: true,
            ..Default::default()
        };
        let mut execution = Execution::new();
        let error = scan_into(
            &ScanConfig::new(),
            &mut execution,
            STDOUT.as_bytes(),
            &b""[..],
            &mut handler,
        )
        .await
        .expect_err("handler aborted");

        assert!(
            matches!(
                error,
                ScanError::Handler(EventHandlerError::MaxFailExceeded { .. })
            ),
            "{error:?}"
        );
        assert_eq!(
            handler.events.last(),
            Some(&(Action::Fail, "TestA".to_owned()))
        );
        assert!(execution.is_done());
    }
}
