// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::selection::{FailureFilter, RerunSelection};
use crate::{
    errors::{EventHandlerError, LaunchError, RerunError},
    testjson::{
        Action, EventHandler, Execution, ScanConfig, TestCase, TestEvent, TestName, scan_into,
    },
};
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use std::{collections::BTreeSet, fmt, process::ExitStatus};
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Options for rerunning failed tests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RerunOpts {
    /// The maximum number of rerun rounds. 0 disables reruns.
    pub max_attempts: usize,

    /// Refuse to rerun if more than this many tests failed initially. 0 means no limit.
    pub max_initial_failures: usize,

    /// Rerun root tests rather than individual failed subtests.
    pub root_cases_only: bool,
}

/// How a `go test` process exited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProcessExit {
    /// The exit code, or None if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// A successful exit.
    pub const SUCCESS: Self = Self { code: Some(0) };

    /// Creates a new `ProcessExit` from an exit code.
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Returns true if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true for the exit codes `go test` uses for passing and failing tests.
    pub fn is_expected(&self) -> bool {
        matches!(self.code, Some(0 | 1))
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by a signal"),
        }
    }
}

/// A running `go test` process.
///
/// Both output streams must be read to the end before `exit` is awaited.
#[derive(Debug)]
pub struct TestProcess {
    /// Standard output of the process.
    pub stdout: DebugIgnore<Box<dyn AsyncRead + Unpin + Send>>,

    /// Standard error of the process.
    pub stderr: DebugIgnore<Box<dyn AsyncRead + Unpin + Send>>,

    /// Resolves once the process has exited.
    pub exit: DebugIgnore<BoxFuture<'static, std::io::Result<ProcessExit>>>,
}

impl TestProcess {
    /// Creates a new `TestProcess`.
    pub fn new(
        stdout: impl AsyncRead + Unpin + Send + 'static,
        stderr: impl AsyncRead + Unpin + Send + 'static,
        exit: BoxFuture<'static, std::io::Result<ProcessExit>>,
    ) -> Self {
        Self {
            stdout: DebugIgnore(Box::new(stdout)),
            stderr: DebugIgnore(Box::new(stderr)),
            exit: DebugIgnore(exit),
        }
    }
}

/// Starts `go test` for a selection of tests.
pub trait TestLauncher {
    /// Launches `go test` restricted to `selection`.
    fn launch(&mut self, selection: &RerunSelection) -> Result<TestProcess, LaunchError>;
}

impl<F> TestLauncher for F
where
    F: FnMut(&RerunSelection) -> Result<TestProcess, LaunchError>,
{
    fn launch(&mut self, selection: &RerunSelection) -> Result<TestProcess, LaunchError> {
        self(selection)
    }
}

/// Reruns failed tests over bounded rounds.
#[derive(Clone, Debug)]
pub struct Rerunner {
    opts: RerunOpts,
    scan_config: ScanConfig,
}

impl Rerunner {
    /// Creates a new `Rerunner`.
    pub fn new(opts: RerunOpts) -> Self {
        Self {
            opts,
            scan_config: ScanConfig::default(),
        }
    }

    /// Sets the scan options used for every rerun.
    pub fn set_scan_config(&mut self, scan_config: ScanConfig) -> &mut Self {
        self.scan_config = scan_config;
        self
    }

    /// Reruns the failures recorded in `execution`.
    ///
    /// Each round launches `go test` once per failure and records the results into `execution`,
    /// forwarding every event to `handler`. Rounds continue until nothing fails or
    /// `max_attempts` rounds have run.
    ///
    /// Returns `RerunError::TestsFailed` with the last failing exit of the final round if tests
    /// still failed, or another error if reruns were refused or aborted.
    pub async fn run(
        &self,
        execution: &mut Execution,
        handler: &mut dyn EventHandler,
        launcher: &mut dyn TestLauncher,
    ) -> Result<(), RerunError> {
        let max = self.opts.max_initial_failures;
        let count = execution.failed_count();
        if max > 0 && count > max {
            return Err(RerunError::TooManyFailures { count, max });
        }

        let filter = FailureFilter::new(self.opts.root_cases_only);
        let mut failures = to_owned_failures(filter.apply(&execution.failed()));

        let mut last_exit = None;
        let mut round = 0;
        while !failures.is_empty() && round < self.opts.max_attempts {
            round += 1;
            info!(round, failures = failures.len(), "rerunning failed tests");

            let errors_before = execution.errors().len();
            let mut recorder = FailureRecorder::new(handler);
            let mut round_exit = None;
            for (package, name) in &failures {
                let selection = RerunSelection::new(package.as_str(), name);
                debug!(%selection, "launching rerun");

                let process = launcher.launch(&selection)?;
                recorder.begin_launch();
                scan_into(
                    &self.scan_config,
                    execution,
                    process.stdout.0,
                    process.stderr.0,
                    &mut recorder,
                )
                .await
                .map_err(|error| RerunError::Scan { round, error })?;
                let exit = process.exit.0.await.map_err(RerunError::Wait)?;
                debug!(%selection, %exit, "rerun finished");

                classify(execution, errors_before, recorder.panicked(), exit)?;
                if !exit.is_success() {
                    round_exit = Some(exit);
                }
            }

            failures = to_owned_failures(filter.apply(recorder.failures()));
            last_exit = round_exit;
        }

        match last_exit {
            Some(exit) => Err(RerunError::TestsFailed { exit }),
            None => Ok(()),
        }
    }
}

/// Checks whether the initial run is fit to be rerun.
///
/// Reruns are refused if `go test` reported errors, if a test panicked, or if the process exited
/// with a code other than 0 or 1.
pub fn classify_initial_run(execution: &Execution, exit: ProcessExit) -> Result<(), RerunError> {
    classify(execution, 0, &execution.panicked_packages(), exit)
}

fn classify(
    execution: &Execution,
    errors_before: usize,
    panicked: &[String],
    exit: ProcessExit,
) -> Result<(), RerunError> {
    let errors = execution.errors().get(errors_before..).unwrap_or_default();
    if !errors.is_empty() {
        return Err(RerunError::PreviousRoundErrors {
            errors: errors.to_vec(),
        });
    }
    if !panicked.is_empty() {
        return Err(RerunError::SuspectedCrash {
            packages: panicked.to_vec(),
        });
    }
    if !exit.is_expected() {
        return Err(RerunError::UnexpectedExitCode { exit });
    }
    Ok(())
}

fn to_owned_failures(selected: Vec<(&str, &TestName)>) -> Vec<(String, TestName)> {
    selected
        .into_iter()
        .map(|(package, name)| (package.to_owned(), name.clone()))
        .collect()
}

/// Records the failures of a single round, and forwards every event.
struct FailureRecorder<'h> {
    inner: &'h mut dyn EventHandler,
    failures: Vec<TestCase>,
    // Packages with a test failure in the current launch.
    failed_in_launch: BTreeSet<String>,
    panicked: Vec<String>,
}

impl<'h> FailureRecorder<'h> {
    fn new(inner: &'h mut dyn EventHandler) -> Self {
        Self {
            inner,
            failures: Vec::new(),
            failed_in_launch: BTreeSet::new(),
            panicked: Vec::new(),
        }
    }

    fn begin_launch(&mut self) {
        self.failed_in_launch.clear();
    }

    fn failures(&self) -> &[TestCase] {
        &self.failures
    }

    fn panicked(&self) -> &[String] {
        &self.panicked
    }

    fn record(&mut self, event: &TestEvent, execution: &Execution) {
        match event.action {
            Action::Fail if event.is_package_event() => {
                // A package that fails without a failing test is rerun as a whole.
                if !self.failed_in_launch.contains(&event.package) {
                    self.failures.push(TestCase::package_failure(&event.package));
                }
            }
            Action::Fail => {
                let failed = execution
                    .package(&event.package)
                    .and_then(|package| package.last_failed_by_name(&event.test));
                if let Some(tc) = failed {
                    self.failures.push(tc.clone());
                    self.failed_in_launch.insert(event.package.clone());
                }
            }
            Action::Output if event.output_str().starts_with("panic: ") => {
                if !self.panicked.contains(&event.package) {
                    self.panicked.push(event.package.clone());
                }
            }
            _ => {}
        }
    }
}

impl EventHandler for FailureRecorder<'_> {
    fn handle_event(
        &mut self,
        event: &TestEvent,
        execution: &Execution,
    ) -> Result<(), EventHandlerError> {
        self.record(event, execution);
        self.inner.handle_event(event, execution)
    }

    fn handle_stderr(&mut self, line: &str) -> Result<(), EventHandlerError> {
        self.inner.handle_stderr(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testjson::NoopHandler;
    use bytes::Bytes;
    use futures::FutureExt;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use swrite::{SWrite, swrite};

    fn execution_from(stream: &str) -> Execution {
        let mut execution = Execution::new();
        for line in stream.lines() {
            let event = TestEvent::parse(Bytes::copy_from_slice(line.as_bytes()))
                .expect("valid event in fixture");
            execution.add(&event);
        }
        execution.end();
        execution
    }

    fn process(stdout: String, stderr: &'static str, code: i32) -> TestProcess {
        TestProcess::new(
            std::io::Cursor::new(stdout.into_bytes()),
            stderr.as_bytes(),
            futures::future::ready(Ok(ProcessExit::from_code(code))).boxed(),
        )
    }

    fn fail_stream(selection: &RerunSelection) -> String {
        let test = test_from_run(selection);
        format!(
            "{{\"Action\":\"run\",\"Package\":\"{pkg}\",\"Test\":\"{test}\"}}\n\
             {{\"Action\":\"fail\",\"Package\":\"{pkg}\",\"Test\":\"{test}\",\"Elapsed\":0.01}}\n\
             {{\"Action\":\"fail\",\"Package\":\"{pkg}\",\"Elapsed\":0.02}}\n",
            pkg = selection.package,
        )
    }

    fn pass_stream(selection: &RerunSelection) -> String {
        let test = test_from_run(selection);
        format!(
            "{{\"Action\":\"run\",\"Package\":\"{pkg}\",\"Test\":\"{test}\"}}\n\
             {{\"Action\":\"pass\",\"Package\":\"{pkg}\",\"Test\":\"{test}\",\"Elapsed\":0.01}}\n\
             {{\"Action\":\"pass\",\"Package\":\"{pkg}\",\"Elapsed\":0.02}}\n",
            pkg = selection.package,
        )
    }

    // Turns `^TestA$` back into `TestA` for the fixtures, which don't use metacharacters.
    fn test_from_run(selection: &RerunSelection) -> String {
        selection
            .run
            .as_deref()
            .expect("fixtures rerun single tests")
            .split('/')
            .map(|segment| segment.trim_start_matches('^').trim_end_matches('$'))
            .collect::<Vec<_>>()
            .join("/")
    }

    const TWO_FAILURES: &str = indoc! {r#"
        {"Action":"run","Package":"pkg","Test":"TestA"}
        {"Action":"fail","Package":"pkg","Test":"TestA","Elapsed":0.1}
        {"Action":"run","Package":"pkg","Test":"TestB"}
        {"Action":"fail","Package":"pkg","Test":"TestB","Elapsed":0.1}
        {"Action":"run","Package":"pkg","Test":"TestC"}
        {"Action":"pass","Package":"pkg","Test":"TestC","Elapsed":0.1}
        {"Action":"fail","Package":"pkg","Elapsed":0.3}
    "#};

    fn opts(max_attempts: usize) -> RerunOpts {
        RerunOpts {
            max_attempts,
            max_initial_failures: 0,
            root_cases_only: false,
        }
    }

    #[tokio::test]
    async fn always_failing_runs_every_round() {
        let mut execution = execution_from(TWO_FAILURES);
        let mut launches = Vec::new();
        let mut launcher = |selection: &RerunSelection| {
            launches.push(selection.to_string());
            Ok::<_, LaunchError>(process(fail_stream(selection), "", 1))
        };

        let error = Rerunner::new(opts(3))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect_err("tests keep failing");

        assert!(
            matches!(error, RerunError::TestsFailed { exit } if exit == ProcessExit::from_code(1)),
            "{error:?}"
        );
        assert!(!error.is_abort());
        assert_eq!(launches.len(), 6);
        assert_eq!(&launches[..2], ["pkg -run=^TestA$", "pkg -run=^TestB$"]);
        assert_eq!(execution.runs(), 7);
        assert_eq!(
            execution.package("pkg").map(|package| package.failed().len()),
            Some(8)
        );
    }

    #[tokio::test]
    async fn flaky_tests_pass_on_rerun() {
        let mut execution = execution_from(TWO_FAILURES);
        let mut launches = 0;
        let mut launcher = |selection: &RerunSelection| {
            launches += 1;
            // TestA passes on its first rerun, TestB on its second.
            let passes = selection.run.as_deref() == Some("^TestA$") || launches > 2;
            let (stream, code) = if passes {
                (pass_stream(selection), 0)
            } else {
                (fail_stream(selection), 1)
            };
            Ok::<_, LaunchError>(process(stream, "", code))
        };

        Rerunner::new(opts(5))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect("all tests eventually pass");
        assert_eq!(launches, 3);
    }

    #[tokio::test]
    async fn too_many_initial_failures() {
        let mut stream = String::new();
        for i in 0..5 {
            swrite!(
                stream,
                "{{\"Action\":\"run\",\"Package\":\"pkg\",\"Test\":\"Test{i}\"}}\n\
                 {{\"Action\":\"fail\",\"Package\":\"pkg\",\"Test\":\"Test{i}\",\"Elapsed\":0}}\n"
            );
        }
        let mut execution = execution_from(&stream);
        let mut launched = false;
        let mut launcher = |_: &RerunSelection| {
            launched = true;
            Ok::<_, LaunchError>(process(String::new(), "", 0))
        };

        let error = Rerunner::new(RerunOpts {
            max_attempts: 3,
            max_initial_failures: 1,
            root_cases_only: false,
        })
        .run(&mut execution, &mut NoopHandler, &mut launcher)
        .await
        .expect_err("too many failures");

        assert!(
            matches!(error, RerunError::TooManyFailures { count: 5, max: 1 }),
            "{error:?}"
        );
        assert!(!launched);
    }

    #[tokio::test]
    async fn ceiling_counts_every_initial_failure() {
        // Three failures, but only the two subtests would be rerun.
        let mut execution = execution_from(indoc! {r#"
            {"Action":"run","Package":"pkg","Test":"TestRoot"}
            {"Action":"run","Package":"pkg","Test":"TestRoot/a"}
            {"Action":"fail","Package":"pkg","Test":"TestRoot/a","Elapsed":0}
            {"Action":"run","Package":"pkg","Test":"TestRoot/b"}
            {"Action":"fail","Package":"pkg","Test":"TestRoot/b","Elapsed":0}
            {"Action":"fail","Package":"pkg","Test":"TestRoot","Elapsed":0}
            {"Action":"fail","Package":"pkg","Elapsed":0}
        "#});
        let mut launched = false;
        let mut launcher = |_: &RerunSelection| {
            launched = true;
            Ok::<_, LaunchError>(process(String::new(), "", 0))
        };

        let error = Rerunner::new(RerunOpts {
            max_attempts: 3,
            max_initial_failures: 2,
            root_cases_only: false,
        })
        .run(&mut execution, &mut NoopHandler, &mut launcher)
        .await
        .expect_err("too many failures");

        assert!(
            matches!(error, RerunError::TooManyFailures { count: 3, max: 2 }),
            "{error:?}"
        );
        assert!(!launched);
    }

    #[tokio::test]
    async fn errors_abort_rerun() {
        let mut execution = execution_from(TWO_FAILURES);
        let mut launches = 0;
        let mut launcher = |selection: &RerunSelection| {
            launches += 1;
            Ok::<_, LaunchError>(process(
                fail_stream(selection),
                "pkg/a.go:1:1: undefined: x\n",
                2,
            ))
        };

        let error = Rerunner::new(opts(3))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect_err("build error aborts");

        assert!(
            matches!(&error, RerunError::PreviousRoundErrors { errors } if errors.len() == 1),
            "{error:?}"
        );
        assert!(error.is_abort());
        assert_eq!(launches, 1);
    }

    #[tokio::test]
    async fn panic_aborts_rerun() {
        let mut execution = execution_from(TWO_FAILURES);
        let mut launcher = |selection: &RerunSelection| {
            let stream = format!(
                "{{\"Action\":\"output\",\"Package\":\"{pkg}\",\"Output\":\"panic: boom\\n\"}}\n{}",
                fail_stream(selection),
                pkg = selection.package,
            );
            Ok::<_, LaunchError>(process(stream, "", 1))
        };

        let error = Rerunner::new(opts(3))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect_err("panic aborts");
        assert!(
            matches!(&error, RerunError::SuspectedCrash { packages } if packages == &["pkg"]),
            "{error:?}"
        );
    }

    #[tokio::test]
    async fn unexpected_exit_code_aborts_rerun() {
        let mut execution = execution_from(TWO_FAILURES);
        let mut launcher = |selection: &RerunSelection| {
            Ok::<_, LaunchError>(process(fail_stream(selection), "", 3))
        };

        let error = Rerunner::new(opts(3))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect_err("exit code 3 aborts");
        assert!(
            matches!(error, RerunError::UnexpectedExitCode { exit } if exit.code == Some(3)),
            "{error:?}"
        );
    }

    #[tokio::test]
    async fn test_main_failure_reruns_package() {
        let mut execution = execution_from(indoc! {r#"
            {"Action":"output","Package":"pkg/init","Output":"FAIL\tpkg/init\t0.001s\n"}
            {"Action":"fail","Package":"pkg/init","Elapsed":0.001}
        "#});
        let mut selections = Vec::new();
        let mut launcher = |selection: &RerunSelection| {
            selections.push(selection.clone());
            let stream = "{\"Action\":\"fail\",\"Package\":\"pkg/init\",\"Elapsed\":0.001}\n";
            Ok::<_, LaunchError>(process(stream.to_owned(), "", 1))
        };

        let error = Rerunner::new(opts(2))
            .run(&mut execution, &mut NoopHandler, &mut launcher)
            .await
            .expect_err("package keeps failing");
        assert!(matches!(error, RerunError::TestsFailed { .. }), "{error:?}");
        assert_eq!(
            selections,
            vec![
                RerunSelection {
                    package: "pkg/init".to_owned(),
                    run: None
                };
                2
            ]
        );
    }

    #[test]
    fn classify_initial() {
        let execution = execution_from(TWO_FAILURES);
        classify_initial_run(&execution, ProcessExit::from_code(1)).expect("normal failure");

        let error = classify_initial_run(&execution, ProcessExit { code: None })
            .expect_err("signal is unexpected");
        assert_eq!(
            error.to_string(),
            "rerun aborted: unexpected exit code (terminated by a signal)"
        );
    }
}
