// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory model of a `go test` run.
//!
//! An [`Execution`] is built up one event at a time by [`Execution::add`] and
//! [`Execution::add_error`]. It may accumulate several runs of `go test`: reruns append to the same
//! instance so the final summary reflects every attempt.

use super::event::{Action, TestEvent, TestName};
use crate::time::{StopwatchStart, stopwatch};
use chrono::{DateTime, FixedOffset, Local};
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use tracing::debug;

/// How long a test took to run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestDuration {
    /// The test finished in this much time.
    Finished(Duration),

    /// The test was still running when the output ended.
    NeverFinished,
}

impl TestDuration {
    /// Returns the duration if the test finished.
    pub fn finished(self) -> Option<Duration> {
        match self {
            Self::Finished(duration) => Some(duration),
            Self::NeverFinished => None,
        }
    }
}

/// A single test that ran (or started running) within a package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    /// The import path of the package.
    pub package: String,

    /// The name of the test. Empty for a package-level failure.
    pub name: TestName,

    /// When the test started, if known.
    pub time: Option<DateTime<FixedOffset>>,

    /// How long the test took.
    pub elapsed: TestDuration,

    /// Set on a root test when one of its subtests failed.
    pub has_failed_subtest: bool,
}

impl TestCase {
    fn from_event(event: &TestEvent) -> Self {
        Self {
            package: event.package.clone(),
            name: event.test.clone(),
            time: event.time,
            elapsed: TestDuration::NeverFinished,
            has_failed_subtest: false,
        }
    }

    /// Creates the nameless entry recorded for a package that failed outside of any test.
    pub fn package_failure(package: &str) -> Self {
        Self {
            package: package.to_owned(),
            name: TestName::default(),
            time: None,
            elapsed: TestDuration::NeverFinished,
            has_failed_subtest: false,
        }
    }

    /// Returns the `package.Test` name used in reports.
    pub fn qualified_name(&self) -> String {
        if self.name.is_empty() {
            self.package.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }
}

/// The terminal action reported for a package.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageAction {
    /// The package passed.
    Pass,
    /// The package failed.
    Fail,
    /// The package was skipped, usually because it has no test files.
    Skip,
}

/// The overall result of a package, as displayed by the formatters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageResult {
    /// All tests passed.
    Pass,
    /// At least one test failed, or the test binary itself failed.
    Fail,
    /// The package has no tests, or was skipped.
    Skip,
}

/// Everything known about a single package.
#[derive(Clone, Debug, Default)]
pub struct Package {
    total: usize,
    // Tests started since the last call to `end`.
    run_total: usize,
    running: BTreeMap<TestName, TestCase>,
    failed: Vec<TestCase>,
    skipped: Vec<TestCase>,
    passed: Vec<TestCase>,
    // Output is keyed by root test, then by the subtest path below it. `go test -json` attributes
    // output of parallel subtests to whichever test happened to be reported last, so the output
    // of a root test is only trustworthy as the union of its subtests. Keeping the two levels
    // lets subtest output be returned on its own while a passing-subtest root still gets
    // everything.
    output: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    coverage: Option<String>,
    action: Option<PackageAction>,
    elapsed: Option<Duration>,
    cached: bool,
    panicked: bool,
}

impl Package {
    /// Returns the number of tests that started in this package.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Returns the tests still marked running.
    pub fn running(&self) -> impl Iterator<Item = &TestCase> + '_ {
        self.running.values()
    }

    /// Returns the failed tests, in completion order.
    pub fn failed(&self) -> &[TestCase] {
        &self.failed
    }

    /// Returns the skipped tests, in completion order.
    pub fn skipped(&self) -> &[TestCase] {
        &self.skipped
    }

    /// Returns the passed tests, in completion order.
    pub fn passed(&self) -> &[TestCase] {
        &self.passed
    }

    /// Returns the coverage line reported by the package, if any.
    pub fn coverage(&self) -> Option<&str> {
        self.coverage.as_deref()
    }

    /// Returns the terminal action reported for the package, if one has been seen.
    pub fn action(&self) -> Option<PackageAction> {
        self.action
    }

    /// Returns the elapsed time reported for the package.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Returns true if `go test` reused a cached result for this package.
    pub fn cached(&self) -> bool {
        self.cached
    }

    /// Returns true if any output from this package looked like a panic.
    pub fn panicked(&self) -> bool {
        self.panicked
    }

    /// Returns true if the package failed without any test failing.
    ///
    /// This happens when `TestMain` or package initialization fails, or when the test binary
    /// crashes before reporting a test.
    pub fn test_main_failed(&self) -> bool {
        self.action == Some(PackageAction::Fail) && self.failed.is_empty()
    }

    /// Returns the overall result of the package.
    pub fn result(&self) -> PackageResult {
        if self.action == Some(PackageAction::Fail) || !self.failed.is_empty() {
            PackageResult::Fail
        } else if self.action == Some(PackageAction::Skip)
            || (self.passed.is_empty() && self.skipped.is_empty() && self.total == 0)
        {
            PackageResult::Skip
        } else {
            PackageResult::Pass
        }
    }

    /// Returns the result reported by a package-level terminal action in the current run.
    ///
    /// Unlike [`Self::result`], earlier runs are not taken into account: a package that failed
    /// initially and passes when rerun reports a pass. A pass in a run that started no tests is
    /// reported as [`PackageResult::Skip`].
    pub fn run_result(&self, action: Action) -> Option<PackageResult> {
        if !action.is_terminal() {
            return None;
        }
        let result = match action {
            Action::Fail => PackageResult::Fail,
            Action::Pass if self.run_total > 0 => PackageResult::Pass,
            _ => PackageResult::Skip,
        };
        Some(result)
    }

    /// Returns the output lines recorded for exactly this test, not including subtests.
    ///
    /// The empty name returns package-level output.
    pub fn output(&self, name: &TestName) -> &[String] {
        let (root, sub) = name.split();
        self.output
            .get(root)
            .and_then(|subs| subs.get(sub))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the output lines to show for a test case.
    ///
    /// * For a subtest, its own output.
    /// * For a root test whose subtests all passed, the output of the root and every subtest in
    ///   name order.
    /// * For a root test with failed subtests, the output of the failed subtests only, in name
    ///   order.
    pub fn output_lines(&self, tc: &TestCase) -> Vec<&str> {
        let (root, sub) = tc.name.split();
        let Some(subs) = self.output.get(root) else {
            return Vec::new();
        };

        if !sub.is_empty() {
            return subs
                .get(sub)
                .map(|lines| lines.iter().map(String::as_str).collect())
                .unwrap_or_default();
        }

        if !tc.has_failed_subtest {
            return subs.values().flatten().map(String::as_str).collect();
        }

        let failing: BTreeSet<&str> = self
            .failed
            .iter()
            .filter(|failed| failed.name.is_subtest() && failed.name.root() == root)
            .map(|failed| failed.name.split().1)
            .collect();
        subs.iter()
            .filter(|(sub, _)| failing.contains(sub.as_str()))
            .flat_map(|(_, lines)| lines.iter().map(String::as_str))
            .collect()
    }

    /// Returns the most recent failure of the named test.
    pub fn last_failed_by_name(&self, name: &TestName) -> Option<&TestCase> {
        self.failed.iter().rev().find(|tc| &tc.name == name)
    }

    fn add_event(&mut self, event: &TestEvent) {
        if event.action == Action::Output && event.output_str().starts_with("panic: ") {
            self.panicked = true;
        }

        if event.is_package_event() {
            self.add_package_event(event);
        } else {
            self.add_test_event(event);
        }
    }

    fn add_package_event(&mut self, event: &TestEvent) {
        match event.action {
            Action::Pass | Action::Fail | Action::Skip => {
                self.action = Some(match event.action {
                    Action::Pass => PackageAction::Pass,
                    Action::Fail => PackageAction::Fail,
                    _ => PackageAction::Skip,
                });
                self.elapsed = Some(event.elapsed_duration());
            }
            Action::Output => {
                let output = event.output_str();
                if is_coverage_output(output) {
                    self.coverage = Some(output.trim().to_owned());
                }
                if is_cached_output(output) {
                    self.cached = true;
                }
                self.push_output("", "", output);
            }
            Action::Start | Action::Run | Action::Pause | Action::Cont | Action::Bench => {}
        }
    }

    fn add_test_event(&mut self, event: &TestEvent) {
        match event.action {
            Action::Run => {
                self.total += 1;
                self.run_total += 1;
                self.running
                    .insert(event.test.clone(), TestCase::from_event(event));
            }
            Action::Output | Action::Bench => {
                let (root, sub) = event.test.split();
                self.push_output(root, sub, event.output_str());
            }
            Action::Pass | Action::Fail | Action::Skip => {
                let mut tc = self
                    .running
                    .remove(&event.test)
                    .unwrap_or_else(|| TestCase::from_event(event));
                tc.elapsed = TestDuration::Finished(event.elapsed_duration());

                match event.action {
                    Action::Pass => self.passed.push(tc),
                    Action::Skip => self.skipped.push(tc),
                    _ => {
                        if event.test.is_subtest() {
                            self.mark_failed_subtest(event.test.root());
                        }
                        self.failed.push(tc);
                    }
                }
            }
            Action::Start | Action::Pause | Action::Cont => {}
        }
    }

    fn mark_failed_subtest(&mut self, root: &str) {
        if let Some(root) = self.running.get_mut(&TestName::new(root)) {
            root.has_failed_subtest = true;
        }
    }

    fn push_output(&mut self, root: &str, sub: &str, line: &str) {
        self.output
            .entry(root.to_owned())
            .or_default()
            .entry(sub.to_owned())
            .or_default()
            .push(line.to_owned());
    }

    fn end(&mut self, package: &str) -> Vec<TestEvent> {
        // A root that is still running has a subtest still running too, and that subtest is about
        // to be recorded as a failure.
        let roots: Vec<TestName> = self
            .running
            .keys()
            .filter(|name| name.is_subtest())
            .map(|name| TestName::new(name.root()))
            .collect();
        for root in roots {
            if let Some(tc) = self.running.get_mut(&root) {
                tc.has_failed_subtest = true;
            }
        }

        self.run_total = 0;
        let running = std::mem::take(&mut self.running);
        let mut events = Vec::with_capacity(running.len());
        for (name, mut tc) in running {
            tc.elapsed = TestDuration::NeverFinished;
            events.push(TestEvent::synthesized(Action::Fail, package, name));
            self.failed.push(tc);
        }
        events
    }
}

/// The aggregated state of one or more `go test` runs.
#[derive(Clone, Debug)]
pub struct Execution {
    stopwatch: StopwatchStart,
    packages: BTreeMap<String, Package>,
    errors: Vec<String>,
    done: bool,
    runs: usize,
}

impl Default for Execution {
    fn default() -> Self {
        Self::new()
    }
}

impl Execution {
    /// Creates a new, empty execution and starts its clock.
    pub fn new() -> Self {
        Self {
            stopwatch: stopwatch(),
            packages: BTreeMap::new(),
            errors: Vec::new(),
            done: false,
            runs: 0,
        }
    }

    /// Records a single event.
    pub fn add(&mut self, event: &TestEvent) {
        self.packages
            .entry(event.package.clone())
            .or_default()
            .add_event(event);
    }

    /// Records a line that `go test` wrote to standard error.
    ///
    /// Build headers, module download progress and go debug output are not errors and are
    /// dropped.
    pub fn add_error(&mut self, line: &str) {
        if is_ignored_diagnostic(line) {
            return;
        }
        self.errors.push(line.to_owned());
    }

    /// Finishes a run: every test still running is recorded as a failure that never finished.
    ///
    /// Returns a synthesized `fail` event for each such test, in package then test name order, so
    /// handlers can report them.
    pub fn end(&mut self) -> Vec<TestEvent> {
        let mut events = Vec::new();
        for (name, package) in &mut self.packages {
            events.extend(package.end(name));
        }
        if !events.is_empty() {
            debug!(count = events.len(), "tests never finished");
        }
        self.done = true;
        self.runs += 1;
        events
    }

    /// Returns the total number of tests started across all packages.
    pub fn total(&self) -> usize {
        self.packages.values().map(Package::total).sum()
    }

    /// Returns every failure: a nameless entry for each package whose test binary failed without
    /// a test failing, followed by that package's failed tests.
    pub fn failed(&self) -> Vec<TestCase> {
        let mut failed = Vec::new();
        for (name, package) in &self.packages {
            if package.test_main_failed() {
                let mut tc = TestCase::package_failure(name);
                tc.elapsed = TestDuration::Finished(package.elapsed.unwrap_or_default());
                failed.push(tc);
            }
            failed.extend(package.failed.iter().cloned());
        }
        failed
    }

    /// Returns the number of entries [`Self::failed`] would return.
    pub fn failed_count(&self) -> usize {
        self.packages
            .values()
            .map(|package| package.failed.len() + usize::from(package.test_main_failed()))
            .sum()
    }

    /// Returns every skipped test.
    pub fn skipped(&self) -> impl Iterator<Item = &TestCase> + '_ {
        self.packages.values().flat_map(|package| &package.skipped)
    }

    /// Looks up a package by import path.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Returns all packages, sorted by import path.
    pub fn packages(&self) -> impl Iterator<Item = (&str, &Package)> + '_ {
        self.packages
            .iter()
            .map(|(name, package)| (name.as_str(), package))
    }

    /// Returns the lines recorded by [`Self::add_error`].
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Returns true if any package produced output that looks like a panic.
    pub fn has_panic(&self) -> bool {
        self.packages.values().any(Package::panicked)
    }

    /// Returns the packages that produced output that looks like a panic.
    pub fn panicked_packages(&self) -> Vec<String> {
        self.packages
            .iter()
            .filter(|(_, package)| package.panicked)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns the time elapsed since the execution was created.
    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    /// Returns the time the execution was created.
    pub fn started(&self) -> DateTime<Local> {
        self.stopwatch.start_time()
    }

    /// Returns true once a run has been finished with [`Self::end`].
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Returns the number of `go test` runs recorded into this execution.
    pub fn runs(&self) -> usize {
        self.runs
    }
}

fn is_coverage_output(output: &str) -> bool {
    let output = output.trim_end_matches('\n');
    output.starts_with("coverage:") && output.ends_with("% of statements")
}

fn is_cached_output(output: &str) -> bool {
    output.contains("(cached)")
}

fn is_ignored_diagnostic(line: &str) -> bool {
    const GO_MODULE_PREFIXES: &[&str] = &[
        "go: copying ",
        "go: creating ",
        "go: downloading ",
        "go: extracting ",
        "go: finding ",
    ];
    const GO_DEBUG_PREFIXES: &[&str] = &["HASH", "testcache:"];

    line.trim().is_empty()
        || line.starts_with("# ")
        || line.starts_with("warning: no packages being tested depend on matches")
        || GO_MODULE_PREFIXES
            .iter()
            .chain(GO_DEBUG_PREFIXES)
            .any(|prefix| line.starts_with(prefix))
}
