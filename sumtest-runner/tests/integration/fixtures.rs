// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use futures::FutureExt;
use indoc::indoc;
use sumtest_runner::rerun::{ProcessExit, RerunSelection, TestProcess};

pub(crate) const MODULE_PATH: &str = "example.com/m";

/// One flaky test in package `a`, and a passing package `b`.
pub(crate) const INITIAL_RUN: &str = indoc! {r#"
    {"Action":"start","Package":"example.com/m/a"}
    {"Action":"run","Package":"example.com/m/a","Test":"TestOk"}
    {"Action":"pass","Package":"example.com/m/a","Test":"TestOk","Elapsed":0.01}
    {"Action":"run","Package":"example.com/m/a","Test":"TestFlaky"}
    {"Action":"output","Package":"example.com/m/a","Test":"TestFlaky","Output":"    flaky_test.go:12: try again\n"}
    {"Action":"fail","Package":"example.com/m/a","Test":"TestFlaky","Elapsed":0.05}
    {"Action":"output","Package":"example.com/m/a","Output":"FAIL\n"}
    {"Action":"fail","Package":"example.com/m/a","Elapsed":0.1}
    {"Action":"run","Package":"example.com/m/b","Test":"TestStable"}
    {"Action":"pass","Package":"example.com/m/b","Test":"TestStable","Elapsed":0.02}
    {"Action":"pass","Package":"example.com/m/b","Elapsed":0.02}
"#};

/// Output of a rerun in which the selected test passes.
pub(crate) fn passing_rerun(selection: &RerunSelection, test: &str) -> String {
    format!(
        "{{\"Action\":\"run\",\"Package\":\"{pkg}\",\"Test\":\"{test}\"}}\n\
         {{\"Action\":\"pass\",\"Package\":\"{pkg}\",\"Test\":\"{test}\",\"Elapsed\":0.01}}\n\
         {{\"Action\":\"pass\",\"Package\":\"{pkg}\",\"Elapsed\":0.02}}\n",
        pkg = selection.package,
    )
}

/// Output of a rerun in which the selected test fails again.
pub(crate) fn failing_rerun(selection: &RerunSelection, test: &str) -> String {
    format!(
        "{{\"Action\":\"run\",\"Package\":\"{pkg}\",\"Test\":\"{test}\"}}\n\
         {{\"Action\":\"fail\",\"Package\":\"{pkg}\",\"Test\":\"{test}\",\"Elapsed\":0.01}}\n\
         {{\"Action\":\"fail\",\"Package\":\"{pkg}\",\"Elapsed\":0.02}}\n",
        pkg = selection.package,
    )
}

/// A process that has already exited with `code` after writing `stdout`.
pub(crate) fn finished_process(stdout: String, code: i32) -> TestProcess {
    TestProcess::new(
        std::io::Cursor::new(stdout.into_bytes()),
        &b""[..],
        futures::future::ready(Ok(ProcessExit::from_code(code))).boxed(),
    )
}
