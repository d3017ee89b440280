// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sumtest_metadata::{RerunReportSummary, RerunTestStatus};
use sumtest_runner::{
    errors::{LaunchError, RerunError},
    reporter::{FormatKind, ReporterBuilder, SummaryPrinter},
    rerun::{
        ProcessExit, RerunOpts, RerunReport, RerunReportFormat, RerunSelection, Rerunner,
        classify_initial_run,
    },
    testjson::{EventHandler, ScanConfig, scan},
};

fn rerun_opts(max_attempts: usize) -> RerunOpts {
    RerunOpts {
        max_attempts,
        max_initial_failures: 10,
        root_cases_only: false,
    }
}

fn strip_duration(summary: &str) -> &str {
    summary
        .rsplit_once(" in ")
        .map(|(head, _)| head)
        .expect("summary ends with a duration")
}

#[tokio::test]
async fn flaky_test_is_rerun_and_reported() {
    let mut reporter = ReporterBuilder::default()
        .set_format(FormatKind::TestName)
        .set_module_path(MODULE_PATH)
        .build(Vec::new());

    let mut execution = scan(
        &ScanConfig::new(),
        INITIAL_RUN.as_bytes(),
        &b""[..],
        &mut reporter,
    )
    .await
    .expect("initial run scanned");
    classify_initial_run(&execution, ProcessExit::from_code(1)).expect("initial run is rerunnable");

    let mut launches = Vec::new();
    let mut launcher = |selection: &RerunSelection| {
        launches.push(selection.to_string());
        Ok::<_, LaunchError>(finished_process(passing_rerun(selection, "TestFlaky"), 0))
    };
    Rerunner::new(rerun_opts(2))
        .run(&mut execution, &mut reporter, &mut launcher)
        .await
        .expect("flaky test passed on rerun");
    reporter.finish().expect("reporter finished");

    assert_eq!(launches, ["example.com/m/a -run=^TestFlaky$"]);
    assert_eq!(execution.runs(), 2);

    let progress = String::from_utf8(reporter.into_writer()).expect("progress is UTF-8");
    assert_eq!(
        progress,
        indoc! {"
            PASS a.TestOk (0.010s)
                flaky_test.go:12: try again
            FAIL a.TestFlaky (0.050s)
            FAIL a (0.100s)
            PASS b.TestStable (0.020s)
            PASS b (0.020s)
            PASS a.TestFlaky (0.010s)
            PASS a (0.020s)
        "}
    );

    let mut summary = Vec::new();
    SummaryPrinter::new()
        .set_module_path(MODULE_PATH)
        .write(&execution, &mut summary)
        .expect("summary written");
    let summary = String::from_utf8(summary).expect("summary is UTF-8");
    assert_eq!(
        strip_duration(&summary),
        indoc! {"

            === Failed
            === FAIL: a TestFlaky (0.050s)
                flaky_test.go:12: try again

            DONE 2 runs, 4 tests, 1 failure"}
    );

    let report = RerunReport::from_execution(&execution);
    assert_eq!(
        report.to_text(),
        "example.com/m/a.TestFlaky: 2 runs, 1 failure\n"
    );
}

#[tokio::test]
async fn persistent_failure_writes_failing_report() {
    let mut execution = scan(
        &ScanConfig::new(),
        INITIAL_RUN.as_bytes(),
        &b""[..],
        &mut sumtest_runner::testjson::NoopHandler,
    )
    .await
    .expect("initial run scanned");

    let mut launcher = |selection: &RerunSelection| {
        Ok::<_, LaunchError>(finished_process(failing_rerun(selection, "TestFlaky"), 1))
    };
    let error = Rerunner::new(rerun_opts(3))
        .run(
            &mut execution,
            &mut sumtest_runner::testjson::NoopHandler,
            &mut launcher,
        )
        .await
        .expect_err("test keeps failing");
    assert!(
        matches!(error, RerunError::TestsFailed { exit } if exit == ProcessExit::from_code(1)),
        "{error:?}"
    );
    assert_eq!(execution.runs(), 4);

    let dir = Utf8TempDir::new().expect("created temp dir");
    let path = dir.path().join("reports/rerun.json");
    RerunReport::from_execution(&execution)
        .write_to_path(&path, RerunReportFormat::Json)
        .expect("report written");

    let json = std::fs::read_to_string(&path).expect("report readable");
    let summary = RerunReportSummary::parse_json(&json).expect("report is valid JSON");
    assert_eq!(summary.failing_count(), 1);
    assert_eq!(summary.flaky_count(), 0);

    let test = &summary.tests[0];
    assert_eq!(test.qualified_name(), "example.com/m/a.TestFlaky");
    assert_eq!((test.runs, test.failures), (4, 4));
    assert_eq!(test.status, RerunTestStatus::Failing);
}

#[tokio::test]
async fn build_errors_refuse_rerun() {
    let execution = scan(
        &ScanConfig::new(),
        INITIAL_RUN.as_bytes(),
        "a/flaky_test.go:3:2: undefined: helper\n".as_bytes(),
        &mut sumtest_runner::testjson::NoopHandler,
    )
    .await
    .expect("initial run scanned");

    let error = classify_initial_run(&execution, ProcessExit::from_code(1))
        .expect_err("errors prevent reruns");
    assert!(
        matches!(&error, RerunError::PreviousRoundErrors { errors } if errors.len() == 1),
        "{error:?}"
    );
    assert!(error.is_abort());
}
