// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a shell script standing in for `go test -json`.

use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sumtest_runner::{
    launch::GoTestCommand,
    rerun::{RerunOpts, RerunReport, Rerunner, classify_initial_run},
    testjson::{Execution, NoopHandler, ScanConfig, scan_into},
};

// Fails TestFlaky on the first invocation and passes it afterwards.
const FAKE_GO: &str = indoc! {r#"
    dir=$(dirname "$0")
    echo "$*" >> "$dir/args.log"
    if [ -e "$dir/ran-once" ]; then
        echo '{"Action":"run","Package":"example.com/m/a","Test":"TestFlaky"}'
        echo '{"Action":"pass","Package":"example.com/m/a","Test":"TestFlaky","Elapsed":0.01}'
        echo '{"Action":"pass","Package":"example.com/m/a","Elapsed":0.01}'
        exit 0
    fi
    touch "$dir/ran-once"
    echo '{"Action":"run","Package":"example.com/m/a","Test":"TestFlaky"}'
    echo '{"Action":"fail","Package":"example.com/m/a","Test":"TestFlaky","Elapsed":0.01}'
    echo '{"Action":"fail","Package":"example.com/m/a","Elapsed":0.01}'
    echo 'go: downloading example.com/dep v1.0.0' >&2
    exit 1
"#};

#[tokio::test]
async fn reruns_spawned_processes() {
    let dir = Utf8TempDir::new().expect("created temp dir");
    let script = dir.path().join("fake-go.sh");
    std::fs::write(&script, FAKE_GO).expect("wrote script");

    let mut command = GoTestCommand::raw(["sh", script.as_str()]);
    command
        .set_args(["-count=1"])
        .set_packages(["./..."])
        .set_dir(dir.path());

    let mut execution = Execution::new();
    let process = command.spawn(None).expect("sh is available");
    scan_into(
        &ScanConfig::new(),
        &mut execution,
        process.stdout.0,
        process.stderr.0,
        &mut NoopHandler,
    )
    .await
    .expect("initial run scanned");
    let exit = process.exit.0.await.expect("waited for sh");
    assert!(!exit.is_success());
    assert!(execution.errors().is_empty(), "{:?}", execution.errors());
    classify_initial_run(&execution, exit).expect("initial run is rerunnable");

    Rerunner::new(RerunOpts {
        max_attempts: 2,
        max_initial_failures: 0,
        root_cases_only: false,
    })
    .run(&mut execution, &mut NoopHandler, &mut command)
    .await
    .expect("flaky test passed on rerun");

    let args = std::fs::read_to_string(dir.path().join("args.log")).expect("args were logged");
    assert_eq!(
        args,
        "-count=1 ./...\n-count=1 -run=^TestFlaky$ example.com/m/a\n"
    );
    assert_eq!(
        RerunReport::from_execution(&execution).to_text(),
        "example.com/m/a.TestFlaky: 2 runs, 1 failure\n"
    );
}
