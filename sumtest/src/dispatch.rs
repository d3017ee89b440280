// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use std::io::Write;
use sumtest_metadata::SumtestExitCode;
use sumtest_runner::{
    config::{MaxFail, SumtestConfig},
    launch::GoTestCommand,
    reporter::{FormatKind, ReporterBuilder, SummarizeFlags, SummaryPrinter, SummarySection},
    rerun::{RerunOpts, RerunReport, RerunReportFormat, Rerunner, classify_initial_run},
    testjson::{EventHandler, Execution, JsonFileHandler, MaxFailHandler, ScanConfig, scan_into},
};
use tracing::debug;

/// Runs `go test -json` and prints progress, a summary and optionally reruns failed tests.
///
/// Arguments after `--` are passed to `go test`.
#[derive(Debug, Parser)]
#[command(version, name = "sumtest", max_term_width = 100)]
pub struct SumtestApp {
    #[clap(flatten)]
    output: OutputOpts,

    /// Config file [default: .config/sumtest.toml]
    #[arg(long, value_name = "PATH", env = "SUMTEST_CONFIG_FILE")]
    config_file: Option<Utf8PathBuf>,

    #[clap(flatten)]
    format_opts: FormatOpts,

    #[clap(flatten)]
    rerun_opts: RerunCliOpts,

    #[clap(flatten)]
    launch_opts: LaunchOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Output options")]
struct FormatOpts {
    /// Progress format [possible values: compact, pkgname, testname, standard-verbose,
    /// standard-quiet]
    #[arg(long, short = 'f', value_name = "FORMAT", env = "SUMTEST_FORMAT")]
    format: Option<FormatKind>,

    /// Prefix new lines of compact output with the elapsed time
    #[arg(long, env = "SUMTEST_WALL_CLOCK")]
    wall_clock: bool,

    /// Summary sections to hide [possible values: skipped, failed, errors, output]
    #[arg(
        long,
        value_name = "SECTIONS",
        value_delimiter = ',',
        env = "SUMTEST_HIDE_SUMMARY"
    )]
    hide_summary: Option<Vec<SummarySection>>,

    /// Write every event to this file
    #[arg(long, value_name = "PATH", env = "SUMTEST_JSONFILE")]
    jsonfile: Option<Utf8PathBuf>,

    /// Write standard error of go test to this file
    #[arg(long, value_name = "PATH", env = "SUMTEST_STDERR_FILE")]
    stderr_file: Option<Utf8PathBuf>,

    /// Go module path stripped from package names [default: read from go.mod]
    #[arg(long, value_name = "PATH", env = "SUMTEST_MODULE_PATH")]
    module_path: Option<String>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Rerun options")]
struct RerunCliOpts {
    /// Rerun failed tests up to N times [default when passed without a value: 2]
    #[arg(
        long,
        value_name = "N",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "2",
        env = "SUMTEST_RERUN_FAILS"
    )]
    rerun_fails: Option<usize>,

    /// Do not rerun if more than this many tests failed initially (0 = no limit)
    #[arg(long, value_name = "N", env = "SUMTEST_RERUN_FAILS_MAX_FAILURES")]
    rerun_fails_max_failures: Option<usize>,

    /// Rerun root tests instead of failed subtests
    #[arg(long, env = "SUMTEST_RERUN_FAILS_ROOT_CASES_ONLY")]
    rerun_fails_root_cases_only: bool,

    /// Write a report of flaky and failing tests to this file
    #[arg(long, value_name = "PATH", env = "SUMTEST_RERUN_FAILS_REPORT")]
    rerun_fails_report: Option<Utf8PathBuf>,

    /// Format of the rerun report [possible values: text, json]
    #[arg(long, value_name = "FORMAT", env = "SUMTEST_RERUN_FAILS_REPORT_FORMAT")]
    rerun_fails_report_format: Option<RerunReportFormat>,

    /// Stop the run after this many test failures, or "all"
    #[arg(long, value_name = "N", env = "SUMTEST_MAX_FAIL")]
    max_fail: Option<MaxFail>,
}

impl RerunCliOpts {
    fn apply(&self, mut opts: RerunOpts) -> RerunOpts {
        if let Some(max_attempts) = self.rerun_fails {
            opts.max_attempts = max_attempts;
        }
        if let Some(max_initial_failures) = self.rerun_fails_max_failures {
            opts.max_initial_failures = max_initial_failures;
        }
        if self.rerun_fails_root_cases_only {
            opts.root_cases_only = true;
        }
        opts
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Launch options")]
struct LaunchOpts {
    /// Space-separated packages to test
    #[arg(long, value_name = "PACKAGES", env = "SUMTEST_PACKAGES")]
    packages: Option<String>,

    /// Run the command after `--` as-is instead of `go test -json`
    #[arg(long, env = "SUMTEST_RAW_COMMAND")]
    raw_command: bool,

    /// Treat lines on standard output that aren't JSON as diagnostics
    #[arg(long, env = "SUMTEST_IGNORE_NON_JSON_OUTPUT_LINES")]
    ignore_non_json_output_lines: bool,

    /// Arguments passed to go test, or the command to run with --raw-command
    #[arg(last = true, value_name = "ARGS")]
    args: Vec<String>,
}

impl LaunchOpts {
    fn make_command(&self, cwd: &Utf8Path) -> Result<GoTestCommand> {
        let mut command = if self.raw_command {
            if self.args.is_empty() {
                return Err(ExpectedError::argument_conflict(
                    "--raw-command requires a command after `--`",
                ));
            }
            GoTestCommand::raw(self.args.iter().cloned())
        } else {
            let mut command = GoTestCommand::new();
            command.set_args(self.args.iter().cloned());
            command
        };

        if let Some(packages) = &self.packages {
            command.set_packages(packages.split_whitespace());
        }
        command.set_dir(cwd);
        Ok(command)
    }

    /// Reruns replace the package list with the package being rerun. Arguments after `--` are
    /// kept on every rerun, so they can't be allowed to name packages.
    fn check_rerun_args(&self) -> Result<()> {
        if !self.raw_command && self.packages.is_none() && !self.args.is_empty() {
            return Err(ExpectedError::argument_conflict(
                "when go test args are used with --rerun-fails, the packages to test must be \
                 specified with --packages",
            ));
        }
        Ok(())
    }
}

impl SumtestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let cwd = current_dir()?;
        let config = SumtestConfig::from_sources(&cwd, self.config_file.as_deref())?;

        let rerun_opts = self.rerun_opts.apply(config.rerun_opts());
        let max_fail = self.rerun_opts.max_fail.unwrap_or(config.max_fail());
        if rerun_opts.max_attempts > 0 && max_fail != MaxFail::All {
            return Err(ExpectedError::argument_conflict(
                "--max-fail may not be used with --rerun-fails",
            ));
        }
        if rerun_opts.max_attempts > 0 {
            self.launch_opts.check_rerun_args()?;
        }
        let mut command = self.launch_opts.make_command(&cwd)?;

        let format_opts = &self.format_opts;
        let module_path = format_opts
            .module_path
            .clone()
            .or_else(|| read_module_path(&cwd));

        let mut reporter_builder = ReporterBuilder::default();
        reporter_builder
            .set_format(format_opts.format.unwrap_or(config.format()))
            .set_wall_clock(format_opts.wall_clock || config.wall_clock())
            .set_colorize(output.colorize_stdout());
        if let Some(module_path) = &module_path {
            reporter_builder.set_module_path(module_path);
        }

        let jsonfile = resolve_path(&cwd, format_opts.jsonfile.as_deref(), config.jsonfile());
        let stderr_file =
            resolve_path(&cwd, format_opts.stderr_file.as_deref(), config.stderr_file());
        let handler = JsonFileHandler::create(
            reporter_builder.build(std::io::stdout()),
            jsonfile.as_deref(),
            stderr_file.as_deref(),
        )
        .map_err(|err| ExpectedError::OutputFileCreateError { err })?;
        let mut handler = MaxFailHandler::new(handler, max_fail);

        let mut scan_config = ScanConfig::new();
        scan_config.set_ignore_non_json_output_lines(
            self.launch_opts.ignore_non_json_output_lines || config.ignore_non_json_output_lines(),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeCreateError { err })?;

        let mut execution = Execution::new();
        let outcome = runtime.block_on(run_tests(
            &mut command,
            &scan_config,
            rerun_opts,
            &mut execution,
            &mut handler,
        ));
        handler
            .finish()
            .map_err(|err| ExpectedError::WriteOutputError { err })?;

        let mut summary = SummaryPrinter::new();
        summary.set_flags(match &format_opts.hide_summary {
            Some(hide) => SummarizeFlags::all().without(hide),
            None => config.summarize(),
        });
        if let Some(module_path) = &module_path {
            summary.set_module_path(module_path);
        }
        if output.colorize_stdout() {
            summary.colorize();
        }
        let mut stdout = std::io::stdout().lock();
        summary
            .write(&execution, &mut stdout)
            .and_then(|()| stdout.flush())
            .map_err(|err| ExpectedError::WriteSummaryError { err })?;

        if rerun_opts.max_attempts > 0 {
            let report_path = resolve_path(
                &cwd,
                self.rerun_opts.rerun_fails_report.as_deref(),
                config.rerun_report(),
            );
            if let Some(report_path) = report_path {
                let format = self
                    .rerun_opts
                    .rerun_fails_report_format
                    .unwrap_or(config.rerun_report_format());
                RerunReport::from_execution(&execution).write_to_path(&report_path, format)?;
                debug!("wrote rerun report to {report_path}");
            }
        }

        outcome.map(|()| SumtestExitCode::OK)
    }
}

/// Runs `go test` once, then reruns failures if enabled.
async fn run_tests(
    command: &mut GoTestCommand,
    scan_config: &ScanConfig,
    rerun_opts: RerunOpts,
    execution: &mut Execution,
    handler: &mut dyn EventHandler,
) -> Result<()> {
    let process = command.spawn(None)?;
    scan_into(
        scan_config,
        execution,
        process.stdout.0,
        process.stderr.0,
        handler,
    )
    .await
    .map_err(ExpectedError::from_scan)?;
    let exit = process
        .exit
        .0
        .await
        .map_err(|err| ExpectedError::WaitError { err })?;
    debug!(%exit, "go test finished");

    if exit.is_success() {
        return Ok(());
    }
    if rerun_opts.max_attempts == 0 || execution.failed_count() == 0 {
        return Err(ExpectedError::TestsFailed { exit });
    }

    classify_initial_run(execution, exit).map_err(ExpectedError::from_rerun)?;
    let mut rerunner = Rerunner::new(rerun_opts);
    rerunner.set_scan_config(scan_config.clone());
    rerunner
        .run(execution, handler, command)
        .await
        .map_err(ExpectedError::from_rerun)
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

/// A path passed on the command line takes precedence over one from the config.
fn resolve_path(
    cwd: &Utf8Path,
    cli: Option<&Utf8Path>,
    config: Option<Utf8PathBuf>,
) -> Option<Utf8PathBuf> {
    cli.map(|path| cwd.join(path)).or(config)
}

/// Reads the module path from `go.mod` in `dir`, if there is one.
fn read_module_path(dir: &Utf8Path) -> Option<String> {
    let go_mod = dir.join("go.mod");
    let contents = match std::fs::read_to_string(&go_mod) {
        Ok(contents) => contents,
        Err(error) => {
            debug!(%error, "not reading module path from {go_mod}");
            return None;
        }
    };
    contents.lines().find_map(|line| {
        let module = line.trim().strip_prefix("module")?;
        // `module` must be followed by whitespace.
        if !module.starts_with(char::is_whitespace) {
            return None;
        }
        let module = module.trim().trim_matches('"');
        (!module.is_empty()).then(|| module.to_owned())
    })
}
