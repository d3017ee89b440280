// Copyright (c) The sumtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Launching `go test -json`.

use crate::{
    errors::LaunchError,
    rerun::{ProcessExit, RerunSelection, TestLauncher, TestProcess},
};
use camino::Utf8PathBuf;
use std::{io, process::Stdio};
use tracing::debug;

/// A `go test -json` command line.
///
/// The same command is used for the initial run and for reruns. Reruns replace the package list
/// with the package being rerun, and add a `-run` flag selecting the failed test.
#[derive(Clone, Debug)]
pub struct GoTestCommand {
    program: Vec<String>,
    args: Vec<String>,
    packages: Vec<String>,
    dir: Option<Utf8PathBuf>,
}

impl Default for GoTestCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl GoTestCommand {
    /// Creates a command that runs `go test -json`.
    pub fn new() -> Self {
        Self::raw(["go", "test", "-json"])
    }

    /// Creates a command that runs `program` verbatim. The program must write `go test -json`
    /// output to standard output.
    pub fn raw(program: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into_iter().map(Into::into).collect(),
            args: Vec::new(),
            packages: Vec::new(),
            dir: None,
        }
    }

    /// Sets extra flags passed to `go test`.
    pub fn set_args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the packages tested by the initial run.
    pub fn set_packages(
        &mut self,
        packages: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the directory the command runs in.
    pub fn set_dir(&mut self, dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.dir = Some(dir.into());
        self
    }

    /// Returns the full command line, for the initial run if `selection` is None.
    pub fn command_line(&self, selection: Option<&RerunSelection>) -> Vec<String> {
        let mut argv = self.program.clone();
        argv.extend(self.args.iter().cloned());
        match selection {
            Some(selection) => {
                if let Some(run) = &selection.run {
                    argv.push(format!("-run={run}"));
                }
                argv.push(selection.package.clone());
            }
            None => argv.extend(self.packages.iter().cloned()),
        }
        argv
    }

    /// Starts the command.
    pub fn spawn(&self, selection: Option<&RerunSelection>) -> Result<TestProcess, LaunchError> {
        let argv = self.command_line(selection);
        let Some((program, args)) = argv.split_first() else {
            return Err(LaunchError::new(
                argv,
                io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            ));
        };

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        debug!(command = %shell_words::join(&argv), "spawning go test");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => return Err(LaunchError::new(argv, error)),
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(LaunchError::new(
                argv,
                io::Error::other("standard output and standard error were not captured"),
            ));
        };
        let exit = Box::pin(async move { child.wait().await.map(ProcessExit::from) });

        Ok(TestProcess::new(stdout, stderr, exit))
    }
}

impl TestLauncher for GoTestCommand {
    fn launch(&mut self, selection: &RerunSelection) -> Result<TestProcess, LaunchError> {
        self.spawn(Some(selection))
    }
}
