//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gtags_nav::error::Result;
use gtags_nav::{CommandOutput, CommandRunner, ExitKind, RunOptions};

/// One command seen by [`FakeRunner`].
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub cwd: Option<PathBuf>,
}

/// Records every command and answers from canned responses.
///
/// A response is chosen by the longest registered prefix of the command line.
/// Unknown commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Call>>,
    responses: Vec<(String, CommandOutput)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner reporting `version` from `global --version`.
    pub fn with_version(version: &str) -> Self {
        Self::new().respond(
            "global --version",
            &format!(
                "global - GNU GLOBAL {}\nCopyright (c) 1996-2021 Tama Communications Corporation\n",
                version
            ),
        )
    }

    pub fn respond(self, prefix: &str, stdout: &str) -> Self {
        self.respond_with(prefix, stdout, "", 0)
    }

    pub fn fail(self, prefix: &str, stderr: &str, code: i32) -> Self {
        self.respond_with(prefix, "", stderr, code)
    }

    pub fn respond_with(mut self, prefix: &str, stdout: &str, stderr: &str, code: i32) -> Self {
        self.responses.push((
            prefix.to_string(),
            CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
                exit: ExitKind::Code(code),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Number of invocations whose program is `program`.
    pub fn count(&self, program: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .count()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(Call {
            command: command.to_string(),
            cwd: options.cwd.clone(),
        });

        let output = self
            .responses
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit: ExitKind::Code(0),
            });
        Ok(output)
    }
}

/// Copy the C fixture project into `dest`.
pub fn copy_fixture(dest: &Path) {
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("main");
    for entry in fs::read_dir(&fixture).expect("fixture directory") {
        let entry = entry.expect("fixture entry");
        fs::copy(entry.path(), dest.join(entry.file_name())).expect("copy fixture file");
    }
}

/// Whether both GNU GLOBAL binaries are on PATH.
pub fn gnu_global_installed() -> bool {
    gtags_nav::process::tool_available("global") && gtags_nav::process::tool_available("gtags")
}
