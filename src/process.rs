//! Subprocess plumbing for the GNU GLOBAL binaries.
//!
//! Command strings are split with POSIX shell-word rules (`shlex`), so any
//! argument that may contain spaces must be quoted by whoever builds the
//! string. [`crate::store::TagStore`] quotes everything it interpolates.
//!
//! The child environment is deliberately minimal: `PATH` from the caller,
//! `GTAGSROOT` and `GTAGSLIBPATH`.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{GtagsError, Result};
use crate::paths;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Do not log stderr when the command fails.
    pub silent: bool,
    /// Kill the child once this token is cancelled.
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(dir.into()),
            ..Default::default()
        }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    /// Terminated by a signal (no exit code).
    Signal,
    /// Killed because the caller cancelled it.
    Cancelled,
}

impl From<ExitStatus> for ExitKind {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitKind::Code(code),
            None => ExitKind::Signal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitKind,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit == ExitKind::Code(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Boolean outcome plus captured diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandStatus {
    pub success: bool,
    pub stderr: String,
}

/// Runs indexer commands. Implemented by [`SubprocessRunner`] and by test fakes.
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    ///
    /// A non-zero exit is reported in [`CommandOutput::exit`], not as an error.
    /// Only a failure to start the process is an `Err`.
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput>;

    fn stdout(&self, command: &str, options: &RunOptions) -> Result<Vec<u8>> {
        Ok(self.run(command, options)?.stdout)
    }

    fn status(&self, command: &str, options: &RunOptions) -> Result<CommandStatus> {
        let output = self.run(command, options)?;
        let success = output.success();
        let stderr = output.stderr_text();
        if !success && !options.silent {
            tracing::warn!("`{}` failed ({:?}): {}", command, output.exit, stderr.trim_end());
        }
        Ok(CommandStatus { success, stderr })
    }
}

/// Split a command string with shell-word semantics.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command)
        .ok_or_else(|| GtagsError::Parse(format!("Unbalanced quoting in command: {}", command)))?;
    if argv.is_empty() {
        return Err(GtagsError::Parse("Empty command".to_string()));
    }
    Ok(argv)
}

/// Quote a single argument for inclusion in a command string.
pub fn quote_arg(arg: &str) -> Result<String> {
    shlex::try_quote(arg)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| GtagsError::Parse(format!("Cannot quote argument {:?}: {}", arg, e)))
}

/// Whether `program` can be found on `PATH`.
pub fn tool_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Real process runner with the indexer environment baked in.
#[derive(Debug, Clone)]
pub struct SubprocessRunner {
    env: Vec<(String, OsString)>,
}

impl SubprocessRunner {
    /// Relative `root` resolves against the current directory, relative
    /// `extra_paths` against the root.
    pub fn new(root: &Path, extra_paths: &[PathBuf]) -> Result<Self> {
        let root = paths::absolutize(&root.to_string_lossy(), &std::env::current_dir()?)?;
        let mut env: Vec<(String, OsString)> = Vec::new();

        if let Some(path) = std::env::var_os("PATH") {
            env.push(("PATH".to_string(), path));
        }
        // Windows processes misbehave without it.
        if cfg!(windows) {
            if let Some(system_root) = std::env::var_os("SYSTEMROOT") {
                env.push(("SYSTEMROOT".to_string(), system_root));
            }
        }

        env.push((
            "GTAGSROOT".to_string(),
            OsString::from(paths::prepare_for_env(&root)),
        ));

        let lib_paths = extra_paths
            .iter()
            .map(|p| {
                let path = paths::absolutize(&p.to_string_lossy(), &root)?;
                Ok(paths::prepare_for_env(&path))
            })
            .collect::<Result<Vec<String>>>()?;
        let lib_path = std::env::join_paths(&lib_paths)
            .map_err(|e| GtagsError::InvalidPath(format!("Cannot build GTAGSLIBPATH: {}", e)))?;
        env.push(("GTAGSLIBPATH".to_string(), lib_path));

        Ok(Self { env })
    }

    /// The environment every child receives.
    pub fn environment(&self) -> &[(String, OsString)] {
        &self.env
    }

    fn spawn(&self, argv: &[String], options: &RunOptions) -> Result<Child> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GtagsError::Parse("Empty command".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }

        // Own process group, so cancelling reaches the child's children too.
        #[cfg(unix)]
        if options.cancel.is_some() {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command.spawn().map_err(|source| GtagsError::ToolInvocation {
            program: program.clone(),
            source,
        })
    }
}

impl CommandRunner for SubprocessRunner {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput> {
        let argv = split_command(command)?;
        tracing::debug!("Running {:?} (cwd: {:?})", argv, options.cwd);

        let mut child = self.spawn(&argv, options)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let exit = match &options.cancel {
            Some(token) => wait_cancellable(&mut child, token)?,
            None => ExitKind::from(child.wait()?),
        };

        // After a cancel, descendants that escaped the kill may still hold the
        // pipes open; leave the drain threads behind instead of joining them.
        let output = if exit == ExitKind::Cancelled {
            CommandOutput {
                stdout: Vec::new(),
                stderr: Vec::new(),
                exit,
            }
        } else {
            CommandOutput {
                stdout: collect(stdout),
                stderr: collect(stderr),
                exit,
            }
        };
        tracing::debug!(
            "{} exited with {:?} ({} bytes of output)",
            argv[0],
            output.exit,
            output.stdout.len()
        );
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn wait_cancellable(child: &mut Child, token: &CancellationToken) -> Result<ExitKind> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ExitKind::from(status));
        }
        if token.is_cancelled() {
            tracing::debug!("Cancelling child process {}", child.id());
            kill_tree(child);
            let _ = child.wait();
            return Ok(ExitKind::Cancelled);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    match libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; the child leads its own process group.
        Ok(pid) => unsafe {
            libc::kill(-pid, libc::SIGKILL);
        },
        Err(_) => {
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_respects_quotes() {
        assert_eq!(
            split_command("global -c 'my prefix'").unwrap(),
            vec!["global", "-c", "my prefix"]
        );
        assert_eq!(
            split_command(r#"gtags --single-update "/a dir/f.c""#).unwrap(),
            vec!["gtags", "--single-update", "/a dir/f.c"]
        );
        assert!(split_command("global 'unterminated").is_err());
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn test_quote_arg_round_trips_through_split() {
        let quoted = quote_arg("/tmp/with space/file.c").unwrap();
        let argv = split_command(&format!("gtags --single-update {}", quoted)).unwrap();
        assert_eq!(argv[2], "/tmp/with space/file.c");
        assert_eq!(quote_arg("").unwrap(), "''");
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_contract() {
        let runner = SubprocessRunner::new(
            Path::new("/project"),
            &[PathBuf::from("/usr/include"), PathBuf::from("/opt/lib")],
        )
        .unwrap();

        let env = runner.environment();
        let get = |key: &str| env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());

        assert_eq!(get("GTAGSROOT"), Some(OsString::from("/project")));
        let expected = std::env::join_paths(["/usr/include", "/opt/lib"]).unwrap();
        assert_eq!(get("GTAGSLIBPATH"), Some(expected));
        assert_eq!(get("PATH"), std::env::var_os("PATH"));
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_paths_are_absolute_in_environment() {
        let runner = SubprocessRunner::new(
            Path::new("."),
            &[PathBuf::from("vendor/lib"), PathBuf::from("/a/./b/../c")],
        )
        .unwrap();

        let env = runner.environment();
        let get = |key: &str| env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(get("GTAGSROOT"), Some(cwd.clone().into_os_string()));
        let expected = std::env::join_paths([cwd.join("vendor").join("lib"), PathBuf::from("/a/c")])
            .unwrap();
        assert_eq!(get("GTAGSLIBPATH"), Some(expected));
    }

    #[test]
    fn test_missing_binary_is_invocation_error() {
        let runner = SubprocessRunner::new(Path::new("/"), &[]).unwrap();
        let err = runner
            .run("gtags-nav-definitely-missing-binary --version", &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, GtagsError::ToolInvocation { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_exit_code() {
        let runner = SubprocessRunner::new(Path::new("/"), &[]).unwrap();
        let output = runner
            .run("sh -c 'echo out; echo err >&2; exit 3'", &RunOptions::default())
            .unwrap();
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr_text(), "err\n");
        assert_eq!(output.exit, ExitKind::Code(3));
        assert!(!output.success());

        let status = runner
            .status("sh -c 'exit 1'", &RunOptions::default().silent())
            .unwrap();
        assert!(!status.success);
    }

    #[cfg(unix)]
    #[test]
    fn test_child_sees_indexer_environment() {
        let runner = SubprocessRunner::new(Path::new("/some/root"), &[]).unwrap();
        let stdout = runner
            .stdout(r#"sh -c 'printf %s "$GTAGSROOT"'"#, &RunOptions::default())
            .unwrap();
        assert_eq!(stdout, b"/some/root");
    }

    #[cfg(unix)]
    #[test]
    fn test_working_directory_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = SubprocessRunner::new(dir.path(), &[]).unwrap();
        let stdout = runner.stdout("pwd", &RunOptions::in_dir(dir.path())).unwrap();
        let printed = String::from_utf8_lossy(&stdout).trim().to_string();
        assert!(paths::paths_equal(&printed, &dir.path().to_string_lossy()));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancellation_kills_child() {
        let runner = SubprocessRunner::new(Path::new("/"), &[]).unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let output = runner
            .run("sleep 10", &RunOptions::default().with_cancel(token))
            .unwrap();
        assert_eq!(output.exit, ExitKind::Cancelled);
        assert!(!output.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancellation_does_not_wait_for_grandchildren() {
        let runner = SubprocessRunner::new(Path::new("/"), &[]).unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let output = runner
            .run("sh -c 'sleep 3; true'", &RunOptions::default().with_cancel(token))
            .unwrap();
        assert_eq!(output.exit, ExitKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
