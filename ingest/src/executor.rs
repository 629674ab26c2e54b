//! External command execution.
//!
//! Every external tool (quality gate, metadata extractor, regenerator,
//! version control, mail transfer agent) is run through [`CommandExecutor`]
//! with an explicit argument vector. Nothing goes through a shell, so module
//! names and identities never need quoting.

use crate::error::{IngestError, Result};
use camino::Utf8Path;
use log::{debug, warn};
use std::io::{self, Write};
use std::process::{ChildStdin, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// A single command invocation.
#[derive(Debug, Clone, Copy)]
pub struct CommandRequest<'a> {
    /// Program to run.
    pub program: &'a str,
    /// Arguments, passed verbatim.
    pub args: &'a [&'a str],
    /// Working directory, or the current directory when `None`.
    pub working_dir: Option<&'a Utf8Path>,
    /// Bytes fed to the child's stdin while it runs.
    pub stdin: Option<&'a [u8]>,
}

impl<'a> CommandRequest<'a> {
    /// Creates a request with no working directory and no stdin.
    #[must_use]
    pub const fn new(program: &'a str, args: &'a [&'a str]) -> Self {
        Self {
            program,
            args,
            working_dir: None,
            stdin: None,
        }
    }

    /// Runs the command inside `dir`.
    #[must_use]
    pub const fn in_dir(mut self, dir: &'a Utf8Path) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Feeds `input` to the command's stdin.
    #[must_use]
    pub const fn with_stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command and returns its captured output.
    ///
    /// A non-zero exit status is *not* an error at this level; callers
    /// inspect [`Output::status`] themselves.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Tool`] when the program cannot be started and
    /// [`IngestError::ToolTimedOut`] when it exceeds the time limit.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use modarchive_ingest::executor::{CommandExecutor, CommandRequest, SystemCommandExecutor};
    /// use std::time::Duration;
    ///
    /// let executor = SystemCommandExecutor::new(Duration::from_secs(10));
    /// let output = executor.run(&CommandRequest::new("git", &["--version"]))?;
    /// assert!(output.status.success());
    /// # Ok::<(), modarchive_ingest::error::IngestError>(())
    /// ```
    fn run(&self, request: &CommandRequest<'_>) -> Result<Output>;
}

/// Executes commands on the host system, killing any that outlive the
/// configured timeout.
#[derive(Debug, Clone, Copy)]
pub struct SystemCommandExecutor {
    timeout: Duration,
}

impl SystemCommandExecutor {
    /// Creates an executor with the given per-command timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, request: &CommandRequest<'_>) -> Result<Output> {
        debug!(
            "running {} {:?} in {:?}",
            request.program, request.args, request.working_dir
        );

        let mut cmd = Command::new(request.program);
        cmd.args(request.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = request.working_dir {
            cmd.current_dir(dir.as_std_path());
        }

        let mut child = cmd.spawn().map_err(|e| IngestError::Tool {
            tool: request.program.to_owned(),
            message: e.to_string(),
        })?;

        // Drain the pipes and feed stdin on helper threads so neither side can
        // block on a full pipe while we wait for the child to exit.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);
        let stdin_writer = request
            .stdin
            .zip(child.stdin.take())
            .map(|(input, pipe)| spawn_writer(pipe, input.to_vec()));

        let waited = match child.wait_timeout(self.timeout) {
            Ok(waited) => waited,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        match waited {
            Some(status) => {
                if let Some(Err(e)) = stdin_writer.map(join_writer) {
                    warn!("{} did not accept its input: {e}", request.program);
                    return Err(IngestError::Tool {
                        tool: request.program.to_owned(),
                        message: format!("writing stdin failed: {e}"),
                    });
                }
                Ok(Output {
                    status,
                    stdout: join_reader(stdout_reader),
                    stderr: join_reader(stderr_reader),
                })
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    "{} timed out after {} seconds",
                    request.program,
                    self.timeout.as_secs()
                );
                Err(IngestError::ToolTimedOut {
                    tool: request.program.to_owned(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

fn spawn_reader<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn spawn_writer(mut pipe: ChildStdin, input: Vec<u8>) -> JoinHandle<io::Result<()>> {
    // The pipe closes when the closure returns.
    std::thread::spawn(move || pipe.write_all(&input))
}

fn join_writer(writer: JoinHandle<io::Result<()>>) -> io::Result<()> {
    writer
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")))
}

fn join_reader(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Returns the trimmed stderr of a failed command, falling back to stdout and
/// then to the exit status so the message is never empty.
#[must_use]
pub fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_owned();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_owned();
    }
    output.status.to_string()
}

/// Splits captured output into lines, dropping a trailing empty line.
#[must_use]
pub fn output_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::{exit_status, failure_output};

    #[test]
    fn captures_stdout_and_status() {
        let executor = SystemCommandExecutor::new(Duration::from_secs(10));
        let output = executor
            .run(&CommandRequest::new("sh", &["-c", "echo one; echo two; exit 3"]))
            .expect("sh runs");
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output_lines(&output.stdout), vec!["one", "two"]);
    }

    #[test]
    fn feeds_stdin() {
        let executor = SystemCommandExecutor::new(Duration::from_secs(10));
        let output = executor
            .run(&CommandRequest::new("cat", &[]).with_stdin(b"hello"))
            .expect("cat runs");
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn large_stdin_does_not_block_on_unread_stdout() {
        let input = vec![b'x'; 256 * 1024];
        let executor = SystemCommandExecutor::new(Duration::from_secs(10));
        let output = executor
            .run(
                &CommandRequest::new("sh", &["-c", "head -c 262144 /dev/zero; cat >/dev/null"])
                    .with_stdin(&input),
            )
            .expect("sh runs");
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 256 * 1024);
    }

    #[test]
    fn timeout_applies_while_stdin_is_unread() {
        let input = vec![b'x'; 256 * 1024];
        let executor = SystemCommandExecutor::new(Duration::from_millis(200));
        let result = executor.run(&CommandRequest::new("sleep", &["5"]).with_stdin(&input));
        assert!(matches!(result, Err(IngestError::ToolTimedOut { .. })));
    }

    #[test]
    fn runs_in_working_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");
        std::fs::write(path.join("marker"), b"").expect("write marker");
        let executor = SystemCommandExecutor::new(Duration::from_secs(10));
        let output = executor
            .run(&CommandRequest::new("ls", &[]).in_dir(&path))
            .expect("ls runs");
        assert_eq!(output_lines(&output.stdout), vec!["marker"]);
    }

    #[test]
    fn kills_commands_that_overrun() {
        let executor = SystemCommandExecutor::new(Duration::from_millis(100));
        let result = executor.run(&CommandRequest::new("sleep", &["5"]));
        assert!(matches!(result, Err(IngestError::ToolTimedOut { .. })));
    }

    #[test]
    fn missing_program_is_a_tool_error() {
        let executor = SystemCommandExecutor::new(Duration::from_secs(1));
        let result = executor.run(&CommandRequest::new("modarchive-no-such-tool", &[]));
        assert!(matches!(result, Err(IngestError::Tool { .. })));
    }

    #[test]
    fn failure_message_prefers_stderr() {
        assert_eq!(failure_message(&failure_output("  bad things \n")), "bad things");
        let silent = Output {
            status: exit_status(2),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(failure_message(&silent).contains('2'));
    }
}
