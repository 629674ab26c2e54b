//! Shared test utilities for the ingest crate.

use crate::error::{IngestError, Result};
use crate::executor::{CommandExecutor, CommandRequest};
use camino::Utf8PathBuf;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    stdout_output(0, "")
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Creates an `Output` with the given exit code and stdout.
#[must_use]
pub fn stdout_output(code: i32, stdout: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to execute (e.g., "git").
    pub program: String,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Creates an expectation for `program` with `args`.
    pub fn new<I, S>(program: &str, args: I, result: Result<Output>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
            result,
        }
    }
}

/// A command invocation observed by [`StubExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Program that was requested.
    pub program: String,
    /// Arguments that were passed.
    pub args: Vec<String>,
    /// Working directory, if any.
    pub working_dir: Option<Utf8PathBuf>,
    /// Bytes fed to stdin, if any.
    pub stdin: Option<Vec<u8>>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Replays expected command invocations in order, returning predefined
/// results, and records every request so tests can inspect working
/// directories and stdin.
#[derive(Debug, Default)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    recorded: RefCell<Vec<RecordedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            recorded: RefCell::new(Vec::new()),
        }
    }

    /// Returns every invocation seen so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.recorded.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remain: {:?}",
            remaining.len(),
            remaining.iter().map(|c| &c.program).collect::<Vec<_>>()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, request: &CommandRequest<'_>) -> Result<Output> {
        let args: Vec<String> = request.args.iter().map(|a| (*a).to_owned()).collect();
        self.recorded.borrow_mut().push(RecordedCall {
            program: request.program.to_owned(),
            args: args.clone(),
            working_dir: request.working_dir.map(ToOwned::to_owned),
            stdin: request.stdin.map(<[u8]>::to_vec),
        });

        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(IngestError::StubMismatch {
                message: format!("unexpected invocation of {} {args:?}", request.program),
            });
        };

        if call.program != request.program || call.args != args {
            return Err(IngestError::StubMismatch {
                message: format!(
                    "expected {} {:?}, got {} {args:?}",
                    call.program, call.args, request.program
                ),
            });
        }

        call.result
    }
}

/// Container formats [`build_archive`] can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar.
    TarGz,
    /// Bzip2-compressed tar.
    TarBz2,
    /// Uncompressed tar.
    Tar,
    /// Zip.
    Zip,
}

/// Builds an in-memory archive holding `files` as `(path, contents)` pairs.
///
/// # Panics
///
/// Panics if the encoder fails, which only happens on allocation failure.
#[must_use]
pub fn build_archive(format: ArchiveFormat, files: &[(&str, &str)]) -> Vec<u8> {
    match format {
        ArchiveFormat::Tar => build_tar(Vec::new(), files),
        ArchiveFormat::TarGz => {
            let encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            build_tar(encoder, files)
                .finish()
                .expect("finish gzip stream")
        }
        ArchiveFormat::TarBz2 => {
            let encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            build_tar(encoder, files)
                .finish()
                .expect("finish bzip2 stream")
        }
        ArchiveFormat::Zip => {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(0o644);
            for (path, contents) in files {
                writer.start_file(*path, options).expect("start zip entry");
                std::io::Write::write_all(&mut writer, contents.as_bytes())
                    .expect("write zip entry");
            }
            writer.finish().expect("finish zip").into_inner()
        }
    }
}

fn build_tar<W: std::io::Write>(sink: W, files: &[(&str, &str)]) -> W {
    let mut builder = tar::Builder::new(sink);
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("append tar entry");
    }
    builder.into_inner().expect("finish tar")
}
