//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour suites under `tests/`.

use crate::error::{InstallerError, Result};
use crate::exec::CommandExecutor;
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::process::{ExitStatus, Output};
use std::thread;
use std::time::Duration;

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

/// Creates a command `Output` with the given exit code and stdout.
#[must_use]
pub fn stdout_output(code: i32, stdout: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(code: i32, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "pip3").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd args...` and answer with `result`.
    #[must_use]
    pub fn new(cmd: &str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result,
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects. A
/// captured run writes the stub's stdout and stderr into the capture file.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Returns `true` once every expected invocation has been consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.expected.borrow().is_empty()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.is_finished(),
            "expected no further command invocations, {} remaining",
            self.expected.borrow().len()
        );
    }

    fn next_call(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(InstallerError::StubMismatch {
                message: format!("unexpected command invocation: {cmd} {}", args.join(" ")),
            });
        };
        if call.cmd != cmd || call.args != args {
            return Err(InstallerError::StubMismatch {
                message: format!(
                    "expected `{} {}`, got `{cmd} {}`",
                    call.cmd,
                    call.args.join(" "),
                    args.join(" ")
                ),
            });
        }
        call.result
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        self.next_call(cmd, args)
    }

    fn run_captured(&self, cmd: &str, args: &[&str], capture: &Utf8Path) -> Result<ExitStatus> {
        let output = self.next_call(cmd, args)?;
        let mut captured = output.stdout;
        captured.extend_from_slice(&output.stderr);
        fs::write(capture, captured)?;
        Ok(output.status)
    }
}

/// A member to place in a test archive.
#[derive(Debug, Clone, Copy)]
pub enum ArchiveEntry<'a> {
    /// A directory entry.
    Dir(&'a str),
    /// A regular file with contents.
    File(&'a str, &'a [u8]),
    /// A symbolic link pointing at a relative target.
    Symlink(&'a str, &'a str),
    /// A hard link to an earlier member, named by its archive path.
    HardLink(&'a str, &'a str),
}

/// Write a tar archive, gzip-compressed when `compressed` is set.
///
/// # Errors
///
/// Returns any I/O error raised while writing the archive.
pub fn write_tar(
    path: &Utf8Path,
    entries: &[ArchiveEntry<'_>],
    compressed: bool,
) -> io::Result<()> {
    let file = fs::File::create(path)?;
    if compressed {
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        append_entries(tar::Builder::new(encoder), entries)?.finish()?;
    } else {
        append_entries(tar::Builder::new(file), entries)?.flush()?;
    }
    Ok(())
}

fn append_entries<W: Write>(
    mut builder: tar::Builder<W>,
    entries: &[ArchiveEntry<'_>],
) -> io::Result<W> {
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        match *entry {
            ArchiveEntry::Dir(name) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder.append_data(&mut header, name, io::empty())?;
            }
            ArchiveEntry::File(name, contents) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(contents.len() as u64);
                builder.append_data(&mut header, name, contents)?;
            }
            ArchiveEntry::Symlink(name, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder.append_link(&mut header, name, target)?;
            }
            ArchiveEntry::HardLink(name, target) => {
                header.set_entry_type(tar::EntryType::Link);
                header.set_mode(0o644);
                header.set_size(0);
                builder.append_link(&mut header, name, target)?;
            }
        }
    }
    builder.into_inner()
}

/// Create a temporary directory and return it with its UTF-8 path.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or its path is
/// not valid UTF-8.
pub fn utf8_temp_dir() -> io::Result<(tempfile::TempDir, Utf8PathBuf)> {
    let temp = tempfile::tempdir()?;
    let path = Utf8PathBuf::try_from(temp.path().to_path_buf())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    Ok((temp, path))
}

/// A one-shot HTTP server bound to the loopback interface.
///
/// Answers the first request it receives with a fixed status and body,
/// optionally after a delay, then stops listening.
#[derive(Debug)]
pub struct OneShotServer {
    addr: SocketAddr,
}

impl OneShotServer {
    /// Serve `body` with `status` to the first caller.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if no loopback port can be bound.
    pub fn start(status: u16, body: Vec<u8>) -> io::Result<Self> {
        Self::start_delayed(status, body, Duration::ZERO)
    }

    /// Like [`OneShotServer::start`], but waits `delay` after reading the
    /// request before answering.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if no loopback port can be bound.
    pub fn start_delayed(status: u16, body: Vec<u8>, delay: Duration) -> io::Result<Self> {
        let declared_len = body.len();
        Self::serve(Reply {
            status,
            body,
            declared_len,
            delay,
            stall: Duration::ZERO,
        })
    }

    /// Answer with a `200` whose headers announce `declared_len` bytes, send
    /// `partial`, then hold the connection open for `stall`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if no loopback port can be bound.
    pub fn start_stalling(
        declared_len: usize,
        partial: Vec<u8>,
        stall: Duration,
    ) -> io::Result<Self> {
        Self::serve(Reply {
            status: 200,
            body: partial,
            declared_len,
            delay: Duration::ZERO,
            stall,
        })
    }

    fn serve(reply: Reply) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                if let Err(err) = respond(stream, &reply) {
                    log::debug!("test server failed to respond: {err}");
                }
            }
        });
        Ok(Self { addr })
    }

    /// URL of `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }
}

struct Reply {
    status: u16,
    body: Vec<u8>,
    declared_len: usize,
    delay: Duration,
    stall: Duration,
}

fn respond(stream: std::net::TcpStream, reply: &Reply) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    thread::sleep(reply.delay);
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {} Test\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status, reply.declared_len
    )?;
    stream.write_all(&reply.body)?;
    stream.flush()?;
    thread::sleep(reply.stall);
    Ok(())
}

/// Run `f` with the install root and data directory variables set.
///
/// Passing `None` unsets the variable for the duration of the call.
pub fn with_foglamp_env<R>(root: Option<&str>, data: Option<&str>, f: impl FnOnce() -> R) -> R {
    temp_env::with_vars(
        [
            (crate::config::ROOT_ENV, root),
            (crate::config::DATA_ENV, data),
        ],
        f,
    )
}
