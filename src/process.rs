//! Centralized command execution with consistent error handling.
//!
//! Every external collaborator (dnf, curl, rpm2cpio/cpio, ldd) is run
//! through [`Cmd`], which captures stderr for error messages and can put a
//! deadline on the child process.

use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::debug;
use wait_timeout::ChildExt;

use crate::error::{Error, Result};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the command.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// Returns true if the command exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Get the exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
    /// Custom error message prefix.
    error_prefix: Option<String>,
    timeout: Option<Duration>,
    /// Run in a new process group and kill the whole group on timeout.
    own_group: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
            error_prefix: None,
            timeout: None,
            own_group: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Kill the child and fail with [`Error::Timeout`] if it runs longer than `limit`.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Put the child in its own process group so a timeout also kills
    /// everything it spawned (e.g. both sides of an `sh -c` pipeline).
    pub fn own_process_group(mut self) -> Self {
        self.own_group = true;
        self
    }

    /// Run the command and capture output.
    pub fn run(self) -> Result<CommandResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        if self.own_group {
            cmd.process_group(0);
        }

        debug!(program = %self.program, args = ?self.args, "running");

        let mut child = cmd.spawn().map_err(|e| {
            Error::io(
                format!("Failed to execute '{}'. Is it installed?", self.program),
                e,
            )
        })?;

        // Drain both pipes on their own threads so a chatty child can't
        // block on a full pipe while we wait for it.
        let stdout_reader = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                buf
            })
        });

        let status = match self.timeout {
            Some(limit) => match child
                .wait_timeout(limit)
                .map_err(|e| Error::io(format!("waiting for '{}'", self.program), e))?
            {
                Some(status) => status,
                None => {
                    if self.own_group {
                        // the group id is the child's pid (process_group(0))
                        let pgid = child.id() as libc::pid_t;
                        unsafe {
                            libc::kill(-pgid, libc::SIGKILL);
                        }
                    } else {
                        let _ = child.kill();
                    }
                    let _ = child.wait();
                    return Err(Error::Timeout {
                        program: self.program,
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child
                .wait()
                .map_err(|e| Error::io(format!("waiting for '{}'", self.program), e))?,
        };

        let collect = |reader: Option<thread::JoinHandle<Vec<u8>>>| -> String {
            reader
                .and_then(|h| h.join().ok())
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default()
        };

        let result = CommandResult {
            status,
            stdout: collect(stdout_reader),
            stderr: collect(stderr_reader),
        };

        if !self.allow_fail && !result.success() {
            let head = match self.error_prefix {
                Some(prefix) => format!("{} (exit code {})", prefix, result.code()),
                None => format!("exit code {}", result.code()),
            };

            let stderr = result.stderr_trimmed();
            let message = if stderr.is_empty() {
                head
            } else {
                format!("{}:\n{}", head, stderr)
            };
            return Err(Error::Tool {
                program: self.program,
                message,
            });
        }

        Ok(result)
    }
}

// =============================================================================
// Convenience functions
// =============================================================================

/// Run a shell command in a specific directory, with an optional deadline.
pub fn shell_in(command: &str, dir: &Path, timeout: Option<Duration>) -> Result<CommandResult> {
    let cmd = Cmd::new("sh").args(["-c", command]).dir(dir);
    match timeout {
        Some(t) => cmd.own_process_group().timeout(t).run(),
        None => cmd.run(),
    }
}

/// Quote a string for safe interpolation into an `sh -c` command.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// =============================================================================
// Tests
// =============================================================================
