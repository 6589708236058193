//! Acquisition of raw `pminfo` text.
//!
//! [`ReportSource`] is the seam between polling and the outside world. The
//! production implementation, [`SmcIpmiTool`], shells out to the vendor
//! binary; tests substitute canned text.

use std::io::{ErrorKind, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tracing::debug;
use wait_timeout::ChildExt;

use crate::config::{Login, ToolConfig};
use crate::error::AcquisitionError;

/// Produces the raw `pminfo` report for one target.
pub trait ReportSource: Send + Sync {
    /// Returns the report text, trimmed of surrounding whitespace.
    fn fetch(&self, target: &str, login: &Login) -> Result<String, AcquisitionError>;
}

/// Runs `[sudo] <command> <target> <user> <password> pminfo`.
#[derive(Debug, Clone)]
pub struct SmcIpmiTool {
    command: String,
    sudo: bool,
    timeout: Duration,
}

impl SmcIpmiTool {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            sudo: false,
            timeout,
        }
    }

    pub fn from_config(tool: &ToolConfig) -> Self {
        Self::new(tool.command.clone(), tool.timeout()).with_sudo(tool.sudo)
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn argv(&self, target: &str, login: &Login) -> Vec<String> {
        let mut argv = Vec::with_capacity(6);
        if self.sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.command.clone());
        argv.push(target.to_string());
        argv.push(login.user.clone());
        argv.push(login.password.clone());
        argv.push("pminfo".to_string());
        argv
    }
}

/// Renders an argv for logs with the password argument masked.
fn display_argv(argv: &[String], password: &str) -> String {
    argv.iter()
        .map(|arg| if arg == password { "****" } else { arg.as_str() })
        .collect::<Vec<_>>()
        .join(" ")
}

impl ReportSource for SmcIpmiTool {
    fn fetch(&self, target: &str, login: &Login) -> Result<String, AcquisitionError> {
        let argv = self.argv(target, login);
        let program = argv[0].clone();
        debug!(host = %target, command = %display_argv(&argv, &login.password), "Running pminfo");

        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches wrapper scripts'
        // children and anything they left in the background.
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AcquisitionError::NotInstalled { program });
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(AcquisitionError::PermissionBlocked { program });
            }
            Err(e) => {
                return Err(AcquisitionError::SpawnFailed {
                    program,
                    message: e.to_string(),
                });
            }
        };
        let deadline = started + self.timeout;
        let timed_out = |program: String| AcquisitionError::Timeout {
            program,
            timeout_ms: self.timeout.as_millis() as u64,
        };

        // Drain both pipes in the background so a chatty tool cannot block
        // on a full pipe buffer before it exits.
        let (tx, rx) = mpsc::channel();
        let mut captured = Captured::default();
        match child.stdout.take() {
            Some(pipe) => drain(pipe, Stream::Stdout, tx.clone()),
            None => captured.stdout = Some(Ok(Vec::new())),
        }
        match child.stderr.take() {
            Some(pipe) => drain(pipe, Stream::Stderr, tx),
            None => captured.stderr = Some(Ok(Vec::new())),
        }

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!(host = %target, timeout_ms = self.timeout.as_millis() as u64, "pminfo timed out, killing process group");
                terminate(&mut child);
                return Err(timed_out(program));
            }
            Err(e) => {
                terminate(&mut child);
                return Err(AcquisitionError::ReadFailed {
                    program,
                    message: format!("wait failed: {e}"),
                });
            }
        };

        captured.receive_until(&rx, deadline);
        if !captured.complete() {
            // The tool exited but something it started still holds the pipes.
            debug!(host = %target, "pminfo left processes holding its output, killing process group");
            signal_group(&child, Signal::Kill);
            captured.receive_until(&rx, Instant::now() + KILL_GRACE);
        }

        let stdout = match captured.stdout {
            Some(Ok(buf)) => buf,
            Some(Err(e)) => {
                return Err(AcquisitionError::ReadFailed {
                    program,
                    message: format!("stdout read failed: {e}"),
                });
            }
            None => return Err(timed_out(program)),
        };
        let stderr = captured.stderr.and_then(Result::ok).unwrap_or_default();

        if !status.success() {
            return Err(AcquisitionError::NonZeroExit {
                program,
                status: status.to_string(),
                stderr: output_preview(&String::from_utf8_lossy(&stderr)),
            });
        }

        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        debug!(host = %target, bytes = text.len(), "pminfo completed");
        Ok(text)
    }
}

/// How long a signalled process group gets to exit and release its pipes.
const KILL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Drained = (Stream, std::io::Result<Vec<u8>>);

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<Drained>) {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send((stream, result));
    });
}

#[derive(Default)]
struct Captured {
    stdout: Option<std::io::Result<Vec<u8>>>,
    stderr: Option<std::io::Result<Vec<u8>>>,
}

impl Captured {
    fn complete(&self) -> bool {
        self.stdout.is_some() && self.stderr.is_some()
    }

    /// Collects pipe contents until both have reached EOF or `deadline` passes.
    fn receive_until(&mut self, rx: &Receiver<Drained>, deadline: Instant) {
        while !self.complete() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, result)) => self.stdout = Some(result),
                Ok((Stream::Stderr, result)) => self.stderr = Some(result),
                Err(_) => break,
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Stops the whole process group: SIGTERM first so `sudo` can relay it,
/// then SIGKILL for whatever is left.
fn terminate(child: &mut Child) {
    signal_group(child, Signal::Term);
    let exited = matches!(child.wait_timeout(KILL_GRACE), Ok(Some(_)));
    signal_group(child, Signal::Kill);
    if !exited {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: Signal) {
    let signal = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group
    // created by `process_group(0)`, whose id equals the leader's pid.
    // Failures (ESRCH for an empty group, EPERM for root-owned members under
    // sudo) leave nothing further to do.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _signal: Signal) {}

/// First non-empty line of `text`, truncated to 160 characters.
pub(crate) fn output_preview(text: &str) -> Option<String> {
    const MAX_PREVIEW_LEN: usize = 160;

    let first_non_empty = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if first_non_empty.is_empty() {
        return None;
    }
    if first_non_empty.chars().count() <= MAX_PREVIEW_LEN {
        return Some(first_non_empty.to_string());
    }
    let truncated = first_non_empty
        .chars()
        .take(MAX_PREVIEW_LEN)
        .collect::<String>();
    Some(format!("{truncated}..."))
}
