//! Subprocess execution with a wall-clock limit.
//!
//! Output pipes are drained on background threads so a chatty child cannot
//! block on a full pipe while we wait for it.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

use crate::errors::{Error, Result};

/// Fallback when the platform does not report ARG_MAX.
const DEFAULT_ARG_MAX: usize = 131_072;

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when killed by a signal or by the timeout
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error just truncates what we report
            let _ = pipe.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_output(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `command`, optionally feeding `stdin`, killing it after `timeout`.
///
/// Stdout and stderr are always captured.
pub fn run_with_timeout(
    command: &mut Command,
    timeout: Option<Duration>,
    stdin: Option<&str>,
) -> Result<ProcessOutput> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    if stdin.is_some() {
        command.stdin(Stdio::piped());
    } else {
        command.stdin(Stdio::null());
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout also reaps grandchildren
        command.process_group(0);
    }

    let mut child: Child = command
        .spawn()
        .map_err(|e| Error::process(describe(command), format!("failed to spawn: {}", e)))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        // Dropping the pipe at the end of the thread closes the child's stdin
        thread::spawn(move || {
            let _ = pipe.write_all(input.as_bytes());
        });
    }

    let status = match timeout {
        Some(limit) => child.wait_timeout(limit)?,
        None => Some(child.wait()?),
    };

    let Some(status) = status else {
        // Timeout expired - kill the process
        kill_tree(&mut child);
        let _ = child.wait(); // Reap the zombie process
        return Ok(ProcessOutput {
            exit_code: None,
            stdout: join_output(stdout),
            stderr: join_output(stderr),
            timed_out: true,
        });
    };

    Ok(ProcessOutput {
        exit_code: status.code(),
        stdout: join_output(stdout),
        stderr: join_output(stderr),
        timed_out: false,
    })
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: signalling our own child's process group.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
}

/// Maximum combined argument length accepted by `exec`.
pub fn arg_max() -> usize {
    // SAFETY: sysconf has no preconditions and only reads system limits.
    let value = unsafe { libc::sysconf(libc::_SC_ARG_MAX) };
    if value > 0 {
        value as usize
    } else {
        DEFAULT_ARG_MAX
    }
}

/// Length of the arguments joined by single spaces.
pub fn command_line_length<S: AsRef<str>>(args: &[S]) -> usize {
    let chars: usize = args.iter().map(|a| a.as_ref().len()).sum();
    chars + args.len().saturating_sub(1)
}
