//! Subprocess execution with a hard timeout.
//!
//! Both the `beans` backend and `git` history lookups run as child
//! processes. A wedged child must never wedge the caller, so every call polls
//! the child until it exits or the deadline passes, then kills it.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` timed out after {waited:?}")]
    Timeout { program: String, waited: Duration },

    #[error("I/O error talking to `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn kill_quietly(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program args...` in `cwd`, killing it if it outlives `timeout`.
pub fn run_with_timeout(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Drain pipes concurrently so a chatty child cannot block on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                kill_quietly(&mut child);
                return Err(ProcessError::Io {
                    program: program.to_string(),
                    source,
                });
            }
        }

        if start.elapsed() >= timeout {
            kill_quietly(&mut child);
            tracing::warn!(program, waited_ms = start.elapsed().as_millis(), "child process timed out");
            return Err(ProcessError::Timeout {
                program: program.to_string(),
                waited: start.elapsed(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    tracing::debug!(
        program,
        code = status.code(),
        elapsed_ms = start.elapsed().as_millis(),
        "child process finished"
    );

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}
