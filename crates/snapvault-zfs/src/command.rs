//! Execution wrapper for invoking `zfs`/`zpool`.
//!
//! Keeps process handling isolated so the runner stays testable with fake
//! binaries and deterministic stdout parsing.

use snapvault_core::error::{SnapvaultError, SnapvaultResult};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

#[derive(Debug)]
pub(crate) struct Output {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) status: i32,
}

impl Output {
    /// Stdout split into trimmed, non-empty lines.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Fail with the logical `argv` when the process exited nonzero.
    pub(crate) fn check(self, argv: &[String]) -> SnapvaultResult<Self> {
        if self.status == 0 {
            return Ok(self);
        }
        Err(SnapvaultError::CommandExecutionFailed {
            argv: argv.to_vec(),
            status: self.status,
            stderr: self.stderr,
        })
    }
}

/// Run `binary args..` to completion, capturing both output streams.
pub(crate) fn execute(binary: &Path, args: &[String]) -> SnapvaultResult<Output> {
    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_handle = spawn_output_reader(child.stdout.take());
    let stderr_handle = spawn_output_reader(child.stderr.take());
    let status = child.wait()?;

    Ok(Output {
        stdout: join_reader(stdout_handle, "stdout")?,
        stderr: join_reader(stderr_handle, "stderr")?,
        status: status.code().unwrap_or(-1),
    })
}

pub(crate) fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<SnapvaultResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> SnapvaultResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}

pub(crate) fn join_reader(
    handle: thread::JoinHandle<SnapvaultResult<String>>,
    stream: &str,
) -> SnapvaultResult<String> {
    handle
        .join()
        .map_err(|_| SnapvaultError::Provider(format!("{stream} reader thread panicked")))?
}
