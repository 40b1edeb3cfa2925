//! Two-stage `source | destination` process chain used for send/receive.

use crate::command::{join_reader, spawn_output_reader};
use log::{debug, warn};
use snapvault_core::error::{SnapvaultError, SnapvaultResult};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

/// Running pipeline. The source's stdout feeds the destination's stdin.
pub struct ProcessPipeline {
    label: String,
    source: Child,
    destination: Child,
    source_stderr: JoinHandle<SnapvaultResult<String>>,
    destination_stdout: JoinHandle<SnapvaultResult<String>>,
    destination_stderr: JoinHandle<SnapvaultResult<String>>,
}

impl ProcessPipeline {
    /// Start both stages. If the destination cannot start, the source is killed.
    pub fn spawn(
        source_binary: &Path,
        source_args: &[String],
        destination_binary: &Path,
        destination_args: &[String],
    ) -> SnapvaultResult<Self> {
        let label = format!(
            "{} {} | {} {}",
            source_binary.display(),
            source_args.join(" "),
            destination_binary.display(),
            destination_args.join(" ")
        );
        debug!("spawning pipeline {label}");

        let mut source = Command::new(source_binary)
            .args(source_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let Some(stream) = source.stdout.take() else {
            let _ = source.kill();
            let _ = source.wait();
            return Err(SnapvaultError::Provider(format!(
                "no stdout captured for {}",
                source_binary.display()
            )));
        };
        let source_stderr = spawn_output_reader(source.stderr.take());

        let mut destination = match Command::new(destination_binary)
            .args(destination_args)
            .stdin(Stdio::from(stream))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                let _ = source.kill();
                let _ = source.wait();
                let _ = source_stderr.join();
                return Err(err.into());
            }
        };
        let destination_stdout = spawn_output_reader(destination.stdout.take());
        let destination_stderr = spawn_output_reader(destination.stderr.take());

        Ok(Self {
            label,
            source,
            destination,
            source_stderr,
            destination_stdout,
            destination_stderr,
        })
    }

    /// Block until the destination exits and return its exit code.
    ///
    /// The source is reaped on every path; its status is only logged.
    pub fn wait(mut self) -> SnapvaultResult<i32> {
        let received = self
            .destination
            .wait()
            .map_err(SnapvaultError::from)
            .and_then(|status| {
                let stdout = join_reader(self.destination_stdout, "stdout")?;
                let stderr = join_reader(self.destination_stderr, "stderr")?;
                Ok((status.code().unwrap_or(-1), stdout, stderr))
            });
        if received.is_err() {
            let _ = self.source.kill();
        }

        // An early-exiting receiver closes the pipe; the sender then dies of SIGPIPE.
        let sent = self.source.wait();
        let source_stderr = join_reader(self.source_stderr, "stderr");
        match (&sent, &source_stderr) {
            (Ok(status), Ok(stderr)) if !status.success() => warn!(
                "sending stage of `{}` exited with {}: {}",
                self.label,
                status
                    .code()
                    .map(|code| format!("code {code}"))
                    .unwrap_or_else(|| "a signal".to_string()),
                stderr.trim()
            ),
            (Err(err), _) => warn!("unable to reap sending stage of `{}`: {err}", self.label),
            _ => {}
        }

        let (code, stdout, stderr) = received?;
        if !stdout.trim().is_empty() {
            debug!("{}: {}", self.label, stdout.trim());
        }
        if code != 0 {
            warn!(
                "receiving stage of `{}` exited with code {code}: {}",
                self.label,
                stderr.trim()
            );
        }
        sent?;
        source_stderr?;
        Ok(code)
    }
}
