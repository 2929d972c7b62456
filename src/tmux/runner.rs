use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam between kata and the external tmux/tmuxp/ps binaries
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run to completion with captured output. A `timeout` that expires
    /// yields an `io::ErrorKind::TimedOut` error.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> io::Result<CommandOutput>;

    /// Run with the terminal handed over to the child. Blocks until it exits.
    async fn run_interactive(&self, program: &str, args: &[&str]) -> io::Result<bool>;
}

/// Runs real subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Option<Duration>,
    ) -> io::Result<CommandOutput> {
        tracing::debug!("running {program} {}", args.join(" "));
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{program} timed out after {limit:?}"),
                )
            })??,
            None => child.await?,
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_interactive(&self, program: &str, args: &[&str]) -> io::Result<bool> {
        tracing::debug!("handing terminal to {program} {}", args.join(" "));
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        Ok(status.success())
    }
}
