use super::command::RenderCommand;
use crate::error::RenderError;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes renderer commands. The pipeline only talks to the renderer
/// through this trait.
pub trait CommandRunner {
    fn run(&self, command: &RenderCommand) -> Result<CommandOutput, RenderError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &RenderCommand) -> Result<CommandOutput, RenderError> {
        (**self).run(command)
    }
}

/// Runs commands as child processes, blocking until they exit, the timeout
/// expires or the cancellation token fires.
///
/// Each invocation is driven to completion on a private current-thread
/// runtime, so callers stay synchronous and renders stay sequential.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
    cancel: CancellationToken,
    runtime: Arc<Runtime>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            timeout,
            cancel: CancellationToken::new(),
            runtime: Arc::new(runtime),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Check if a binary can be launched at all
    pub fn is_available(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    async fn execute(&self, command: &RenderCommand, tool: &str) -> Result<Output, RenderError> {
        let spawn_error = |source| RenderError::Spawn {
            tool: tool.to_string(),
            source,
        };

        // dropping the wait future on timeout or cancel kills the child
        let child = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;
        let wait = child.wait_with_output();

        let finished = async {
            match self.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                    Ok(result) => result.map_err(spawn_error),
                    Err(_) => {
                        tracing::warn!("{} exceeded {:?}, killed", tool, timeout);
                        Err(RenderError::TimedOut {
                            tool: tool.to_string(),
                            timeout,
                        })
                    }
                },
                None => wait.await.map_err(spawn_error),
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(RenderError::Cancelled {
                tool: tool.to_string(),
            }),
            result = finished => result,
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &RenderCommand) -> Result<CommandOutput, RenderError> {
        let tool = command.tool();
        tracing::debug!("running: {}", command);

        let started = Instant::now();
        let output = self.runtime.block_on(self.execute(command, &tool))?;
        let output_text = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            return Err(RenderError::Failed {
                tool,
                code: output.status.code(),
                stderr: tail(&output_text.stderr, 2000),
            });
        }

        tracing::debug!("{} finished in {:.2}s", tool, started.elapsed().as_secs_f32());
        Ok(output_text)
    }
}

/// Keep the end of long diagnostic output; ffmpeg prints the actual error last.
fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim().to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("...{}", skipped.trim())
}
