//! Test doubles for the renderer boundary.

use super::command::RenderCommand;
use super::probe::MediaProbe;
use super::runner::{CommandOutput, CommandRunner};
use crate::error::{ProbeError, RenderError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

type Matcher = Box<dyn Fn(&RenderCommand) -> bool>;

/// Records every command. ffmpeg invocations "succeed" by writing a few
/// bytes to their output path; ffprobe invocations answer from canned
/// responses keyed by an argument substring.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<RenderCommand>>,
    responses: Vec<(String, String)>,
    failures: Vec<Matcher>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, needle: &str, stdout: &str) -> Self {
        self.responses.push((needle.to_string(), stdout.to_string()));
        self
    }

    pub fn fail_when(mut self, matcher: impl Fn(&RenderCommand) -> bool + 'static) -> Self {
        self.failures.push(Box::new(matcher));
        self
    }

    pub fn calls(&self) -> Vec<RenderCommand> {
        self.calls.borrow().clone()
    }

    pub fn ffmpeg_calls(&self) -> Vec<RenderCommand> {
        self.calls()
            .into_iter()
            .filter(|cmd| cmd.tool() == "ffmpeg")
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &RenderCommand) -> Result<CommandOutput, RenderError> {
        self.calls.borrow_mut().push(command.clone());

        if self.failures.iter().any(|m| m(command)) {
            return Err(RenderError::Failed {
                tool: command.tool(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }

        let stdout = self
            .responses
            .iter()
            .find(|(needle, _)| command.arguments().iter().any(|a| a.contains(needle.as_str())))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        if command.tool() == "ffmpeg" {
            if let Some(output) = command.output() {
                let output = Path::new(output);
                if output.parent().map_or(false, |p| p.as_os_str().is_empty() || p.exists()) {
                    let _ = std::fs::write(output, b"rendered");
                }
            }
        }

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Table-driven probe. Unknown paths are unreadable.
#[derive(Default)]
pub struct FakeProbe {
    durations: HashMap<PathBuf, f64>,
    dimensions: HashMap<PathBuf, (u32, u32)>,
    default_dimensions: Option<(u32, u32)>,
    rendered_duration: Option<f64>,
    unverifiable: Vec<PathBuf>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            default_dimensions: Some((1920, 1080)),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, path: impl Into<PathBuf>, seconds: f64) -> Self {
        self.durations.insert(path.into(), seconds);
        self
    }

    pub fn with_dimensions(mut self, path: impl Into<PathBuf>, dims: (u32, u32)) -> Self {
        self.dimensions.insert(path.into(), dims);
        self
    }

    pub fn unverifiable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unverifiable.push(path.into());
        self
    }

    /// Files missing from the duration table but present on disk report
    /// this duration (rendered intermediates live at unpredictable paths).
    pub fn with_rendered_duration(mut self, seconds: f64) -> Self {
        self.rendered_duration = Some(seconds);
        self
    }
}

fn unreadable(path: &Path) -> ProbeError {
    ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: "unknown to fake probe".to_string(),
    }
}

impl MediaProbe for FakeProbe {
    fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        self.durations
            .get(path)
            .copied()
            .or_else(|| self.rendered_duration.filter(|_| path.exists()))
            .ok_or_else(|| unreadable(path))
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32), ProbeError> {
        self.dimensions
            .get(path)
            .copied()
            .or(self.default_dimensions)
            .ok_or_else(|| unreadable(path))
    }

    fn frame_rate(&self, _path: &Path) -> Result<f64, ProbeError> {
        Ok(30.0)
    }

    fn verify(&self, path: &Path) -> Result<(), ProbeError> {
        if self.unverifiable.iter().any(|p| p == path) || !path.exists() {
            return Err(unreadable(path));
        }
        Ok(())
    }
}
