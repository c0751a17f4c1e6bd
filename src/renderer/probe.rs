use super::command::{RenderCommand, ToolPaths};
use super::runner::{CommandOutput, CommandRunner};
use crate::assets::MediaKind;
use crate::error::ProbeError;
use serde_json::Value;
use std::path::Path;

/// Read-only queries against media files.
pub trait MediaProbe {
    /// Duration in seconds (video or audio).
    fn duration(&self, path: &Path) -> Result<f64, ProbeError>;

    /// Pixel dimensions of an image or of the first video stream.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), ProbeError>;

    /// Frame rate of the first video stream.
    fn frame_rate(&self, path: &Path) -> Result<f64, ProbeError>;

    /// Succeeds when the file exists, is non-empty, and the renderer can
    /// parse at least one stream from it.
    fn verify(&self, path: &Path) -> Result<(), ProbeError>;
}

/// [`MediaProbe`] backed by `ffprobe`. Still images are measured from their
/// headers with the `image` crate instead of spawning a process.
pub struct FfprobeProbe<R> {
    runner: R,
    tools: ToolPaths,
}

impl<R: CommandRunner> FfprobeProbe<R> {
    pub fn new(runner: R, tools: ToolPaths) -> Self {
        Self { runner, tools }
    }

    fn query(&self, path: &Path, args: &[&str]) -> Result<String, ProbeError> {
        self.invoke(path, args).map(|out| out.stdout)
    }

    fn invoke(&self, path: &Path, args: &[&str]) -> Result<CommandOutput, ProbeError> {
        let cmd = RenderCommand::new(&self.tools.ffprobe)
            .args(args.iter().copied())
            .path(path);
        self.runner.run(&cmd).map_err(|source| ProbeError::Render {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<R: CommandRunner> MediaProbe for FfprobeProbe<R> {
    fn duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let stdout = self.query(
            path,
            &[
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
        )?;
        if let Some(duration) = parse_duration(&stdout) {
            return Ok(duration);
        }

        // Some containers only report the length in the banner
        let banner = self.invoke(path, &["-hide_banner"])?;
        parse_banner_duration(&banner.stderr)
            .ok_or_else(|| unreadable(path, "no duration reported"))
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32), ProbeError> {
        if MediaKind::from_path(path) == Some(MediaKind::Image) {
            return image::image_dimensions(path).map_err(|e| unreadable(path, e.to_string()));
        }

        let stdout = self.query(
            path,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "csv=s=x:p=0",
            ],
        )?;
        parse_dimensions(&stdout).ok_or_else(|| unreadable(path, "no video stream dimensions"))
    }

    fn frame_rate(&self, path: &Path) -> Result<f64, ProbeError> {
        let stdout = self.query(
            path,
            &[
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=r_frame_rate",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ],
        )?;
        parse_frame_rate(&stdout).ok_or_else(|| unreadable(path, "no frame rate reported"))
    }

    fn verify(&self, path: &Path) -> Result<(), ProbeError> {
        let size = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| unreadable(path, e.to_string()))?;
        if size == 0 {
            return Err(unreadable(path, "file is empty"));
        }

        let stdout = self.query(
            path,
            &[
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ],
        )?;
        let json: Value =
            serde_json::from_str(&stdout).map_err(|e| unreadable(path, e.to_string()))?;
        let streams = json
            .get("streams")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if streams == 0 {
            return Err(unreadable(path, "no streams found"));
        }

        tracing::debug!("verified {} ({} bytes, {} streams)", path.display(), size, streams);
        Ok(())
    }
}

fn unreadable(path: &Path, reason: impl Into<String>) -> ProbeError {
    ProbeError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Accepts `12.345` or `duration=12.345`; rejects `N/A`, zero and negatives.
pub(crate) fn parse_duration(output: &str) -> Option<f64> {
    output.lines().find_map(|line| {
        let value = line.trim().trim_start_matches("duration=");
        value
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
    })
}

/// Parses the `Duration: 00:01:02.50, start: ...` line of the stream banner.
pub(crate) fn parse_banner_duration(output: &str) -> Option<f64> {
    let line = output.lines().find_map(|l| l.trim().strip_prefix("Duration:"))?;
    let stamp = line.split(',').next()?.trim();
    let mut parts = stamp.split(':');
    let hours = parts.next()?.parse::<f64>().ok()?;
    let minutes = parts.next()?.parse::<f64>().ok()?;
    let secs = parts.next()?.parse::<f64>().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + secs;
    (total > 0.0).then_some(total)
}

/// Parses `1920x1080` (csv output of `stream=width,height`).
pub(crate) fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    output.lines().find_map(|line| {
        let (w, h) = line.trim().trim_end_matches('x').split_once('x')?;
        let w = w.trim().parse::<u32>().ok()?;
        let h = h.trim().parse::<u32>().ok()?;
        (w > 0 && h > 0).then_some((w, h))
    })
}

/// Parses `30000/1001` or `25`.
pub(crate) fn parse_frame_rate(output: &str) -> Option<f64> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let fps = match line.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().ok()?;
            let den = den.parse::<f64>().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => line.parse::<f64>().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
