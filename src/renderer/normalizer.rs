use super::command::{seconds, RenderCommand, ToolPaths};
use super::runner::CommandRunner;
use crate::assets::{MediaAsset, MediaKind};
use crate::error::{MixError, RenderError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Output frame geometry every clip is normalized to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTarget {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoTarget {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

/// Limits on how long one clip may play
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentBounds {
    pub min_length: f64,
    pub max_length: f64,
    pub default_image_duration: f64,
}

impl Default for SegmentBounds {
    fn default() -> Self {
        Self::new(3.0, 8.0, 5.0)
    }
}

impl SegmentBounds {
    /// Image duration is raised to `min_length` when it falls below it
    pub fn new(min_length: f64, max_length: f64, default_image_duration: f64) -> Self {
        Self {
            min_length,
            max_length,
            default_image_duration: default_image_duration.max(min_length),
        }
    }

    /// Clamp the raw values after deserialization
    pub fn clamped(self) -> Self {
        Self::new(self.min_length, self.max_length, self.default_image_duration)
    }

    /// Playing time an asset contributes once normalized
    pub fn effective_duration(&self, asset: &MediaAsset) -> f64 {
        match (asset.kind, asset.native_duration) {
            (MediaKind::Video, Some(d)) => self.clamp_video(d),
            (MediaKind::Video, None) => self.min_length,
            (MediaKind::Image, _) => self.default_image_duration,
        }
    }

    fn clamp_video(&self, d: f64) -> f64 {
        if d < self.min_length {
            self.min_length
        } else if d > self.max_length {
            self.max_length
        } else {
            d
        }
    }
}

/// A rendered intermediate with uniform geometry, frame rate and codec
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedClip {
    pub source: PathBuf,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
}

/// Turns pool assets into uniform clips the composer can join.
pub struct ClipNormalizer {
    target: VideoTarget,
    bounds: SegmentBounds,
    ffmpeg: String,
}

impl ClipNormalizer {
    pub fn new(target: VideoTarget, bounds: SegmentBounds, tools: &ToolPaths) -> Self {
        Self {
            target,
            bounds,
            ffmpeg: tools.ffmpeg.clone(),
        }
    }

    /// Build the invocation for one asset without running anything.
    /// Returns the command and the duration the clip will have.
    pub fn plan(&self, asset: &MediaAsset, output: &Path) -> (RenderCommand, f64) {
        let duration = self.bounds.effective_duration(asset);
        let frame = scale_crop_filter(
            (asset.width, asset.height),
            (self.target.width, self.target.height),
        );
        let fps = self.target.fps.to_string();

        let cmd = RenderCommand::new(&self.ffmpeg).arg("-y");
        let cmd = match asset.kind {
            MediaKind::Image => cmd
                .args(["-loop", "1"])
                .input(&asset.path)
                .args(["-t".to_string(), seconds(duration)])
                .args(["-r".to_string(), fps])
                .args(["-vf".to_string(), frame]),
            MediaKind::Video => {
                let native = asset.native_duration.unwrap_or(duration);
                let mut filter = frame;
                let mut trim = None;
                if native < self.bounds.min_length {
                    filter = format!("setpts={:.4}*PTS,{}", self.bounds.min_length / native, filter);
                } else if native > self.bounds.max_length {
                    trim = Some(seconds(self.bounds.max_length));
                }

                let cmd = cmd
                    .input(&asset.path)
                    .args(["-r".to_string(), fps])
                    .args(["-vf".to_string(), filter]);
                match trim {
                    Some(max) => cmd.args(["-t".to_string(), max]),
                    None => cmd,
                }
            }
        };

        let cmd = cmd
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-an"])
            .path(output);
        (cmd, duration)
    }

    /// Render one asset into `output`
    pub fn normalize(
        &self,
        asset: &MediaAsset,
        output: &Path,
        runner: &dyn CommandRunner,
    ) -> Result<NormalizedClip> {
        let (cmd, duration) = self.plan(asset, output);
        let failed = |cause: RenderError| MixError::Normalization {
            asset: asset.path.clone(),
            cause,
        };

        runner.run(&cmd).map_err(failed)?;
        if !output.exists() {
            return Err(failed(RenderError::MissingOutput {
                tool: cmd.tool(),
                path: output.to_path_buf(),
            }));
        }

        tracing::debug!(
            "normalized {} -> {} ({:.2}s)",
            asset.path.display(),
            output.display(),
            duration
        );
        Ok(NormalizedClip {
            source: asset.path.clone(),
            path: output.to_path_buf(),
            width: self.target.width,
            height: self.target.height,
            fps: self.target.fps,
            duration,
        })
    }
}

/// Scale so the frame covers the target, then center-crop to it exactly.
/// Aspect ratios are compared by cross-multiplication to stay in integers.
pub fn scale_crop_filter(source: (u32, u32), target: (u32, u32)) -> String {
    let (sw, sh) = (source.0 as u64, source.1 as u64);
    let (tw, th) = target;
    let scale = if sw * th as u64 > tw as u64 * sh {
        format!("scale=-2:{}", th)
    } else {
        format!("scale={}:-2", tw)
    };
    format!("{},crop={}:{},setsar=1", scale, tw, th)
}
