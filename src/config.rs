use crate::assets::{AUDIO_EXTENSIONS, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::error::{MixError, Result};
use crate::overlay::OverlayConfig;
use crate::renderer::{SegmentBounds, ToolPaths, TransitionKind, TransitionSpec, TransitionStyle, VideoTarget};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub video: VideoConfig,
    pub segments: SegmentBounds,
    pub transition: TransitionConfig,
    pub audio: AudioConfig,
    pub overlay: OverlayConfig,
    pub renderer: RendererConfig,
    pub pool: PoolConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    /// `WxH`
    pub resolution: String,
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            resolution: "1080x1920".to_string(),
            fps: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TransitionConfig {
    pub enabled: bool,
    pub kind: TransitionKind,
    pub style: TransitionStyle,
    pub duration: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: TransitionKind::Xfade,
            style: TransitionStyle::default(),
            duration: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AudioConfig {
    pub background_music: Option<PathBuf>,
    pub background_volume: f64,
    /// Pad each scene's voice so it covers the scene's video
    pub pad_voice: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            background_music: None,
            background_volume: 0.2,
            pad_voice: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RendererConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    /// Per-invocation limit; 0 disables it
    pub timeout_secs: u64,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub prefix: Option<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let tools = ToolPaths::default();
        Self {
            ffmpeg: tools.ffmpeg,
            ffprobe: tools.ffprobe,
            timeout_secs: 600,
            work_dir: PathBuf::from("work"),
            output_dir: PathBuf::from("final"),
            prefix: None,
        }
    }
}

impl RendererConfig {
    pub fn tools(&self) -> ToolPaths {
        ToolPaths {
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PoolConfig {
    pub media_extensions: Vec<String>,
    pub audio_extensions: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        fn owned(exts: &[&str]) -> Vec<String> {
            exts.iter().map(|e| e.to_string()).collect()
        }
        Self {
            media_extensions: owned(&[IMAGE_EXTENSIONS, VIDEO_EXTENSIONS].concat()),
            audio_extensions: owned(AUDIO_EXTENSIONS),
        }
    }
}

impl AppConfig {
    /// Defaults, then `clipmix.toml` (or the given file), then `CLIPMIX_*`
    /// environment variables (e.g. `CLIPMIX_VIDEO__FPS=25`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("clipmix").required(false),
        };

        let builder = config::Config::builder().add_source(file).add_source(
            config::Environment::with_prefix("CLIPMIX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MixError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MixError::Config(msg));

        self.target()?;
        let bounds = &self.segments;
        if !positive(bounds.min_length) || !positive(bounds.max_length) {
            return fail("segment lengths must be positive".to_string());
        }
        if bounds.min_length > bounds.max_length {
            return fail(format!(
                "segment min_length {} exceeds max_length {}",
                bounds.min_length, bounds.max_length
            ));
        }
        if !positive(bounds.default_image_duration) {
            return fail("default_image_duration must be positive".to_string());
        }
        if self.transition.enabled
            && (!positive(self.transition.duration) || self.transition.duration >= bounds.min_length)
        {
            return fail(format!(
                "transition duration {} must be positive and shorter than min_length {}",
                self.transition.duration, bounds.min_length
            ));
        }
        if !non_negative(self.audio.background_volume) {
            return fail("background_volume cannot be negative".to_string());
        }
        let overlay = &self.overlay;
        if !positive(overlay.frequency) {
            return fail(format!("overlay frequency {} must be positive", overlay.frequency));
        }
        if !positive(overlay.duration) {
            return fail(format!("overlay duration {} must be positive", overlay.duration));
        }
        if !non_negative(overlay.fade_duration) {
            return fail("overlay fade_duration cannot be negative".to_string());
        }
        Ok(())
    }

    /// Output geometry from `video.resolution` and `video.fps`
    pub fn target(&self) -> Result<VideoTarget> {
        let (width, height) = parse_resolution(&self.video.resolution)?;
        if self.video.fps == 0 {
            return Err(MixError::Config("fps must be at least 1".to_string()));
        }
        Ok(VideoTarget {
            width,
            height,
            fps: self.video.fps,
        })
    }

    pub fn bounds(&self) -> SegmentBounds {
        self.segments.clamped()
    }

    pub fn transition_spec(&self) -> Option<TransitionSpec> {
        self.transition.enabled.then(|| TransitionSpec {
            kind: self.transition.kind,
            style: self.transition.style.clone(),
            duration: self.transition.duration,
        })
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Parse `WxH` (also accepts `*` as separator)
pub fn parse_resolution(value: &str) -> Result<(u32, u32)> {
    let invalid = || MixError::Config(format!("invalid resolution '{}', expected WxH", value));
    let (w, h) = value
        .trim()
        .split_once(|c| c == 'x' || c == 'X' || c == '*')
        .ok_or_else(invalid)?;
    let w: u32 = w.trim().parse().map_err(|_| invalid())?;
    let h: u32 = h.trim().parse().map_err(|_| invalid())?;
    if w == 0 || h == 0 || w % 2 != 0 || h % 2 != 0 {
        return Err(invalid());
    }
    Ok((w, h))
}
