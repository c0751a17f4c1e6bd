use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single renderer (ffmpeg/ffprobe) invocation.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {}s", .timeout.as_secs_f32())]
    TimedOut { tool: String, timeout: Duration },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    #[error("{tool} did not produce {}", .path.display())]
    MissingOutput { tool: String, path: PathBuf },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

/// An asset the renderer could not read. Callers skip the asset.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot probe {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("probe of {} failed: {source}", .path.display())]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },
}

/// Run-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum MixError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(
        "not enough media in {} to cover {target:.2}s (only {accumulated:.2}s available)",
        .dir.display()
    )]
    InsufficientMedia {
        dir: PathBuf,
        accumulated: f64,
        target: f64,
    },

    #[error("failed to normalize {}: {cause}", .asset.display())]
    Normalization {
        asset: PathBuf,
        #[source]
        cause: RenderError,
    },

    #[error("rendered video {} is unusable: {reason}", .path.display())]
    RenderVerification { path: PathBuf, reason: String },

    #[error("text overlay pass failed: {0}")]
    Overlay(#[source] RenderError),

    #[error("background music mix failed: {0}")]
    BackgroundMusic(#[source] RenderError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid job: {0}")]
    Script(String),
}

impl MixError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MixError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = MixError> = std::result::Result<T, E>;
