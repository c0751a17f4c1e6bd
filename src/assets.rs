use crate::error::{MixError, ProbeError, Result};
use crate::renderer::MediaProbe;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// Asset types a media pool can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a path by extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// A probed pool member. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Native duration in seconds, videos only
    pub native_duration: Option<f64>,
    pub width: u32,
    pub height: u32,
}

impl MediaAsset {
    /// Probe a pool candidate. Images are only measured; videos also report
    /// their duration.
    pub fn probe(candidate: &Candidate, probe: &dyn MediaProbe) -> std::result::Result<Self, ProbeError> {
        let (width, height) = probe.dimensions(&candidate.path)?;
        let native_duration = match candidate.kind {
            MediaKind::Image => None,
            MediaKind::Video => Some(probe.duration(&candidate.path)?),
        };

        Ok(Self {
            path: candidate.path.clone(),
            kind: candidate.kind,
            native_duration,
            width,
            height,
        })
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// An unprobed file found in a pool directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// A directory of raw images and clips. Rescanned on every call; nothing is
/// cached between runs.
#[derive(Debug, Clone)]
pub struct MediaPool {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl MediaPool {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let extensions = IMAGE_EXTENSIONS
            .iter()
            .chain(VIDEO_EXTENSIONS)
            .map(|e| e.to_string())
            .collect();
        Self {
            dir: dir.as_ref().to_path_buf(),
            extensions,
        }
    }

    /// Restrict the pool to a custom extension set (with or without dots)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = normalize_extensions(extensions);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List eligible files, non-recursively, sorted by file name so that a
    /// seeded shuffle is reproducible.
    pub fn scan(&self) -> Result<Vec<Candidate>> {
        let candidates = list_files(&self.dir, &self.extensions)?
            .into_iter()
            .filter_map(|path| MediaKind::from_path(&path).map(|kind| Candidate { path, kind }))
            .collect();
        Ok(candidates)
    }

    /// Scan and probe every member, skipping unreadable ones
    pub fn load(&self, probe: &dyn MediaProbe) -> Result<(Vec<MediaAsset>, PoolStats)> {
        let mut stats = PoolStats::default();
        let mut assets = Vec::new();

        for candidate in self.scan()? {
            stats.total += 1;
            match MediaAsset::probe(&candidate, probe) {
                Ok(asset) => {
                    match asset.kind {
                        MediaKind::Image => stats.images += 1,
                        MediaKind::Video => stats.videos += 1,
                    }
                    assets.push(asset);
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {}", candidate.path.display(), e);
                    stats.skipped += 1;
                }
            }
        }

        Ok((assets, stats))
    }
}

/// Directory of narration tracks for the shared-audio mode
#[derive(Debug, Clone)]
pub struct AudioPool {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl AudioPool {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extensions: normalize_extensions(AUDIO_EXTENSIONS),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = normalize_extensions(extensions);
        self
    }

    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.dir, &self.extensions)
    }

    /// Pick one track uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PathBuf> {
        let files = self.scan()?;
        files.choose(rng).cloned().ok_or_else(|| {
            MixError::Script(format!("no audio files found in {}", self.dir.display()))
        })
    }
}

fn normalize_extensions<I, S>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    extensions
        .into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn list_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MixError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MixError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if extension_of(&path).map_or(false, |ext| extensions.contains(&ext)) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Statistics about a scanned pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub images: usize,
    pub videos: usize,
    pub skipped: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total: {}, Images: {}, Videos: {}, Skipped: {}",
            self.total, self.images, self.videos, self.skipped
        )
    }
}
