use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One render job: the scenes to cut and where their narration comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub scenes: Vec<SceneSource>,
    pub audio: AudioSource,
    /// Overrides `audio.background_music` from the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_music: Option<PathBuf>,
}

/// A scene draws its footage from one media directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSource {
    pub id: String,
    pub media_dir: PathBuf,
    /// Narration for this scene (per-scene audio only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AudioSource {
    /// Each scene carries its own voice file; scene length follows it
    PerScene,
    /// One narration shared by all scenes, split evenly between them.
    /// With `dir`, one audio file is drawn from it at random.
    Full {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<PathBuf>,
    },
}

impl AudioSource {
    pub fn is_per_scene(&self) -> bool {
        matches!(self, AudioSource::PerScene)
    }
}

impl MixScript {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("untitled")
    }

    /// Make every relative path relative to `base` instead of the working
    /// directory
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        for scene in &mut self.scenes {
            resolve(&mut scene.media_dir);
            if let Some(voice) = scene.voice.as_mut() {
                resolve(voice);
            }
        }
        if let AudioSource::Full { file, dir } = &mut self.audio {
            if let Some(file) = file.as_mut() {
                resolve(file);
            }
            if let Some(dir) = dir.as_mut() {
                resolve(dir);
            }
        }
        if let Some(music) = self.background_music.as_mut() {
            resolve(music);
        }
    }
}
