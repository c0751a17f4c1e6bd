use crate::script::{AudioSource, MixScript};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Parser for JSON/TOML job files
pub struct ScriptParser;

impl ScriptParser {
    /// Parse a job file by extension (`.toml`, anything else is JSON) and
    /// resolve its relative paths against the file's directory
    pub fn parse(path: &Path) -> Result<MixScript> {
        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        let mut script = if is_toml {
            Self::parse_toml(path)?
        } else {
            Self::parse_json(path)?
        };

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        script.resolve_paths(base);
        Ok(script)
    }

    /// Parse a JSON job file
    pub fn parse_json(path: &Path) -> Result<MixScript> {
        let content = Self::read(path)?;
        let script: MixScript = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON job: {}", path.display()))?;
        Self::validate_script(&script)?;
        Ok(script)
    }

    /// Parse a TOML job file
    pub fn parse_toml(path: &Path) -> Result<MixScript> {
        let content = Self::read(path)?;
        let script: MixScript = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML job: {}", path.display()))?;
        Self::validate_script(&script)?;
        Ok(script)
    }

    fn read(path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))
    }

    fn validate_script(script: &MixScript) -> Result<()> {
        if script.scenes.is_empty() {
            anyhow::bail!("Job must contain at least one scene");
        }

        let mut seen = HashSet::new();
        for (idx, scene) in script.scenes.iter().enumerate() {
            if scene.id.trim().is_empty() {
                anyhow::bail!("Scene {} has empty ID", idx);
            }
            if !seen.insert(scene.id.as_str()) {
                anyhow::bail!("Scene ID '{}' is used more than once", scene.id);
            }
            if script.audio.is_per_scene() && scene.voice.is_none() {
                anyhow::bail!("Scene '{}' needs a voice file in per-scene mode", scene.id);
            }
        }

        match &script.audio {
            AudioSource::Full { file: None, dir: None } => {
                anyhow::bail!("Full audio mode needs either 'file' or 'dir'");
            }
            AudioSource::Full { .. } => {
                for scene in script.scenes.iter().filter(|s| s.voice.is_some()) {
                    tracing::warn!("scene '{}' voice is ignored in full audio mode", scene.id);
                }
            }
            AudioSource::PerScene => {}
        }

        Ok(())
    }

    /// Get a summary of the job
    pub fn summarize(script: &MixScript) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Title: {}\n", script.display_title()));
        let mode = match &script.audio {
            AudioSource::PerScene => "per-scene voice".to_string(),
            AudioSource::Full { file: Some(file), .. } => format!("full audio ({})", file.display()),
            AudioSource::Full { dir: Some(dir), .. } => format!("full audio (random from {})", dir.display()),
            AudioSource::Full { .. } => "full audio".to_string(),
        };
        summary.push_str(&format!("Audio: {}\n", mode));
        summary.push_str(&format!("Scenes: {}\n", script.scenes.len()));

        for (idx, scene) in script.scenes.iter().enumerate() {
            summary.push_str(&format!(
                "  Scene {}: '{}' from {}\n",
                idx + 1,
                scene.id,
                scene.media_dir.display()
            ));
        }

        if let Some(music) = &script.background_music {
            summary.push_str(&format!("Background music: {}\n", music.display()));
        }

        summary
    }
}
