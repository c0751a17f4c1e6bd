use crate::script::{AudioSource, MixScript, SceneSource};
use clap::ValueEnum;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TemplateType {
    /// One voice file per scene
    PerScene,
    /// One narration shared across scenes
    FullAudio,
}

pub struct ScriptTemplate;

impl ScriptTemplate {
    pub fn generate(template_type: TemplateType, scenes: usize) -> MixScript {
        let scenes = scenes.max(1);
        match template_type {
            TemplateType::PerScene => Self::generate_per_scene(scenes),
            TemplateType::FullAudio => Self::generate_full_audio(scenes),
        }
    }

    fn generate_per_scene(count: usize) -> MixScript {
        MixScript {
            title: Some("Per-scene voice ad".into()),
            scenes: (1..=count)
                .map(|n| {
                    let mut scene = Self::create_scene(n);
                    scene.voice = Some(PathBuf::from(format!("voice/scene{}.mp3", n)));
                    scene
                })
                .collect(),
            audio: AudioSource::PerScene,
            background_music: None,
        }
    }

    fn generate_full_audio(count: usize) -> MixScript {
        MixScript {
            title: Some("Full narration ad".into()),
            scenes: (1..=count).map(Self::create_scene).collect(),
            audio: AudioSource::Full {
                file: None,
                dir: Some(PathBuf::from("voice")),
            },
            background_music: Some(PathBuf::from("music/background.mp3")),
        }
    }

    fn create_scene(n: usize) -> SceneSource {
        SceneSource {
            id: format!("scene{}", n),
            media_dir: PathBuf::from(format!("media/scene{}", n)),
            voice: None,
        }
    }
}
