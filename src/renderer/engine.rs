use super::compositor::TransitionComposer;
use super::encoder::VideoEncoder;
use super::normalizer::{ClipNormalizer, NormalizedClip};
use super::probe::MediaProbe;
use super::runner::CommandRunner;
use super::timeline::{AssembledVideo, RenderSpec, TimelineAssembler};
use crate::assets::{AudioPool, MediaPool, PoolStats};
use crate::audio::{scene_targets, VoicePreparer};
use crate::config::AppConfig;
use crate::error::{MixError, Result};
use crate::naming::daily_output_path;
use crate::overlay::OverlayPlanner;
use crate::script::{AudioSource, MixScript, SceneSource};
use crate::sequencer::{SceneSequencer, SceneTimeline, SequenceMode};
use crate::workspace::Workspace;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the finished video's speech comes from
#[derive(Debug, Clone, PartialEq)]
pub enum Narration {
    /// One voice file per scene, in scene order
    PerScene(Vec<PathBuf>),
    /// One shared file covering every scene
    Full(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ScenePlan {
    pub id: String,
    pub timeline: SceneTimeline,
}

/// Asset selection for one video, before anything is rendered
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub scenes: Vec<ScenePlan>,
    pub narration: Narration,
}

impl RenderPlan {
    pub fn clip_count(&self) -> usize {
        self.scenes
            .iter()
            .map(|s| s.timeline.ordered_assets.len())
            .sum()
    }
}

impl fmt::Display for RenderPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.narration {
            Narration::PerScene(voices) => writeln!(f, "Narration: {} voice files", voices.len())?,
            Narration::Full(path) => writeln!(f, "Narration: {}", path.display())?,
        }
        for (idx, scene) in self.scenes.iter().enumerate() {
            writeln!(f, "  Scene {} '{}': {}", idx + 1, scene.id, scene.timeline)?;
            for asset in &scene.timeline.ordered_assets {
                writeln!(f, "    - {}", asset.path.display())?;
            }
        }
        Ok(())
    }
}

/// Main rendering engine: sequences every scene of a job, renders the
/// selection and writes the finished video to the output directory.
pub struct RenderEngine<'a> {
    config: &'a AppConfig,
    runner: &'a dyn CommandRunner,
    probe: &'a dyn MediaProbe,
}

impl<'a> RenderEngine<'a> {
    pub fn new(config: &'a AppConfig, runner: &'a dyn CommandRunner, probe: &'a dyn MediaProbe) -> Self {
        Self {
            config,
            runner,
            probe,
        }
    }

    /// Choose and order the assets of every scene
    pub fn plan<R: Rng + ?Sized>(&self, script: &MixScript, rng: &mut R) -> Result<RenderPlan> {
        let transition = self.config.transition_spec();
        let sequencer = SceneSequencer::new(self.config.bounds(), transition.as_ref(), self.probe);

        match &script.audio {
            AudioSource::PerScene => {
                let mut scenes = Vec::with_capacity(script.scenes.len());
                let mut voices = Vec::with_capacity(script.scenes.len());
                for (idx, scene) in script.scenes.iter().enumerate() {
                    let voice = scene.voice.clone().ok_or_else(|| {
                        MixError::Script(format!("scene '{}' has no voice file", scene.id))
                    })?;
                    let target = self.probe.duration(&voice)?;
                    tracing::info!("scene '{}' voice runs {:.2}s", scene.id, target);

                    let timeline = sequencer.sequence(
                        &self.pool(scene),
                        target,
                        idx == 0,
                        SequenceMode::AudioDriven,
                        rng,
                    )?;
                    scenes.push(ScenePlan {
                        id: scene.id.clone(),
                        timeline,
                    });
                    voices.push(voice);
                }
                Ok(RenderPlan {
                    scenes,
                    narration: Narration::PerScene(voices),
                })
            }
            AudioSource::Full { file, dir } => {
                let narration = match (file, dir) {
                    (Some(file), _) => file.clone(),
                    (None, Some(dir)) => AudioPool::new(dir)
                        .with_extensions(&self.config.pool.audio_extensions)
                        .choose(rng)?,
                    (None, None) => {
                        return Err(MixError::Script(
                            "full audio needs a file or a directory".to_string(),
                        ))
                    }
                };
                let total = self.probe.duration(&narration)?;
                tracing::info!("narration {} runs {:.2}s", narration.display(), total);

                let targets = scene_targets(total, script.scenes.len());
                let mut scenes = Vec::with_capacity(script.scenes.len());
                for (idx, (scene, target)) in script.scenes.iter().zip(targets).enumerate() {
                    let timeline = sequencer.sequence(
                        &self.pool(scene),
                        target,
                        idx == 0,
                        SequenceMode::FixedAudio,
                        rng,
                    )?;
                    scenes.push(ScenePlan {
                        id: scene.id.clone(),
                        timeline,
                    });
                }
                Ok(RenderPlan {
                    scenes,
                    narration: Narration::Full(narration),
                })
            }
        }
    }

    /// Render one video into `output_dir`
    pub fn render_one<R: Rng + ?Sized>(
        &self,
        script: &MixScript,
        output_dir: &Path,
        rng: &mut R,
    ) -> Result<AssembledVideo> {
        let plan = self.plan(script, rng)?;
        let tools = self.config.renderer.tools();
        let workspace = Workspace::create(&self.config.renderer.work_dir)?;
        let encoder = VideoEncoder::new(&tools);

        let voice = self.prepare_narration(&plan, &encoder, &workspace)?;
        let clips = self.normalize(&plan, &workspace)?;

        let transition = self.config.transition_spec();
        let composition = TransitionComposer::compose(&clips, transition.as_ref(), rng);
        let overlays = if self.config.overlay.enabled {
            OverlayPlanner::new(&self.config.overlay).plan(composition.duration(), rng)
        } else {
            Vec::new()
        };

        let spec = RenderSpec {
            clips,
            composition,
            overlays,
            voice,
            background: script
                .background_music
                .clone()
                .or_else(|| self.config.audio.background_music.clone()),
            background_volume: self.config.audio.background_volume,
        };

        let output = daily_output_path(output_dir, self.config.renderer.prefix.as_deref())?;
        let assembler = TimelineAssembler::new(encoder, self.runner, self.probe, &self.config.overlay, &workspace);
        assembler.assemble(&spec, &output)
    }

    /// Render `count` videos one after another. Each gets its own selection
    /// and the next free output name.
    pub fn render<R: Rng + ?Sized>(
        &self,
        script: &MixScript,
        output_dir: &Path,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<AssembledVideo>> {
        let mut videos = Vec::with_capacity(count);
        for n in 1..=count {
            tracing::info!("rendering video {}/{} of '{}'", n, count, script.display_title());
            videos.push(self.render_one(script, output_dir, rng)?);
        }
        Ok(videos)
    }

    /// Probe every scene's pool and count what is usable
    pub fn pool_stats(&self, script: &MixScript) -> Result<Vec<(String, PoolStats)>> {
        script
            .scenes
            .iter()
            .map(|scene| -> Result<(String, PoolStats)> {
                let (_, stats) = self.pool(scene).load(self.probe)?;
                Ok((scene.id.clone(), stats))
            })
            .collect()
    }

    fn pool(&self, scene: &SceneSource) -> MediaPool {
        MediaPool::new(&scene.media_dir).with_extensions(&self.config.pool.media_extensions)
    }

    fn prepare_narration(&self, plan: &RenderPlan, encoder: &VideoEncoder, workspace: &Workspace) -> Result<PathBuf> {
        match &plan.narration {
            Narration::Full(path) => Ok(path.clone()),
            Narration::PerScene(voices) => {
                let preparer = VoicePreparer::new(encoder, self.runner, workspace);
                let mut segments = Vec::with_capacity(voices.len());
                for (idx, (voice, scene)) in voices.iter().zip(&plan.scenes).enumerate() {
                    let pad = scene
                        .timeline
                        .audio_padding
                        .filter(|_| self.config.audio.pad_voice);
                    segments.push(preparer.segment(idx, voice, pad)?);
                }
                preparer.join(&segments)
            }
        }
    }

    /// Normalize every selected asset in scene order. Repeated assets reuse
    /// the clip rendered for their first occurrence.
    fn normalize(&self, plan: &RenderPlan, workspace: &Workspace) -> Result<Vec<NormalizedClip>> {
        let tools = self.config.renderer.tools();
        let normalizer = ClipNormalizer::new(self.config.target()?, self.config.bounds(), &tools);
        let mut rendered: HashMap<PathBuf, NormalizedClip> = HashMap::new();
        let mut clips = Vec::with_capacity(plan.clip_count());

        for asset in plan.scenes.iter().flat_map(|s| &s.timeline.ordered_assets) {
            if let Some(clip) = rendered.get(&asset.path) {
                clips.push(clip.clone());
                continue;
            }
            let clip = normalizer.normalize(asset, &workspace.clip_path(rendered.len()), self.runner)?;
            rendered.insert(asset.path.clone(), clip.clone());
            clips.push(clip);
        }

        tracing::info!("normalized {} clips ({} unique)", clips.len(), rendered.len());
        Ok(clips)
    }
}
