use super::compositor::Composition;
use super::encoder::VideoEncoder;
use super::normalizer::NormalizedClip;
use super::probe::MediaProbe;
use super::runner::CommandRunner;
use crate::error::{MixError, Result};
use crate::overlay::{OverlayConfig, OverlayInterval, OverlayPlanner};
use crate::workspace::{StagedOutput, Workspace};
use std::path::{Path, PathBuf};

/// Everything needed to render one finished video
#[derive(Debug, Clone)]
pub struct RenderSpec {
    pub clips: Vec<NormalizedClip>,
    pub composition: Composition,
    pub overlays: Vec<OverlayInterval>,
    pub voice: PathBuf,
    pub background: Option<PathBuf>,
    pub background_volume: f64,
}

/// Outcome of a successful assembly
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub duration: f64,
    pub overlay_applied: bool,
    pub background_applied: bool,
}

/// Runs the assembly passes in order: join, verify, overlay, voice,
/// background music. Each pass deletes the workspace files it consumed; the
/// output only appears once every fatal pass has succeeded.
pub struct TimelineAssembler<'a> {
    encoder: VideoEncoder,
    runner: &'a dyn CommandRunner,
    probe: &'a dyn MediaProbe,
    overlay: &'a OverlayConfig,
    workspace: &'a Workspace,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(
        encoder: VideoEncoder,
        runner: &'a dyn CommandRunner,
        probe: &'a dyn MediaProbe,
        overlay: &'a OverlayConfig,
        workspace: &'a Workspace,
    ) -> Self {
        Self {
            encoder,
            runner,
            probe,
            overlay,
            workspace,
        }
    }

    pub fn assemble(&self, spec: &RenderSpec, output: &Path) -> Result<AssembledVideo> {
        if spec.clips.is_empty() {
            return Err(MixError::Script("nothing to assemble".to_string()));
        }

        let joined = self.join(spec)?;
        // repeated assets share a clip file, discard tolerates the second removal
        for clip in &spec.clips {
            self.workspace.discard(&clip.path);
        }
        self.probe
            .verify(&joined)
            .map_err(|e| MixError::RenderVerification {
                path: joined.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!("joined {} clips", spec.clips.len());
        let expected = f64::from(spec.clips[0].fps);
        match self.probe.frame_rate(&joined) {
            Ok(fps) if (fps - expected).abs() > 0.5 => {
                tracing::warn!("joined video runs at {:.2} fps, expected {}", fps, expected)
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("frame rate unavailable: {}", e),
        }

        let (video, overlay_applied) = match self.apply_overlays(spec, &joined) {
            Ok(Some(overlaid)) => {
                self.workspace.discard(&joined);
                (overlaid, true)
            }
            Ok(None) => (joined, false),
            Err(e) => {
                tracing::warn!("{}; continuing without text", e);
                (joined, false)
            }
        };

        let voiced = self.workspace.file("voiced.mp4");
        self.runner
            .run(&self.encoder.mux_voice(&video, &spec.voice, &voiced))?;
        self.workspace.discard(&video);
        self.workspace.discard(&spec.voice);

        let (finished, background_applied) = match &spec.background {
            Some(music) => match self.mix_background(&voiced, music, spec.background_volume) {
                Ok(mixed) => {
                    self.workspace.discard(&voiced);
                    (mixed, true)
                }
                Err(e) => {
                    tracing::warn!("{}; keeping voice-only audio", e);
                    (voiced, false)
                }
            },
            None => (voiced, false),
        };

        let staged = StagedOutput::new(output)?;
        std::fs::copy(&finished, staged.path()).map_err(|e| MixError::io(&finished, e))?;
        self.workspace.discard(&finished);
        let path = staged.commit()?;

        let duration = self
            .probe
            .duration(&path)
            .unwrap_or_else(|_| spec.composition.duration());
        tracing::info!("wrote {} ({:.2}s)", path.display(), duration);

        Ok(AssembledVideo {
            path,
            duration,
            overlay_applied,
            background_applied,
        })
    }

    fn join(&self, spec: &RenderSpec) -> Result<PathBuf> {
        let joined = self.workspace.file("joined.mp4");
        let cmd = match &spec.composition {
            Composition::Concat { list, .. } => {
                let list_file = self.workspace.write("concat.txt", list)?;
                self.encoder.concat_list(&list_file, &joined)
            }
            Composition::Graph {
                graph,
                output_label,
                ..
            } => {
                let inputs: Vec<PathBuf> = spec.clips.iter().map(|c| c.path.clone()).collect();
                self.encoder
                    .concat_graph(&inputs, graph, output_label, &joined)
            }
        };
        self.runner.run(&cmd)?;
        Ok(joined)
    }

    /// Returns the overlaid file, or `None` when there is nothing to draw.
    /// Intervals planned past the actual rendered length are dropped.
    fn apply_overlays(&self, spec: &RenderSpec, joined: &Path) -> Result<Option<PathBuf>> {
        if !self.overlay.enabled || spec.overlays.is_empty() {
            return Ok(None);
        }

        let actual = self
            .probe
            .duration(joined)
            .unwrap_or_else(|_| spec.composition.duration());
        let intervals: Vec<OverlayInterval> = spec
            .overlays
            .iter()
            .filter(|i| i.end <= actual)
            .cloned()
            .collect();

        let first = &spec.clips[0];
        let planner = OverlayPlanner::new(self.overlay);
        let Some(filter) = planner.filter(&intervals, first.width, first.height) else {
            return Ok(None);
        };

        let overlaid = self.workspace.file("overlaid.mp4");
        if let Err(e) = self
            .runner
            .run(&self.encoder.overlay(joined, &filter, &overlaid))
        {
            let _ = std::fs::remove_file(&overlaid);
            return Err(MixError::Overlay(e));
        }
        tracing::info!("drew {} text intervals", intervals.len());
        Ok(Some(overlaid))
    }

    fn mix_background(&self, voiced: &Path, music: &Path, volume: f64) -> Result<PathBuf> {
        let mixed = self.workspace.file("mixed.mp4");
        if let Err(e) = self
            .runner
            .run(&self.encoder.mix_background(voiced, music, volume, &mixed))
        {
            let _ = std::fs::remove_file(&mixed);
            return Err(MixError::BackgroundMusic(e));
        }
        Ok(mixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::Placement;
    use crate::renderer::command::{RenderCommand, ToolPaths};
    use crate::renderer::testing::{FakeProbe, FakeRunner};
    use std::cell::RefCell;
    use std::fs;
    use std::rc::Rc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        workspace: Workspace,
        output: PathBuf,
        spec: RenderSpec,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::create(&dir.path().join("work")).unwrap();
        let clips: Vec<NormalizedClip> = (0..2)
            .map(|i| NormalizedClip {
                source: PathBuf::from(format!("src{i}.mp4")),
                path: workspace.clip_path(i),
                width: 1080,
                height: 1920,
                fps: 30,
                duration: 20.0,
            })
            .collect();
        let list = crate::renderer::compositor::concat_list(&clips);

        Fixture {
            output: dir.path().join("final").join("2024-01-01_01.mp4"),
            spec: RenderSpec {
                clips,
                composition: Composition::Concat {
                    list,
                    duration: 40.0,
                },
                overlays: Vec::new(),
                voice: dir.path().join("voice.wav"),
                background: None,
                background_volume: 0.2,
            },
            workspace,
            _dir: dir,
        }
    }

    fn interval(start: f64, end: f64) -> OverlayInterval {
        OverlayInterval {
            start,
            end,
            main_text: "Acme".into(),
            sub_text: "Rocket".into(),
            placement: Placement {
                preset: None,
                main: ("(w-text_w)/2".into(), "120".into()),
                sub: ("(w-text_w)/2".into(), "180".into()),
            },
        }
    }

    fn has_arg(cmd: &RenderCommand, needle: &str) -> bool {
        cmd.arguments().iter().any(|a| a.contains(needle))
    }

    fn media_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".mp4") || name.ends_with(".wav"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_plain_assembly() {
        let fx = fixture();
        let runner = FakeRunner::new();
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();

        assert_eq!(video.path, fx.output);
        assert_eq!(video.duration, 40.0);
        assert!(!video.overlay_applied);
        assert!(!video.background_applied);
        assert!(fx.output.exists());

        let calls = runner.ffmpeg_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].contains_pair("-f", "concat"));
        assert!(calls[1].arguments().contains(&"-shortest".to_string()));
        let list = fs::read_to_string(fx.workspace.file("concat.txt")).unwrap();
        assert_eq!(list.lines().count(), 2);
    }

    #[test]
    fn test_unverifiable_join_is_fatal() {
        let fx = fixture();
        let runner = FakeRunner::new();
        let probe = FakeProbe::new().unverifiable(fx.workspace.file("joined.mp4"));
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let err = assembler.assemble(&fx.spec, &fx.output).unwrap_err();
        assert!(matches!(err, MixError::RenderVerification { .. }));
        assert!(!fx.output.exists());
        assert_eq!(runner.ffmpeg_calls().len(), 1);
    }

    #[test]
    fn test_overlay_intervals_past_actual_length_dropped() {
        let mut fx = fixture();
        fx.spec.overlays = vec![interval(10.0, 14.0), interval(36.0, 40.0)];
        let runner = FakeRunner::new();
        // rendered join came out shorter than composed
        let probe = FakeProbe::new().with_rendered_duration(38.0);
        let overlay = OverlayConfig {
            enabled: true,
            ..OverlayConfig::default()
        };
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(video.overlay_applied);

        let calls = runner.ffmpeg_calls();
        let overlay_call = calls.iter().find(|c| has_arg(c, "drawtext")).unwrap();
        let filter = overlay_call.value_of("-vf").unwrap();
        assert!(filter.contains("between(t,10,14)"));
        assert!(!filter.contains("between(t,36,40)"));
    }

    #[test]
    fn test_overlay_failure_is_not_fatal() {
        let mut fx = fixture();
        fx.spec.overlays = vec![interval(10.0, 14.0)];
        let runner = FakeRunner::new().fail_when(|c| has_arg(c, "drawtext"));
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig {
            enabled: true,
            ..OverlayConfig::default()
        };
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(!video.overlay_applied);
        let mux = runner
            .ffmpeg_calls()
            .into_iter()
            .find(|c| c.arguments().contains(&"-shortest".to_string()))
            .unwrap();
        assert!(mux.contains_pair("-i", &fx.workspace.file("joined.mp4").to_string_lossy()));
    }

    #[test]
    fn test_disabled_overlay_skips_pass() {
        let mut fx = fixture();
        fx.spec.overlays = vec![interval(10.0, 14.0)];
        let runner = FakeRunner::new();
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(!runner.ffmpeg_calls().iter().any(|c| has_arg(c, "drawtext")));
    }

    #[test]
    fn test_voice_mux_failure_is_fatal() {
        let fx = fixture();
        let runner = FakeRunner::new().fail_when(|c| c.contains_pair("-map", "1:a:0"));
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let err = assembler.assemble(&fx.spec, &fx.output).unwrap_err();
        assert!(matches!(err, MixError::Render(_)));
        assert!(!fx.output.exists());
    }

    #[test]
    fn test_background_music_failure_keeps_voice_only() {
        let mut fx = fixture();
        fx.spec.background = Some(PathBuf::from("/music/bgm.mp3"));
        let runner = FakeRunner::new().fail_when(|c| has_arg(c, "amix"));
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(!video.background_applied);
        assert!(fx.output.exists());
        assert!(!fx.workspace.file("mixed.mp4").exists());
    }

    #[test]
    fn test_background_music_mixed() {
        let mut fx = fixture();
        fx.spec.background = Some(PathBuf::from("/music/bgm.mp3"));
        let runner = FakeRunner::new();
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(video.background_applied);
        assert_eq!(runner.ffmpeg_calls().len(), 3);
    }

    #[test]
    fn test_graph_composition_feeds_every_clip() {
        let mut fx = fixture();
        fx.spec.composition = Composition::Graph {
            graph: "[0:v][1:v]xfade=transition=fade:duration=1:offset=19[video]".into(),
            output_label: "video".into(),
            duration: 39.0,
        };
        let runner = FakeRunner::new();
        let probe = FakeProbe::new().with_rendered_duration(39.0);
        let overlay = OverlayConfig::default();
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        assembler.assemble(&fx.spec, &fx.output).unwrap();
        let join = &runner.ffmpeg_calls()[0];
        assert!(join.contains_pair("-i", &fx.workspace.clip_path(0).to_string_lossy()));
        assert!(join.contains_pair("-i", &fx.workspace.clip_path(1).to_string_lossy()));
        assert!(join.contains_pair("-map", "[video]"));
    }

    #[test]
    fn test_consumed_intermediates_are_removed() {
        let mut fx = fixture();
        for clip in &fx.spec.clips {
            fs::write(&clip.path, b"clip").unwrap();
        }
        fx.spec.overlays = vec![interval(10.0, 14.0)];
        fx.spec.background = Some(PathBuf::from("/music/bgm.mp3"));

        // snapshot the workspace as each pass starts
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        let dir = fx.workspace.path().to_path_buf();
        let runner = FakeRunner::new().fail_when(move |_| {
            record.borrow_mut().push(media_in(&dir));
            false
        });
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig {
            enabled: true,
            ..OverlayConfig::default()
        };
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        let video = assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(video.overlay_applied);
        assert!(video.background_applied);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], vec!["clip_000.mp4", "clip_001.mp4"]);
        assert_eq!(seen[1], vec!["joined.mp4"]);
        assert_eq!(seen[2], vec!["overlaid.mp4"]);
        assert_eq!(seen[3], vec!["voiced.mp4"]);
        assert!(media_in(fx.workspace.path()).is_empty());
        assert_eq!(fs::read(&fx.output).unwrap(), b"rendered");
    }

    #[test]
    fn test_joined_kept_for_mux_when_overlay_fails() {
        let mut fx = fixture();
        fx.spec.overlays = vec![interval(10.0, 14.0)];
        let joined = fx.workspace.file("joined.mp4");
        let check = joined.clone();
        let runner = FakeRunner::new().fail_when(move |cmd| {
            // the mux still finds its input
            if cmd.arguments().contains(&"-shortest".to_string()) {
                assert!(check.exists());
            }
            has_arg(cmd, "drawtext")
        });
        let probe = FakeProbe::new().with_rendered_duration(40.0);
        let overlay = OverlayConfig {
            enabled: true,
            ..OverlayConfig::default()
        };
        let assembler = TimelineAssembler::new(
            VideoEncoder::new(&ToolPaths::default()),
            &runner,
            &probe,
            &overlay,
            &fx.workspace,
        );

        assembler.assemble(&fx.spec, &fx.output).unwrap();
        assert!(!joined.exists());
        assert!(fx.output.exists());
    }
}
