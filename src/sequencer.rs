use crate::assets::{Candidate, MediaAsset, MediaKind, MediaPool};
use crate::error::{MixError, Result};
use crate::renderer::{MediaProbe, SegmentBounds, TransitionSpec};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

/// Upper bound on repeat-fill iterations in the shared-audio mode
pub const MAX_REPEATS: usize = 20;

/// Below this share of the target the shared-audio mode starts repeating
pub const REPEAT_THRESHOLD: f64 = 0.8;

/// How a scene's target duration is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    /// The scene has its own voice track; the pool must cover it
    AudioDriven,
    /// The scene covers an equal slice of one shared narration
    FixedAudio,
}

/// Ordered selection for one scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneTimeline {
    pub ordered_assets: Vec<MediaAsset>,
    pub accumulated_duration: f64,
    pub target_duration: f64,
    pub head_is_video: bool,
    /// Whole seconds of silence the scene's voice needs to cover the video
    pub audio_padding: Option<u32>,
    /// Assets appended by repeat-fill
    pub repeats: usize,
}

impl fmt::Display for SceneTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} assets, {:.2}s of {:.2}s",
            self.ordered_assets.len(),
            self.accumulated_duration,
            self.target_duration
        )?;
        if self.repeats > 0 {
            write!(f, ", {} repeats", self.repeats)?;
        }
        if let Some(pad) = self.audio_padding {
            write!(f, ", voice padded {}s", pad)?;
        }
        Ok(())
    }
}

/// Picks and orders pool assets until their overlap-adjusted duration
/// reaches a target.
pub struct SceneSequencer<'a> {
    bounds: SegmentBounds,
    overlap: f64,
    probe: &'a dyn MediaProbe,
}

impl<'a> SceneSequencer<'a> {
    pub fn new(
        bounds: SegmentBounds,
        transition: Option<&TransitionSpec>,
        probe: &'a dyn MediaProbe,
    ) -> Self {
        Self {
            bounds,
            overlap: transition.map_or(0.0, |t| t.duration),
            probe,
        }
    }

    pub fn sequence<R: Rng + ?Sized>(
        &self,
        pool: &MediaPool,
        target: f64,
        is_head: bool,
        mode: SequenceMode,
        rng: &mut R,
    ) -> Result<SceneTimeline> {
        let mut candidates = pool.scan()?;
        if candidates.is_empty() {
            return Err(insufficient(pool, 0.0, target));
        }

        candidates.shuffle(rng);
        let head = self.pick_head(&mut candidates, rng);

        let mut ordered: Vec<MediaAsset> = Vec::new();
        let mut accumulated = 0.0;
        let probed = head
            .into_iter()
            .map(Ok)
            .chain(candidates.iter().map(|c| MediaAsset::probe(c, self.probe)));

        for result in probed {
            let asset = match result {
                Ok(asset) => asset,
                Err(e) => {
                    tracing::warn!("skipping asset: {}", e);
                    continue;
                }
            };

            let duration = self.bounds.effective_duration(&asset);
            let contribution = if ordered.is_empty() && is_head {
                duration
            } else {
                duration - self.overlap
            };
            accumulated += contribution;
            tracing::debug!(
                "picked {} ({:.2}s), total {:.2}s of {:.2}s",
                asset.path.display(),
                contribution,
                accumulated,
                target
            );
            ordered.push(asset);

            if accumulated >= target {
                break;
            }
        }

        if ordered.is_empty() {
            return Err(insufficient(pool, 0.0, target));
        }

        let mut timeline = SceneTimeline {
            head_is_video: ordered[0].is_video(),
            ordered_assets: ordered,
            accumulated_duration: accumulated,
            target_duration: target,
            audio_padding: None,
            repeats: 0,
        };

        match mode {
            SequenceMode::AudioDriven => {
                if timeline.accumulated_duration < target {
                    return Err(insufficient(pool, timeline.accumulated_duration, target));
                }
                let pad = (timeline.accumulated_duration - target).ceil();
                if pad > 0.0 {
                    timeline.audio_padding = Some(pad as u32);
                }
            }
            SequenceMode::FixedAudio => {
                if timeline.accumulated_duration < target * REPEAT_THRESHOLD {
                    tracing::warn!(
                        "pool {} only covers {:.2}s of {:.2}s, repeating last asset",
                        pool.dir().display(),
                        timeline.accumulated_duration,
                        target
                    );
                    self.repeat_fill(&mut timeline);
                }
            }
        }

        Ok(timeline)
    }

    /// Move a random readable video to the front. Unreadable head candidates
    /// are dropped from the list and another video is tried.
    fn pick_head<R: Rng + ?Sized>(
        &self,
        candidates: &mut Vec<Candidate>,
        rng: &mut R,
    ) -> Option<MediaAsset> {
        loop {
            let videos: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind == MediaKind::Video)
                .map(|(i, _)| i)
                .collect();
            let index = *videos.choose(rng)?;
            let candidate = candidates.remove(index);

            match MediaAsset::probe(&candidate, self.probe) {
                Ok(asset) => return Some(asset),
                Err(e) => tracing::warn!("head candidate unusable: {}", e),
            }
        }
    }

    fn repeat_fill(&self, timeline: &mut SceneTimeline) {
        let Some(last) = timeline.ordered_assets.last().cloned() else {
            return;
        };
        // a repeat is never the head, so the transition eats into it
        let step = self.bounds.effective_duration(&last) - self.overlap;
        if step <= 0.0 {
            tracing::warn!(
                "{} is no longer than the {:.2}s transition, cannot repeat-fill",
                last.path.display(),
                self.overlap
            );
            return;
        }

        while timeline.accumulated_duration < timeline.target_duration {
            if timeline.repeats >= MAX_REPEATS {
                tracing::warn!("repeat cap of {} reached", MAX_REPEATS);
                break;
            }
            let remaining = timeline.target_duration - timeline.accumulated_duration;
            timeline.accumulated_duration += step.min(remaining);
            timeline.ordered_assets.push(last.clone());
            timeline.repeats += 1;
        }
    }
}

fn insufficient(pool: &MediaPool, accumulated: f64, target: f64) -> MixError {
    MixError::InsufficientMedia {
        dir: pool.dir().to_path_buf(),
        accumulated,
        target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::FakeProbe;
    use crate::renderer::TransitionStyle;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"data").unwrap();
        path
    }

    fn bounds() -> SegmentBounds {
        SegmentBounds::new(5.0, 8.0, 5.0)
    }

    #[test]
    fn test_three_images_cover_twelve_seconds() {
        let dir = TempDir::new().unwrap();
        for name in ["a.jpg", "b.png", "c.jpeg"] {
            touch(dir.path(), name);
        }
        let probe = FakeProbe::new();
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(3);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 12.0, true, SequenceMode::AudioDriven, &mut rng)
            .unwrap();

        assert_eq!(timeline.ordered_assets.len(), 3);
        assert_eq!(timeline.accumulated_duration, 15.0);
        assert!(!timeline.head_is_video);
        assert_eq!(timeline.audio_padding, Some(3));
    }

    #[test]
    fn test_video_always_leads() {
        let dir = TempDir::new().unwrap();
        let mut probe = FakeProbe::new();
        for name in ["a.jpg", "b.jpg", "c.png", "d.png"] {
            touch(dir.path(), name);
        }
        for name in ["v1.mp4", "v2.mov"] {
            probe = probe.with_duration(touch(dir.path(), name), 6.0);
        }
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let pool = MediaPool::new(dir.path());

        for seed in 0..25 {
            let mut rng = StdRng::seed_from_u64(seed);
            let timeline = sequencer
                .sequence(&pool, 10.0, false, SequenceMode::AudioDriven, &mut rng)
                .unwrap();
            assert!(timeline.head_is_video, "seed {seed}");
            assert!(timeline.ordered_assets[0].is_video());
        }
    }

    #[test]
    fn test_unreadable_head_candidate_is_retried() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "broken.mp4");
        let good = touch(dir.path(), "good.mp4");
        touch(dir.path(), "still.png");
        let probe = FakeProbe::new().with_duration(&good, 6.0);
        let sequencer = SceneSequencer::new(bounds(), None, &probe);

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let timeline = sequencer
                .sequence(&MediaPool::new(dir.path()), 11.0, true, SequenceMode::AudioDriven, &mut rng)
                .unwrap();
            assert_eq!(timeline.ordered_assets[0].path, good);
            assert!(timeline.ordered_assets.iter().all(|a| !a.path.ends_with("broken.mp4")));
        }
    }

    #[test]
    fn test_overlap_accounting() {
        let dir = TempDir::new().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            touch(dir.path(), name);
        }
        let probe = FakeProbe::new();
        let fade = TransitionSpec::new(TransitionStyle::Named("fade".into()), 1.0);
        let sequencer = SceneSequencer::new(bounds(), Some(&fade), &probe);
        let pool = MediaPool::new(dir.path());

        let mut rng = StdRng::seed_from_u64(0);
        let head = sequencer
            .sequence(&pool, 12.0, true, SequenceMode::AudioDriven, &mut rng)
            .unwrap();
        assert_eq!(head.accumulated_duration, 13.0);
        assert_eq!(head.ordered_assets.len(), 3);

        let later = sequencer
            .sequence(&pool, 12.0, false, SequenceMode::AudioDriven, &mut rng)
            .unwrap();
        assert_eq!(later.accumulated_duration, 12.0);
        assert_eq!(later.audio_padding, None);
    }

    #[test]
    fn test_stops_once_target_reached() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            touch(dir.path(), &format!("{i}.jpg"));
        }
        let probe = FakeProbe::new();
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(9);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 9.0, true, SequenceMode::AudioDriven, &mut rng)
            .unwrap();
        assert_eq!(timeline.ordered_assets.len(), 2);
    }

    #[test]
    fn test_empty_pool_is_insufficient() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.txt");
        let probe = FakeProbe::new();
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        for mode in [SequenceMode::AudioDriven, SequenceMode::FixedAudio] {
            let err = sequencer
                .sequence(&MediaPool::new(dir.path()), 5.0, true, mode, &mut rng)
                .unwrap_err();
            assert!(matches!(err, MixError::InsufficientMedia { .. }));
        }
    }

    #[test]
    fn test_all_unreadable_is_insufficient() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.mp4");
        touch(dir.path(), "b.mov");
        let probe = FakeProbe::new();
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let err = sequencer
            .sequence(&MediaPool::new(dir.path()), 5.0, true, SequenceMode::FixedAudio, &mut rng)
            .unwrap_err();
        assert!(matches!(err, MixError::InsufficientMedia { .. }));
    }

    #[test]
    fn test_audio_driven_shortfall_is_reported() {
        let dir = TempDir::new().unwrap();
        let clip = touch(dir.path(), "only.mp4");
        let probe = FakeProbe::new().with_duration(&clip, 6.0);
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        match sequencer
            .sequence(&MediaPool::new(dir.path()), 10.0, true, SequenceMode::AudioDriven, &mut rng)
            .unwrap_err()
        {
            MixError::InsufficientMedia {
                accumulated,
                target,
                ..
            } => {
                assert_eq!(accumulated, 6.0);
                assert_eq!(target, 10.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fixed_audio_repeats_last_clip() {
        let dir = TempDir::new().unwrap();
        let clip = touch(dir.path(), "only.mp4");
        let probe = FakeProbe::new().with_duration(&clip, 6.0);
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 10.0, true, SequenceMode::FixedAudio, &mut rng)
            .unwrap();
        assert_eq!(timeline.repeats, 1);
        assert_eq!(timeline.ordered_assets.len(), 2);
        assert_eq!(timeline.ordered_assets[1].path, clip);
        assert_eq!(timeline.accumulated_duration, 10.0);
    }

    #[test]
    fn test_fixed_audio_within_threshold_is_left_short() {
        let dir = TempDir::new().unwrap();
        let clip = touch(dir.path(), "only.mp4");
        let probe = FakeProbe::new().with_duration(&clip, 7.0);
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 8.5, true, SequenceMode::FixedAudio, &mut rng)
            .unwrap();
        assert_eq!(timeline.repeats, 0);
        assert_eq!(timeline.accumulated_duration, 7.0);
    }

    #[test]
    fn test_repeat_fill_is_capped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "still.png");
        let probe = FakeProbe::new();
        let sequencer = SceneSequencer::new(bounds(), None, &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 1000.0, true, SequenceMode::FixedAudio, &mut rng)
            .unwrap();
        assert_eq!(timeline.repeats, MAX_REPEATS);
        assert_eq!(timeline.ordered_assets.len(), MAX_REPEATS + 1);
        assert_eq!(timeline.accumulated_duration, 105.0);
    }

    #[test]
    fn test_repeat_fill_subtracts_transition() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "still.jpg");
        let probe = FakeProbe::new();
        let fade = TransitionSpec::new(TransitionStyle::Named("fade".into()), 1.0);
        let sequencer = SceneSequencer::new(bounds(), Some(&fade), &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 18.0, false, SequenceMode::FixedAudio, &mut rng)
            .unwrap();
        assert_eq!(timeline.repeats, 4);
        assert_eq!(timeline.accumulated_duration, 18.0);

        // every clip after the first overlaps its predecessor by the fade
        let clips = timeline.ordered_assets.len() as f64;
        let composed = 5.0 * clips - (clips - 1.0) * 1.0;
        assert!(composed >= timeline.target_duration, "composed {composed}s");
    }

    #[test]
    fn test_repeat_fill_skips_clip_swallowed_by_transition() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "still.jpg");
        let probe = FakeProbe::new();
        let long = TransitionSpec::new(TransitionStyle::Named("fade".into()), 5.0);
        let sequencer = SceneSequencer::new(bounds(), Some(&long), &probe);
        let mut rng = StdRng::seed_from_u64(0);

        let timeline = sequencer
            .sequence(&MediaPool::new(dir.path()), 10.0, false, SequenceMode::FixedAudio, &mut rng)
            .unwrap();
        assert_eq!(timeline.repeats, 0);
        assert_eq!(timeline.ordered_assets.len(), 1);
    }

    #[test]
    fn test_timeline_display() {
        let timeline = SceneTimeline {
            ordered_assets: Vec::new(),
            accumulated_duration: 12.0,
            target_duration: 10.0,
            head_is_video: false,
            audio_padding: Some(2),
            repeats: 0,
        };
        assert_eq!(timeline.to_string(), "0 assets, 12.00s of 10.00s, voice padded 2s");
    }
}
