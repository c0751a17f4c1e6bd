use super::command::seconds;
use super::normalizer::NormalizedClip;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::fmt::Write;
use std::path::Path;

/// Transition effects the xfade filter understands
pub const XFADE_STYLES: &[&str] = &[
    "fade",
    "fadeblack",
    "fadewhite",
    "dissolve",
    "distance",
    "wipeleft",
    "wiperight",
    "wipeup",
    "wipedown",
    "slideleft",
    "slideright",
    "slideup",
    "slidedown",
    "smoothleft",
    "smoothright",
    "smoothup",
    "smoothdown",
    "circlecrop",
    "rectcrop",
    "circleopen",
    "circleclose",
    "vertopen",
    "vertclose",
    "horzopen",
    "horzclose",
    "radial",
    "pixelize",
    "diagtl",
    "diagtr",
    "diagbl",
    "diagbr",
    "hlslice",
    "hrslice",
    "vuslice",
    "vdslice",
    "zoomin",
];

/// Label of the composed stream in a filter graph
pub const OUTPUT_LABEL: &str = "video";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    #[default]
    Xfade,
}

impl TransitionKind {
    fn filter_name(&self) -> &'static str {
        match self {
            TransitionKind::Xfade => "xfade",
        }
    }
}

/// Either one named effect for every boundary, or a fresh random pick per
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum TransitionStyle {
    Random,
    Named(String),
}

impl From<String> for TransitionStyle {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("random") {
            TransitionStyle::Random
        } else {
            TransitionStyle::Named(value)
        }
    }
}

impl Default for TransitionStyle {
    fn default() -> Self {
        TransitionStyle::Named("fade".to_string())
    }
}

impl TransitionStyle {
    fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        match self {
            TransitionStyle::Named(name) => name.clone(),
            TransitionStyle::Random => XFADE_STYLES
                .choose(rng)
                .copied()
                .unwrap_or("fade")
                .to_string(),
        }
    }
}

/// Transition shared by every boundary of one run
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSpec {
    pub kind: TransitionKind,
    pub style: TransitionStyle,
    pub duration: f64,
}

impl TransitionSpec {
    pub fn new(style: TransitionStyle, duration: f64) -> Self {
        Self {
            kind: TransitionKind::Xfade,
            style,
            duration,
        }
    }
}

/// How the normalized clips are joined into one track
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    /// Body of a concat-demuxer list file; clips are stream-copied
    Concat { list: String, duration: f64 },
    /// `-filter_complex` graph over inputs `0..n` producing `output_label`
    Graph {
        graph: String,
        output_label: String,
        duration: f64,
    },
}

impl Composition {
    /// Length of the joined track in seconds
    pub fn duration(&self) -> f64 {
        match self {
            Composition::Concat { duration, .. } | Composition::Graph { duration, .. } => *duration,
        }
    }
}

/// Builds the join description for a scene-ordered list of clips
pub struct TransitionComposer;

impl TransitionComposer {
    pub fn compose<R: Rng + ?Sized>(
        clips: &[NormalizedClip],
        transition: Option<&TransitionSpec>,
        rng: &mut R,
    ) -> Composition {
        let durations: Vec<f64> = clips.iter().map(|c| c.duration).collect();
        match transition {
            Some(spec) if clips.len() > 1 => Self::graph(&durations, spec, rng),
            _ => Composition::Concat {
                list: concat_list(clips),
                duration: durations.iter().sum(),
            },
        }
    }

    /// Chain clips pairwise with xfade. Boundary k starts at
    /// `d_0 + ... + d_k - (k + 1) * t`.
    fn graph<R: Rng + ?Sized>(durations: &[f64], spec: &TransitionSpec, rng: &mut R) -> Composition {
        let shortest = durations.iter().copied().fold(f64::INFINITY, f64::min);
        let overlap = if spec.duration > shortest {
            tracing::warn!(
                "transition of {:.2}s exceeds shortest clip, clamped to {:.2}s",
                spec.duration,
                shortest
            );
            shortest
        } else {
            spec.duration
        };

        let mut filters = Vec::with_capacity(durations.len() - 1);
        let mut prev_label = "[0:v]".to_string();
        let mut offset = 0.0;

        for (i, duration) in durations.iter().enumerate().take(durations.len() - 1) {
            offset += duration - overlap;
            let next = i + 1;
            let out_label = if next == durations.len() - 1 {
                format!("[{}]", OUTPUT_LABEL)
            } else {
                format!("[v{}]", next)
            };

            filters.push(format!(
                "{prev_label}[{next}:v]{}=transition={}:duration={}:offset={}{out_label}",
                spec.kind.filter_name(),
                spec.style.resolve(rng),
                seconds(overlap),
                seconds(offset),
            ));
            prev_label = out_label;
        }

        let total: f64 = durations.iter().sum();
        Composition::Graph {
            graph: filters.join(";"),
            output_label: OUTPUT_LABEL.to_string(),
            duration: total - overlap * (durations.len() - 1) as f64,
        }
    }
}

pub fn concat_list(clips: &[NormalizedClip]) -> String {
    list_file(clips.iter().map(|c| c.path.as_path()))
}

/// `file '<path>'` lines, single quotes escaped the way the concat demuxer
/// expects
pub fn list_file<'p>(paths: impl IntoIterator<Item = &'p Path>) -> String {
    let mut list = String::new();
    for path in paths {
        let path = path.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{}'", path);
    }
    list
}
