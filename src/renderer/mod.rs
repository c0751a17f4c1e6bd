pub mod command;
pub mod compositor;
pub mod encoder;
pub mod engine;
pub mod normalizer;
pub mod probe;
pub mod runner;
pub mod timeline;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{RenderCommand, ToolPaths};
pub use compositor::{Composition, TransitionComposer, TransitionKind, TransitionSpec, TransitionStyle};
pub use encoder::VideoEncoder;
pub use engine::{Narration, RenderEngine, RenderPlan, ScenePlan};
pub use normalizer::{ClipNormalizer, NormalizedClip, SegmentBounds, VideoTarget};
pub use probe::{FfprobeProbe, MediaProbe};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use timeline::{AssembledVideo, RenderSpec, TimelineAssembler};
pub use tokio_util::sync::CancellationToken;
