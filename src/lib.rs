pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod naming;
pub mod overlay;
pub mod parser;
pub mod renderer;
pub mod script;
pub mod sequencer;
pub mod templates;
pub mod workspace;

pub use assets::{MediaAsset, MediaPool};
pub use config::AppConfig;
pub use error::{MixError, ProbeError, RenderError};
pub use overlay::{OverlayConfig, OverlayPlanner};
pub use parser::ScriptParser;
pub use renderer::{RenderEngine, TransitionComposer};
pub use script::MixScript;
pub use sequencer::{SceneSequencer, SceneTimeline};
