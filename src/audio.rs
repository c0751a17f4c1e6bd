use crate::error::{MixError, Result};
use crate::renderer::compositor::list_file;
use crate::renderer::{CommandRunner, VideoEncoder};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};

/// Equal share of a shared narration for each of `scenes` scenes
pub fn scene_targets(total: f64, scenes: usize) -> Vec<f64> {
    if scenes == 0 {
        return Vec::new();
    }
    vec![total / scenes as f64; scenes]
}

/// Converts per-scene voice files into uniform segments inside the
/// workspace and joins them into one narration track.
pub struct VoicePreparer<'a> {
    encoder: &'a VideoEncoder,
    runner: &'a dyn CommandRunner,
    workspace: &'a Workspace,
}

impl<'a> VoicePreparer<'a> {
    pub fn new(encoder: &'a VideoEncoder, runner: &'a dyn CommandRunner, workspace: &'a Workspace) -> Self {
        Self {
            encoder,
            runner,
            workspace,
        }
    }

    /// Copy scene `index`'s voice into the workspace, padded with `pad`
    /// seconds of silence. The source file is never touched.
    pub fn segment(&self, index: usize, voice: &Path, pad: Option<u32>) -> Result<PathBuf> {
        let output = self.workspace.file(&format!("voice_{:03}.wav", index));
        if let Some(pad) = pad {
            tracing::info!("padding voice of scene {} by {}s", index + 1, pad);
        }
        self.runner.run(
            &self
                .encoder
                .prepare_voice(voice, pad.map(f64::from), &output),
        )?;
        Ok(output)
    }

    /// Join prepared segments in order. The joined segments are deleted.
    pub fn join(&self, segments: &[PathBuf]) -> Result<PathBuf> {
        match segments {
            [] => Err(MixError::Script("no voice segments to join".to_string())),
            [single] => Ok(single.clone()),
            _ => {
                let list = list_file(segments.iter().map(PathBuf::as_path));
                let list_path = self.workspace.write("voice.txt", &list)?;
                let output = self.workspace.file("voice.wav");
                self.runner
                    .run(&self.encoder.concat_audio(&list_path, &output))?;
                for segment in segments {
                    self.workspace.discard(segment);
                }
                Ok(output)
            }
        }
    }
}
