use crate::error::{MixError, Result};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

/// Per-run scratch directory for normalized clips, list files and prepared
/// audio. Removed when dropped, whether the run succeeded or not.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh scratch directory under `parent` (created if missing)
    pub fn create(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| MixError::io(parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix("clipmix-")
            .tempdir_in(parent)
            .map_err(|e| MixError::io(parent, e))?;
        tracing::debug!("workspace at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Normalized clip slot for the n-th selected asset
    pub fn clip_path(&self, index: usize) -> PathBuf {
        self.file(&format!("clip_{:03}.mp4", index))
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Delete an intermediate once the next pass has consumed it. Paths
    /// outside the workspace are left alone.
    pub fn discard(&self, path: &Path) {
        if !path.starts_with(self.path()) {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("could not remove {}: {}", path.display(), e),
        }
    }

    /// Write a text file (list files, filter scripts) into the workspace
    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.file(name);
        std::fs::write(&path, contents).map_err(|e| MixError::io(&path, e))?;
        Ok(path)
    }
}

/// A render target that only becomes visible once complete.
///
/// The renderer writes into a temp file next to the target; `commit` checks
/// it is non-empty and renames it over the target. Dropping an uncommitted
/// stage deletes the temp file.
#[derive(Debug)]
pub struct StagedOutput {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedOutput {
    pub fn new(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| MixError::io(&dir, e))?;

        let suffix = target
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let file = tempfile::Builder::new()
            .prefix(".staged-")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| MixError::io(&dir, e))?;

        Ok(Self {
            file,
            target: target.to_path_buf(),
        })
    }

    /// Where the renderer should write
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically replace the target with the staged file
    pub fn commit(self) -> Result<PathBuf> {
        let size = std::fs::metadata(self.file.path())
            .map(|m| m.len())
            .map_err(|e| MixError::io(self.file.path(), e))?;
        if size == 0 {
            return Err(MixError::RenderVerification {
                path: self.target,
                reason: "staged output is empty".to_string(),
            });
        }

        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| MixError::io(&target, e.error))?;
        Ok(target)
    }
}
