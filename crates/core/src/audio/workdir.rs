use crate::audio::{AudioClip, AudioError};
use std::path::{Path, PathBuf};

/// Scratch directory for recordings and uploads. Removed when dropped, so
/// nothing outlives the session.
#[derive(Debug)]
pub struct WorkDir {
    dir: tempfile::TempDir,
}

impl WorkDir {
    pub fn new() -> Result<Self, AudioError> {
        let dir = tempfile::Builder::new()
            .prefix("voice-assistant-")
            .tempdir()?;
        tracing::debug!(path = %dir.path().display(), "working directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `clip` as `<stem>.<ext>`, replacing any earlier file of that name.
    pub async fn write_clip(&self, stem: &str, clip: &AudioClip) -> Result<PathBuf, AudioError> {
        let path = self.dir.path().join(clip.file_name(stem));
        tokio::fs::write(&path, &clip.bytes).await?;
        Ok(path)
    }
}
