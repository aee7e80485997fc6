//! Hand-off seams for a terminal: artifacts go to a directory, deep links
//! are printed instead of opened.

use std::path::PathBuf;

use async_trait::async_trait;
use certificate_render::{DownloadSink, HandoffError, LinkOpener, RenderedArtifact, SavedArtifact};
use tracing::info;

pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait(?Send)]
impl DownloadSink for DirectoryDownloads {
    async fn save(
        &self,
        artifact: &RenderedArtifact,
        filename: &str,
    ) -> Result<SavedArtifact, HandoffError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HandoffError::Download(format!("{}: {}", self.dir.display(), e)))?;
        let path = self.dir.join(filename);
        tokio::fs::write(&path, &artifact.bytes)
            .await
            .map_err(|e| HandoffError::Download(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), bytes = artifact.len(), "artifact written");
        Ok(SavedArtifact {
            location: path.display().to_string(),
            handle: None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrintedLinks;

impl LinkOpener for PrintedLinks {
    fn open(&self, url: &str) -> Result<(), HandoffError> {
        println!("{}", url);
        Ok(())
    }
}
