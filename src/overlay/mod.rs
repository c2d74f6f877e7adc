pub mod format;

use async_trait::async_trait;
use log::warn;
use std::path::PathBuf;

// Plain-text on-screen display. Called at most once per second.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn update(&self, text: &str);
    async fn clear(&self);
}

// Text file that ffmpeg's drawtext filter re-reads (reload=1)
pub struct FileOverlay {
    path: PathBuf,
}

impl FileOverlay {
    pub async fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, "").await?;
        }
        Ok(Self { path })
    }

    async fn write(&self, text: &str) {
        if let Err(e) = tokio::fs::write(&self.path, text).await {
            warn!("Failed to write overlay {}: {}", self.path.display(), e);
        }
    }
}

#[async_trait]
impl DisplaySink for FileOverlay {
    async fn update(&self, text: &str) {
        self.write(&format::escape_drawtext(text)).await;
    }

    async fn clear(&self) {
        self.write("").await;
    }
}
