pub mod media;

use crate::error::CatalogError;
use crate::models::ContentItem;
use async_trait::async_trait;
use log::debug;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;

// Source of playable content. Only enumeration and durations are needed.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    async fn list(&self) -> Result<Vec<ContentItem>, CatalogError>;

    // `None` when the duration cannot be determined.
    async fn duration(&self, item: &ContentItem) -> Option<Duration>;
}

// Flat folder of .mp4 files, filled and pruned by an external harvester
pub struct DirectoryCatalog {
    folder: PathBuf,
    ffprobe_bin: String,
}

impl DirectoryCatalog {
    pub fn new(folder: impl Into<PathBuf>, ffprobe_bin: &str) -> Self {
        Self {
            folder: folder.into(),
            ffprobe_bin: ffprobe_bin.to_string(),
        }
    }
}

#[async_trait]
impl ContentCatalog for DirectoryCatalog {
    async fn list(&self) -> Result<Vec<ContentItem>, CatalogError> {
        let io_err = |source| CatalogError::Io {
            folder: self.folder.display().to_string(),
            source,
        };

        if !tokio::fs::try_exists(&self.folder).await.unwrap_or(false) {
            debug!("Content folder {} does not exist", self.folder.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.folder).await.map_err(io_err)?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let is_mp4 = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("mp4"))
                .unwrap_or(false);
            if is_mp4 && path.is_file() {
                items.push(ContentItem::new(path));
            }
        }

        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }

    async fn duration(&self, item: &ContentItem) -> Option<Duration> {
        media::media_duration(&self.ffprobe_bin, item.path()).await
    }
}

// Up to `count` random items, never including `exclude`.
pub fn select_random_choices(
    items: &[ContentItem],
    count: usize,
    exclude: Option<&ContentItem>,
) -> Vec<ContentItem> {
    let available: Vec<&ContentItem> = items
        .iter()
        .filter(|item| Some(*item) != exclude)
        .collect();

    let mut rng = rand::thread_rng();
    if available.len() <= count {
        // all of them, still in random order so letters are not predictable
        let mut all: Vec<ContentItem> = available.into_iter().cloned().collect();
        all.shuffle(&mut rng);
        return all;
    }

    available
        .choose_multiple(&mut rng, count)
        .map(|item| (*item).clone())
        .collect()
}

pub fn pick_random(items: &[ContentItem]) -> Option<ContentItem> {
    items.choose(&mut rand::thread_rng()).cloned()
}
