//! Seams to the rest of the extension.
//!
//! The client only depends on these traits. The in-memory implementations
//! back the command-line tool and the tests.

use crate::cache::DEFAULT_CACHE_LIMIT;
use crate::error::Result;
use crate::model::UnsubmittedBranding;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::debug;

/// Locally staged branding edits that were not submitted yet.
pub trait UnsubmittedStore: Send + Sync {
    fn get(&self, video_id: &str) -> Option<UnsubmittedBranding>;
}

/// Store of thumbnails already rendered by the thumbnail cache.
#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    /// Whether an image for this exact frame is already available locally.
    async fn has_thumbnail(&self, video_id: &str, timestamp: f64) -> bool;

    /// Keep a rendered image so it can be drawn without re-rendering the frame.
    async fn install(&self, video_id: &str, timestamp: f64, image: Vec<u8>) -> Result<()>;
}

/// Asks the UI to redraw branding for a video after new data arrived.
#[async_trait]
pub trait BrandingRefresher: Send + Sync {
    async fn refresh(&self, video_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryUnsubmittedStore {
    edits: DashMap<String, UnsubmittedBranding>,
}

impl MemoryUnsubmittedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, video_id: &str, edits: UnsubmittedBranding) {
        self.edits.insert(video_id.to_string(), edits);
    }

    pub fn remove(&self, video_id: &str) {
        self.edits.remove(video_id);
    }
}

impl UnsubmittedStore for MemoryUnsubmittedStore {
    fn get(&self, video_id: &str) -> Option<UnsubmittedBranding> {
        self.edits.get(video_id).map(|e| e.clone())
    }
}

#[derive(Debug)]
struct StoredFrame {
    timestamp: f64,
    image: Vec<u8>,
    last_used: u64,
}

/// Rendered thumbnails kept in memory, one frame per video.
///
/// Installing a frame replaces the video's previous one. Once more than
/// `limit` videos are held, the least-recently-used image is dropped.
#[derive(Debug)]
pub struct MemoryThumbnailStore {
    frames: DashMap<String, StoredFrame>,
    limit: usize,
    clock: AtomicU64,
}

impl MemoryThumbnailStore {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_CACHE_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            frames: DashMap::new(),
            limit: limit.max(1),
            clock: AtomicU64::new(0),
        }
    }

    pub fn image(&self, video_id: &str, timestamp: f64) -> Option<Vec<u8>> {
        self.frames
            .get(video_id)
            .filter(|frame| frame.timestamp == timestamp)
            .map(|frame| frame.image.clone())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_excess(&self) {
        while self.frames.len() > self.limit {
            let oldest = self
                .frames
                .iter()
                .min_by_key(|frame| frame.last_used)
                .map(|frame| frame.key().clone());

            match oldest {
                Some(video_id) => {
                    debug!("Dropping rendered thumbnail for {}", video_id);
                    self.frames.remove(&video_id);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryThumbnailStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThumbnailStore for MemoryThumbnailStore {
    async fn has_thumbnail(&self, video_id: &str, timestamp: f64) -> bool {
        let Some(mut frame) = self.frames.get_mut(video_id) else {
            return false;
        };
        if frame.timestamp != timestamp {
            return false;
        }
        frame.last_used = self.tick();
        true
    }

    async fn install(&self, video_id: &str, timestamp: f64, image: Vec<u8>) -> Result<()> {
        let frame = StoredFrame {
            timestamp,
            image,
            last_used: self.tick(),
        };
        self.frames.insert(video_id.to_string(), frame);
        self.evict_excess();
        Ok(())
    }
}

/// Refresher for headless use. It only counts calls, so callers can observe
/// when a redraw would have happened.
#[derive(Debug, Default, Clone)]
pub struct CountingRefresher {
    calls: Arc<AtomicUsize>,
}

impl CountingRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrandingRefresher for CountingRefresher {
    async fn refresh(&self, _video_id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnsubmittedTitle;

    #[tokio::test]
    async fn thumbnail_store_matches_exact_frame() {
        let store = MemoryThumbnailStore::new();
        store.install("vid", 12.5, vec![1]).await.unwrap();

        assert!(store.has_thumbnail("vid", 12.5).await);
        assert!(!store.has_thumbnail("vid", 12.0).await);
        assert!(!store.has_thumbnail("other", 12.5).await);
    }

    #[tokio::test]
    async fn reinstall_replaces_image() {
        let store = MemoryThumbnailStore::new();
        store.install("vid", 1.0, vec![1]).await.unwrap();
        store.install("vid", 1.0, vec![2]).await.unwrap();

        assert_eq!(store.image("vid", 1.0), Some(vec![2]));
    }

    #[tokio::test]
    async fn new_frame_replaces_previous_frame() {
        let store = MemoryThumbnailStore::new();
        store.install("vid", 1.0, vec![1]).await.unwrap();
        store.install("vid", 2.0, vec![2]).await.unwrap();

        assert!(!store.has_thumbnail("vid", 1.0).await);
        assert_eq!(store.image("vid", 2.0), Some(vec![2]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn thumbnail_store_evicts_least_recently_used_video() {
        let store = MemoryThumbnailStore::with_limit(2);
        store.install("a", 1.0, vec![1]).await.unwrap();
        store.install("b", 1.0, vec![2]).await.unwrap();

        // Touching "a" leaves "b" as the oldest.
        assert!(store.has_thumbnail("a", 1.0).await);
        store.install("c", 1.0, vec![3]).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.image("a", 1.0).is_some());
        assert!(store.image("b", 1.0).is_none());
        assert!(store.image("c", 1.0).is_some());
    }

    #[test]
    fn unsubmitted_store_round_trip() {
        let store = MemoryUnsubmittedStore::new();
        let edits = UnsubmittedBranding {
            titles: vec![UnsubmittedTitle {
                title: "Mine".to_string(),
                selected: true,
            }],
            thumbnails: vec![],
        };
        store.set("vid", edits.clone());
        assert_eq!(store.get("vid"), Some(edits));

        store.remove("vid");
        assert_eq!(store.get("vid"), None);
    }

    #[tokio::test]
    async fn refresher_counts_calls() {
        let refresher = CountingRefresher::new();
        refresher.refresh("vid").await.unwrap();
        refresher.refresh("vid").await.unwrap();
        assert_eq!(refresher.calls(), 2);
    }
}
