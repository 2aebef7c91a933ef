//! Bounded branding cache.
//!
//! Holds the last-known branding per video. Once the entry count exceeds the
//! limit, the least-recently-fetched entries are evicted. Recency only moves
//! when a video is the one that was actually requested, so hash-bucket
//! responses can refresh neighbouring videos without promoting them.

use crate::metrics;
use crate::model::{BrandingResult, CacheRecord};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Default maximum number of cached videos.
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Thread-safe branding cache with least-recently-used eviction.
#[derive(Clone, Debug)]
pub struct BrandingCache {
    entries: Arc<DashMap<String, CacheRecord>>,
    limit: usize,
}

impl BrandingCache {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            limit: limit.max(1),
        }
    }

    pub fn get(&self, video_id: &str) -> Option<CacheRecord> {
        self.entries.get(video_id).map(|entry| entry.clone())
    }

    /// Store `branding` for `video_id`.
    ///
    /// `fetched_video_id` is the video whose lookup produced this result. Only
    /// that entry gets a fresh `last_used`; others keep their previous value,
    /// or 0 when they were never cached.
    pub fn put(&self, video_id: &str, branding: BrandingResult, fetched_video_id: &str) {
        let now = chrono::Utc::now().timestamp_millis();
        let is_fetched = video_id == fetched_video_id;

        self.entries
            .entry(video_id.to_string())
            .and_modify(|record| {
                record.branding = branding.clone();
                if is_fetched {
                    record.last_used = now;
                }
            })
            .or_insert_with(|| CacheRecord {
                branding,
                last_used: if is_fetched { now } else { 0 },
            });

        self.evict_excess();
    }

    /// Drop least-recently-used entries until the cache is within its limit.
    pub fn evict_excess(&self) {
        let mut evicted = 0;
        while self.entries.len() > self.limit {
            // The iterator's shard guards must be released before removing.
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_used)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(video_id) => {
                    self.entries.remove(&video_id);
                    evicted += 1;
                }
                None => break,
            }
        }

        if evicted > 0 {
            debug!("Evicted {} branding cache entries", evicted);
            metrics::record_evictions(evicted);
        }
        metrics::set_cache_size(self.entries.len());
    }

    pub fn clear(&self, video_id: &str) {
        if self.entries.remove(video_id).is_some() {
            debug!("Cleared branding cache entry for {}", video_id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for BrandingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TitleResult;

    fn branding(title: &str) -> BrandingResult {
        BrandingResult {
            titles: vec![TitleResult::unvoted(title.to_string(), false)],
            ..Default::default()
        }
    }

    fn insert_with_last_used(cache: &BrandingCache, video_id: &str, last_used: i64) {
        cache.entries.insert(
            video_id.to_string(),
            CacheRecord {
                branding: branding(video_id),
                last_used,
            },
        );
    }

    #[test]
    fn put_then_get() {
        let cache = BrandingCache::default();
        cache.put("abc", branding("Title"), "abc");

        let record = cache.get("abc").unwrap();
        assert_eq!(record.branding.titles[0].title, "Title");
        assert!(record.last_used > 0);
    }

    #[test]
    fn miss_for_unknown_video() {
        let cache = BrandingCache::default();
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn neighbour_from_bucket_starts_with_zero_recency() {
        let cache = BrandingCache::default();
        cache.put("other", branding("Other"), "requested");

        assert_eq!(cache.get("other").unwrap().last_used, 0);
    }

    #[test]
    fn neighbour_update_preserves_recency() {
        let cache = BrandingCache::default();
        insert_with_last_used(&cache, "other", 1234);

        cache.put("other", branding("Updated"), "requested");

        let record = cache.get("other").unwrap();
        assert_eq!(record.last_used, 1234);
        assert_eq!(record.branding.titles[0].title, "Updated");
    }

    #[test]
    fn fetched_video_recency_is_refreshed() {
        let cache = BrandingCache::default();
        insert_with_last_used(&cache, "abc", 1);

        cache.put("abc", branding("New"), "abc");

        assert!(cache.get("abc").unwrap().last_used > 1);
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let cache = BrandingCache::new(DEFAULT_CACHE_LIMIT);
        for i in 0..DEFAULT_CACHE_LIMIT {
            // Entry 500 is the oldest.
            let last_used = if i == 500 { 1 } else { 10_000 + i as i64 };
            insert_with_last_used(&cache, &format!("video-{i}"), last_used);
        }
        assert_eq!(cache.len(), DEFAULT_CACHE_LIMIT);

        cache.put("newcomer", branding("New"), "newcomer");

        assert_eq!(cache.len(), DEFAULT_CACHE_LIMIT);
        assert!(cache.get("video-500").is_none(), "Oldest entry should go");
        assert!(cache.get("newcomer").is_some());
        assert!(cache.get("video-0").is_some());
    }

    #[test]
    fn eviction_can_remove_unpromoted_neighbour() {
        let cache = BrandingCache::new(2);
        cache.put("a", branding("A"), "a");
        cache.put("b", branding("B"), "b");

        // Neighbour from a bucket response gets recency 0 and is evicted first.
        cache.put("c", branding("C"), "a");

        assert_eq!(cache.len(), 2);
        assert!(cache.get("c").is_none());
    }

    #[test]
    fn clear_removes_entry() {
        let cache = BrandingCache::default();
        cache.put("abc", branding("Title"), "abc");
        cache.clear("abc");
        assert!(cache.get("abc").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        let cache = BrandingCache::new(0);
        assert_eq!(cache.limit(), 1);
    }
}
