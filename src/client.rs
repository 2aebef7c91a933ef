//! Branding lookups with caching, request coalescing and a race between the
//! branding server and the thumbnail cache.
//!
//! A cache miss starts two background fetches for the video. Readers wait for
//! the first useful answer, or for the configured timeout, and then read the
//! cache. The fetches are never cancelled: a reader that timed out leaves them
//! running so they still warm the cache for the next read.

use crate::api::{self, ThumbnailRequest, ThumbnailResponse};
use crate::cache::BrandingCache;
use crate::coalescer::{Join, PendingFetch, RequestCoalescer};
use crate::collaborators::{
    BrandingRefresher, CountingRefresher, MemoryThumbnailStore, MemoryUnsubmittedStore,
    ThumbnailStore, UnsubmittedStore,
};
use crate::config::Config;
use crate::error::Result;
use crate::metrics;
use crate::model::{
    BrandingResult, BrandingSubmission, CacheRecord, ThumbnailResult, ThumbnailSubmission,
    TitleResult, TitleSubmission,
};
use crate::race::FetchRace;
use crate::thumbnail_requests::{Begin, ThumbnailRequestTracker};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::{Client, Response};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct Inner {
    config: Config,
    http_client: Client,
    cache: BrandingCache,
    requests: RequestCoalescer,
    thumbnail_requests: ThumbnailRequestTracker,
    unsubmitted: Arc<dyn UnsubmittedStore>,
    thumbnails: Arc<dyn ThumbnailStore>,
    refresher: Arc<dyn BrandingRefresher>,
}

/// Entry point for reading and submitting branding.
///
/// Cheap to clone; clones share the cache and in-flight state. Build one per
/// session.
#[derive(Clone)]
pub struct BrandingClient {
    inner: Arc<Inner>,
}

impl BrandingClient {
    /// Create a client with in-memory collaborators.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let http_client = Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()?;

        let cache = BrandingCache::new(config.cache_limit);
        let thumbnails = Arc::new(MemoryThumbnailStore::with_limit(config.cache_limit));

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http_client,
                cache,
                requests: RequestCoalescer::new(),
                thumbnail_requests: ThumbnailRequestTracker::new(),
                unsubmitted: Arc::new(MemoryUnsubmittedStore::new()),
                thumbnails,
                refresher: Arc::new(CountingRefresher::new()),
            }),
        })
    }

    pub fn with_unsubmitted_store(self, store: Arc<dyn UnsubmittedStore>) -> Self {
        self.map_inner(|inner| inner.unsubmitted = store)
    }

    pub fn with_thumbnail_store(self, store: Arc<dyn ThumbnailStore>) -> Self {
        self.map_inner(|inner| inner.thumbnails = store)
    }

    pub fn with_refresher(self, refresher: Arc<dyn BrandingRefresher>) -> Self {
        self.map_inner(|inner| inner.refresher = refresher)
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        // Only called while building, before any clone exists.
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                f(&mut inner);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(shared) => {
                warn!("Collaborator replaced on a shared BrandingClient; ignoring");
                Self { inner: shared }
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &BrandingCache {
        &self.inner.cache
    }

    /// Force the next read of `video_id` to go to the network.
    pub fn clear_cache(&self, video_id: &str) {
        self.inner.cache.clear(video_id);
    }

    /// Branding for `video_id`, or `None` when nothing is known yet.
    ///
    /// Never fails: network and parse errors are logged and read as "no
    /// branding available".
    pub async fn get_branding(&self, video_id: &str, query_by_hash: bool) -> Option<CacheRecord> {
        if let Some(record) = self.inner.cache.get(video_id) {
            metrics::record_cache_lookup(true);
            return Some(record);
        }
        metrics::record_cache_lookup(false);

        let mut pending = self.fetch_branding(video_id, query_by_hash);
        let generation = pending.generation();

        match tokio::time::timeout(self.inner.config.fetch_timeout, pending.wait()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Branding fetch for {} ended without a result: {}", video_id, e);
            }
            Err(_) => {
                warn!(
                    "Branding fetch for {} timed out after {}ms, using cached state",
                    video_id,
                    self.inner.config.fetch_timeout.as_millis()
                );
                metrics::record_timeout();
                // The fetch keeps running and fills the cache when it lands.
                self.inner.requests.release(video_id, generation);
            }
        }

        self.inner.cache.get(video_id)
    }

    /// Preferred title, with a selected local edit taking priority.
    ///
    /// Downvoted, unlocked server titles are hidden.
    pub async fn get_title_including_unsubmitted(&self, video_id: &str) -> Option<TitleResult> {
        let staged = self.inner.unsubmitted.get(video_id).and_then(|edits| {
            edits
                .titles
                .into_iter()
                .find(|t| t.selected)
                .map(|t| TitleResult::unvoted(t.title, false))
        });
        if staged.is_some() {
            return staged;
        }

        let record = self
            .get_branding(video_id, self.inner.config.query_by_hash)
            .await?;
        record
            .branding
            .titles
            .into_iter()
            .next()
            .filter(TitleResult::is_visible)
    }

    /// Preferred thumbnail, with a selected local edit taking priority.
    ///
    /// Downvoted, unlocked server thumbnails are hidden.
    pub async fn get_thumbnail_including_unsubmitted(
        &self,
        video_id: &str,
    ) -> Option<ThumbnailResult> {
        let staged = self.inner.unsubmitted.get(video_id).and_then(|edits| {
            edits
                .thumbnails
                .into_iter()
                .find(|t| t.selected)
                .map(|t| ThumbnailResult::unvoted(t.timestamp, t.original))
        });
        if staged.is_some() {
            return staged;
        }

        let record = self
            .get_branding(video_id, self.inner.config.query_by_hash)
            .await?;
        record
            .branding
            .thumbnails
            .into_iter()
            .next()
            .filter(ThumbnailResult::is_visible)
    }

    /// Submit a title and/or thumbnail for `video_id`.
    ///
    /// The cache entry is dropped whatever the outcome, so the next read
    /// fetches the server's view.
    ///
    /// # Errors
    ///
    /// Returns an error when the request could not be sent. HTTP error
    /// statuses come back as a normal response.
    pub async fn submit_video_branding(
        &self,
        video_id: &str,
        title: Option<&TitleSubmission>,
        thumbnail: Option<&ThumbnailSubmission>,
    ) -> Result<Response> {
        let submission = BrandingSubmission {
            user_id: &self.inner.config.user_id,
            video_id,
            title,
            thumbnail,
        };

        let result = api::submit_branding(
            &self.inner.http_client,
            &self.inner.config.branding_server_url,
            &submission,
        )
        .await;

        self.inner.cache.clear(video_id);

        match &result {
            Ok(response) => info!(
                "Branding submission for {} returned {}",
                video_id,
                response.status()
            ),
            Err(e) => error!("Branding submission for {} failed: {}", video_id, e),
        }
        result
    }

    /// Ask the thumbnail cache to render `video_id` at `time`.
    ///
    /// If a request for this video is already in flight, no new request is
    /// sent: the wish is recorded and honoured once the current one settles,
    /// and `None` is returned right away.
    pub async fn queue_thumbnail_cache_request(
        &self,
        video_id: &str,
        time: Option<f64>,
        title: Option<String>,
        generate_now: bool,
    ) -> Option<BrandingResult> {
        match self
            .inner
            .thumbnail_requests
            .begin(video_id, time, generate_now)
        {
            Begin::Queued => {
                debug!(
                    "Thumbnail cache request for {} already in flight, queued time {:?}",
                    video_id, time
                );
                None
            }
            Begin::Issue => {
                self.fetch_from_thumbnail_cache(video_id.to_string(), time, title, generate_now)
                    .await
            }
        }
    }

    /// Join the in-flight fetch for `video_id`, starting one if needed.
    fn fetch_branding(&self, video_id: &str, query_by_hash: bool) -> PendingFetch {
        match self.inner.requests.join(video_id) {
            Join::Existing(pending) => pending,
            Join::Started(pending, signal) => {
                debug!("Starting branding fetch for {}", video_id);
                let race = Arc::new(FetchRace::new(signal));

                tokio::spawn(self.clone().run_main_fetch(
                    video_id.to_string(),
                    query_by_hash,
                    Arc::clone(&race),
                ));
                tokio::spawn(
                    self.clone()
                        .run_thumbnail_cache_fetch(video_id.to_string(), race),
                );

                pending
            }
        }
    }

    async fn run_main_fetch(self, video_id: String, query_by_hash: bool, race: Arc<FetchRace>) {
        let results = match api::fetch_branding(
            &self.inner.http_client,
            &self.inner.config.branding_server_url,
            &video_id,
            query_by_hash,
        )
        .await
        {
            Ok(results) => results,
            Err(e) => {
                error!("Branding fetch for {} failed: {}", video_id, e);
                metrics::record_fetch("main", "error");
                None
            }
        };

        let requested = results.as_ref().and_then(|map| map.get(&video_id).cloned());
        let has_data = requested.as_ref().is_some_and(BrandingResult::has_data);
        if results.is_some() {
            metrics::record_fetch("main", if has_data { "data" } else { "empty" });
        }

        let mut previous_titles = None;
        let thumbnail_done = race.complete_main(has_data, || {
            previous_titles = self
                .inner
                .cache
                .get(&video_id)
                .map(|record| record.branding.titles.len());

            // Other videos from the same hash bucket ride along without
            // thumbnail-cache coordination.
            for (id, branding) in results.into_iter().flatten() {
                self.inner.cache.put(&id, branding, &video_id);
            }
        });

        if thumbnail_done {
            self.refresh(&video_id).await;
        }

        if let Some(branding) = requested {
            self.request_rendered_thumbnail(&video_id, &branding, previous_titles)
                .await;
        }
    }

    /// Ask the thumbnail cache to render a community-chosen frame when no
    /// rendering exists yet, or when a title just appeared and should be
    /// burned into the image.
    ///
    /// `previous_titles` is `None` when nothing was cached before this fetch.
    async fn request_rendered_thumbnail(
        &self,
        video_id: &str,
        branding: &BrandingResult,
        previous_titles: Option<usize>,
    ) {
        let Some(thumbnail) = branding.thumbnails.first() else {
            return;
        };
        if thumbnail.original {
            return;
        }
        let Some(timestamp) = thumbnail.timestamp else {
            return;
        };

        let title = branding
            .titles
            .first()
            .map(|t| t.title.clone())
            .filter(|t| !t.is_empty());
        let title_became_available = title.is_some() && previous_titles == Some(0);

        if title_became_available
            || !self.inner.thumbnails.has_thumbnail(video_id, timestamp).await
        {
            debug!(
                "Requesting rendered thumbnail for {} at {}s",
                video_id, timestamp
            );
            if self
                .queue_thumbnail_cache_request(video_id, Some(timestamp), title, false)
                .await
                .is_some()
            {
                self.refresh(video_id).await;
            }
        }
    }

    async fn run_thumbnail_cache_fetch(self, video_id: String, race: Arc<FetchRace>) {
        let result = self
            .queue_thumbnail_cache_request(&video_id, None, None, false)
            .await;
        let has_data = result.as_ref().is_some_and(BrandingResult::has_data);

        let merged = race.complete_thumbnail(has_data, || {
            if let Some(branding) = result {
                self.inner.cache.put(&video_id, branding, &video_id);
            }
        });

        if merged {
            debug!("Thumbnail cache answered first for {}", video_id);
        } else if has_data {
            debug!(
                "Discarding thumbnail cache result for {}, branding server already answered",
                video_id
            );
        }
    }

    /// Issue one thumbnail-cache request and settle the video's request state.
    ///
    /// Boxed because settling can issue a follow-up request.
    fn fetch_from_thumbnail_cache(
        &self,
        video_id: String,
        time: Option<f64>,
        title: Option<String>,
        generate_now: bool,
    ) -> BoxFuture<'static, Option<BrandingResult>> {
        let client = self.clone();
        async move {
            let request = ThumbnailRequest {
                video_id: &video_id,
                time,
                title: title.as_deref(),
                generate_now,
            };

            let response = api::fetch_thumbnail(
                &client.inner.http_client,
                &client.inner.config.thumbnail_server_url,
                &request,
            )
            .await;

            let used_time = match &response {
                Ok(ThumbnailResponse::Found { timestamp, .. }) => Some(*timestamp),
                _ => time,
            };
            if let Err(e) = &response {
                error!("Thumbnail cache fetch for {} failed: {}", video_id, e);
                metrics::record_fetch("thumbnail_cache", "error");
            }

            // A caller asked for a different frame while this one was in
            // flight: drop this answer and ask again.
            if let Some(rerequest) = client.inner.thumbnail_requests.settle(&video_id, used_time) {
                debug!(
                    "Re-requesting thumbnail for {} at {:?} (had {:?})",
                    video_id, rerequest.time, used_time
                );
                let title = client
                    .inner
                    .cache
                    .get(&video_id)
                    .and_then(|record| record.branding.titles.into_iter().next())
                    .map(|t| t.title)
                    .filter(|t| !t.is_empty());
                return client
                    .fetch_from_thumbnail_cache(
                        video_id,
                        rerequest.time,
                        title,
                        rerequest.generate_now,
                    )
                    .await;
            }

            match response {
                Ok(ThumbnailResponse::Found {
                    timestamp,
                    title,
                    image,
                }) => {
                    if let Err(e) = client
                        .inner
                        .thumbnails
                        .install(&video_id, timestamp, image)
                        .await
                    {
                        warn!("Failed to store rendered thumbnail for {}: {}", video_id, e);
                    }
                    metrics::record_fetch("thumbnail_cache", "data");

                    Some(BrandingResult {
                        titles: title
                            .map(|t| vec![TitleResult::unvoted(t, false)])
                            .unwrap_or_default(),
                        thumbnails: vec![ThumbnailResult::unvoted(Some(timestamp), false)],
                        ..Default::default()
                    })
                }
                Ok(ThumbnailResponse::NotFound) => {
                    info!("No cached thumbnail for {}", video_id);
                    metrics::record_fetch("thumbnail_cache", "empty");
                    None
                }
                Err(_) => None,
            }
        }
        .boxed()
    }

    async fn refresh(&self, video_id: &str) {
        if let Err(e) = self.inner.refresher.refresh(video_id).await {
            warn!("Branding refresh for {} failed: {}", video_id, e);
        }
    }
}
