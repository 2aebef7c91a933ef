//! Request coalescing for branding fetches.
//!
//! At most one combined fetch runs per video. The first caller starts it and
//! receives a [`FetchSignal`]; every later caller joins the same
//! [`PendingFetch`] until the signal settles. A `watch` channel publishes
//! completion so late joiners still observe it.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

/// Handle on an in-flight combined fetch.
#[derive(Clone, Debug)]
pub struct PendingFetch {
    generation: u64,
    done: watch::Receiver<bool>,
}

impl PendingFetch {
    /// Wait until the fetch settles.
    ///
    /// Errors only if the fetch tasks went away without settling.
    pub async fn wait(&mut self) -> Result<(), watch::error::RecvError> {
        self.done.wait_for(|done| *done).await.map(|_| ())
    }

    pub fn is_settled(&self) -> bool {
        *self.done.borrow()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Outcome of [`RequestCoalescer::join`].
#[derive(Debug)]
pub enum Join {
    /// A fetch is already running; wait on it.
    Existing(PendingFetch),
    /// No fetch was running; the caller must drive one and settle the signal.
    Started(PendingFetch, FetchSignal),
}

/// Settles a pending fetch for all joined callers.
///
/// Dropping the signal without settling removes the in-flight entry and wakes
/// waiters with an error, so a panicked fetch cannot wedge a video forever.
#[derive(Debug)]
pub struct FetchSignal {
    video_id: String,
    generation: u64,
    tx: watch::Sender<bool>,
    active: Arc<DashMap<String, PendingFetch>>,
}

impl FetchSignal {
    /// Wake every waiter and stop handing this fetch to new callers.
    /// Calling it more than once is harmless.
    pub fn settle(&self) {
        self.tx.send_replace(true);
        release(&self.active, &self.video_id, self.generation);
    }
}

impl Drop for FetchSignal {
    fn drop(&mut self) {
        release(&self.active, &self.video_id, self.generation);
    }
}

fn release(active: &DashMap<String, PendingFetch>, video_id: &str, generation: u64) {
    if active
        .remove_if(video_id, |_, pending| pending.generation == generation)
        .is_some()
    {
        debug!("Released in-flight branding fetch for {}", video_id);
    }
}

/// Tracks one in-flight combined fetch per video.
#[derive(Clone, Debug, Default)]
pub struct RequestCoalescer {
    active: Arc<DashMap<String, PendingFetch>>,
    generations: Arc<AtomicU64>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight fetch for `video_id`, or register a new one.
    pub fn join(&self, video_id: &str) -> Join {
        match self.active.entry(video_id.to_string()) {
            Entry::Occupied(entry) => {
                debug!("Coalescing branding fetch for {}", video_id);
                Join::Existing(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let generation = self.generations.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(false);
                let pending = PendingFetch {
                    generation,
                    done: rx,
                };
                entry.insert(pending.clone());

                Join::Started(
                    pending,
                    FetchSignal {
                        video_id: video_id.to_string(),
                        generation,
                        tx,
                        active: Arc::clone(&self.active),
                    },
                )
            }
        }
    }

    /// Forget the in-flight fetch without cancelling it.
    ///
    /// Used when a consumer gives up waiting. A stale generation is ignored so
    /// a newer fetch for the same video is never dropped by mistake.
    pub fn release(&self, video_id: &str, generation: u64) {
        release(&self.active, video_id, generation);
    }

    pub fn is_in_flight(&self, video_id: &str) -> bool {
        self.active.contains_key(video_id)
    }

    pub fn in_flight(&self) -> usize {
        self.active.len()
    }
}
