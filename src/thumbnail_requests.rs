//! Per-video tracking of thumbnail-cache requests.
//!
//! A video is idle when it has no entry here, and pending while a request is
//! in flight. Callers arriving while pending do not issue another request;
//! they record the time they want instead. When the in-flight request
//! settles, [`ThumbnailRequestTracker::settle`] decides whether that recorded
//! wish warrants one more request.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct RequestInfo {
    should_rerequest: bool,
    time: Option<f64>,
    generate_now: bool,
}

/// Result of [`ThumbnailRequestTracker::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Begin {
    /// Nothing was in flight; the caller must issue the request.
    Issue,
    /// A request is in flight; the wish was recorded for later.
    Queued,
}

/// A follow-up request recorded while another was in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Rerequest {
    pub time: Option<f64>,
    pub generate_now: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ThumbnailRequestTracker {
    requests: Arc<DashMap<String, RequestInfo>>,
}

impl ThumbnailRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, video_id: &str, time: Option<f64>, generate_now: bool) -> Begin {
        match self.requests.entry(video_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let info = entry.get_mut();
                info.should_rerequest = true;
                info.time = time;
                info.generate_now |= generate_now;
                Begin::Queued
            }
            Entry::Vacant(entry) => {
                entry.insert(RequestInfo {
                    should_rerequest: false,
                    time,
                    generate_now,
                });
                Begin::Issue
            }
        }
    }

    /// Settle the in-flight request for `video_id`, which targeted or returned
    /// `used_time`.
    ///
    /// If a follow-up was recorded for a different time, the video stays
    /// pending and the follow-up is returned for the caller to issue.
    /// Otherwise the video goes back to idle.
    pub fn settle(&self, video_id: &str, used_time: Option<f64>) -> Option<Rerequest> {
        match self.requests.entry(video_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let info = entry.get_mut();
                if info.should_rerequest && info.time != used_time {
                    info.should_rerequest = false;
                    Some(Rerequest {
                        time: info.time,
                        generate_now: info.generate_now,
                    })
                } else {
                    entry.remove();
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    pub fn is_pending(&self, video_id: &str) -> bool {
        self.requests.contains_key(video_id)
    }
}
