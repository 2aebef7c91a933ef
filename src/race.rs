//! Bookkeeping for the race between the branding server and the thumbnail
//! cache.
//!
//! Both sources run to completion. Waiters are released by the first source
//! that brings data, or once both have finished empty-handed. When both bring
//! data, the branding server's result wins regardless of arrival order.

use crate::coalescer::FetchSignal;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct RaceFlags {
    main_done: bool,
    thumbnail_done: bool,
}

/// Shared state for one video's dual-source fetch.
#[derive(Debug)]
pub struct FetchRace {
    flags: Mutex<RaceFlags>,
    signal: FetchSignal,
}

impl FetchRace {
    pub fn new(signal: FetchSignal) -> Self {
        Self {
            flags: Mutex::new(RaceFlags::default()),
            signal,
        }
    }

    /// Record that the branding server answered.
    ///
    /// `merge` runs under the race lock, so a thumbnail-cache result can never
    /// land on top of it. Returns whether the thumbnail cache already finished.
    pub fn complete_main(&self, has_data: bool, merge: impl FnOnce()) -> bool {
        let thumbnail_done = {
            let mut flags = self.flags.lock().unwrap_or_else(|p| p.into_inner());
            merge();
            flags.main_done = true;
            flags.thumbnail_done
        };

        if has_data || thumbnail_done {
            self.signal.settle();
        }
        thumbnail_done
    }

    /// Record that the thumbnail cache answered.
    ///
    /// `merge` only runs when the branding server has not answered yet.
    /// Returns whether it ran.
    pub fn complete_thumbnail(&self, has_data: bool, merge: impl FnOnce()) -> bool {
        let (main_done, merged) = {
            let mut flags = self.flags.lock().unwrap_or_else(|p| p.into_inner());
            let merged = has_data && !flags.main_done;
            if merged {
                merge();
            }
            flags.thumbnail_done = true;
            (flags.main_done, merged)
        };

        if has_data || main_done {
            self.signal.settle();
        }
        merged
    }

    pub fn main_done(&self) -> bool {
        self.flags.lock().unwrap_or_else(|p| p.into_inner()).main_done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coalescer::{Join, PendingFetch, RequestCoalescer};

    fn race(coalescer: &RequestCoalescer) -> (PendingFetch, FetchRace) {
        match coalescer.join("vid") {
            Join::Started(pending, signal) => (pending, FetchRace::new(signal)),
            Join::Existing(_) => panic!("Should have started a new fetch"),
        }
    }

    #[test]
    fn thumbnail_data_first_settles_and_merges() {
        let coalescer = RequestCoalescer::new();
        let (pending, race) = race(&coalescer);

        let mut merged = false;
        assert!(race.complete_thumbnail(true, || merged = true));
        assert!(merged);
        assert!(pending.is_settled());
    }

    #[test]
    fn main_after_thumbnail_still_merges() {
        let coalescer = RequestCoalescer::new();
        let (_pending, race) = race(&coalescer);
        race.complete_thumbnail(true, || {});

        let mut merged = false;
        let thumbnail_done = race.complete_main(true, || merged = true);

        assert!(merged, "Branding server result always lands");
        assert!(thumbnail_done);
    }

    #[test]
    fn thumbnail_after_main_is_discarded() {
        let coalescer = RequestCoalescer::new();
        let (pending, race) = race(&coalescer);
        assert!(!race.complete_main(true, || {}));
        assert!(pending.is_settled());

        let mut merged = false;
        assert!(!race.complete_thumbnail(true, || merged = true));
        assert!(!merged);
    }

    #[test]
    fn empty_first_result_waits_for_the_other_source() {
        let coalescer = RequestCoalescer::new();
        let (pending, race) = race(&coalescer);

        race.complete_thumbnail(false, || {});
        assert!(!pending.is_settled());
        assert!(coalescer.is_in_flight("vid"));

        race.complete_main(false, || {});
        assert!(pending.is_settled());
        assert!(!coalescer.is_in_flight("vid"));
    }

    #[test]
    fn empty_main_then_thumbnail_data_settles() {
        let coalescer = RequestCoalescer::new();
        let (pending, race) = race(&coalescer);

        race.complete_main(false, || {});
        assert!(!pending.is_settled());
        assert!(race.main_done());

        // Main already finished, so the thumbnail result is not merged.
        assert!(!race.complete_thumbnail(true, || {}));
        assert!(pending.is_settled());
    }
}
