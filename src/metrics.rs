//! Counters and gauges for the branding cache.
//!
//! The library never installs a recorder, so these are no-ops unless the
//! embedding application sets one up.

use metrics::{counter, gauge};

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("brandcache_lookups_total", "result" => result).increment(1);
}

/// `source` is `main` or `thumbnail_cache`; `outcome` is `data`, `empty` or `error`.
pub fn record_fetch(source: &'static str, outcome: &'static str) {
    counter!("brandcache_fetches_total", "source" => source, "outcome" => outcome).increment(1);
}

pub fn record_timeout() {
    counter!("brandcache_fetch_timeouts_total").increment(1);
}

pub fn record_evictions(count: usize) {
    counter!("brandcache_evictions_total").increment(count as u64);
}

pub fn set_cache_size(size: usize) {
    gauge!("brandcache_entries").set(size as f64);
}
