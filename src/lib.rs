//! Client-side cache and request coalescing for crowd-sourced video branding
//! (titles and thumbnails).
//!
//! [`BrandingClient`] is the entry point. It serves reads from a bounded
//! cache, coalesces concurrent misses into one fetch per video, and races the
//! branding server against the thumbnail cache server.

pub mod api;
pub mod cache;
pub mod client;
pub mod coalescer;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod race;
pub mod thumbnail_requests;

pub use client::BrandingClient;
pub use config::Config;
pub use error::{BrandingError, Result};
