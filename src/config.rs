use crate::cache::DEFAULT_CACHE_LIMIT;
use std::env;
use std::time::Duration;

/// Default branding server.
pub const DEFAULT_BRANDING_SERVER: &str = "https://sponsor.ajay.app";

/// Default thumbnail cache server.
pub const DEFAULT_THUMBNAIL_SERVER: &str = "https://dearrow-thumb.ajay.app";

/// Default time a read waits for the network before falling back to the cache.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 1000;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the branding server
    pub branding_server_url: String,
    /// Base URL of the thumbnail cache server
    pub thumbnail_server_url: String,
    /// Submitting user's id
    pub user_id: String,
    /// How long a read waits before returning whatever is cached
    pub fetch_timeout: Duration,
    /// Query by hash prefix instead of by raw video id
    pub query_by_hash: bool,
    /// Maximum number of cached videos
    pub cache_limit: usize,
    pub is_dev: bool,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode a random user id is generated. In PROD mode USER_ID is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let user_id = if is_dev {
            env::var("USER_ID").unwrap_or_else(|_| crate::model::fresh_submission_id())
        } else {
            env::var("USER_ID").map_err(|_| "USER_ID is required in production")?
        };

        let branding_server_url = env::var("BRANDING_SERVER_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_BRANDING_SERVER.to_string());

        let thumbnail_server_url = env::var("THUMBNAIL_SERVER_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_THUMBNAIL_SERVER.to_string());

        // A malformed timeout is rejected rather than defaulted
        let fetch_timeout_ms: u64 = match env::var("FETCH_TIMEOUT_MS") {
            Ok(v) => v.parse()?,
            Err(_) => DEFAULT_FETCH_TIMEOUT_MS,
        };

        let query_by_hash = env::var("QUERY_BY_HASH")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let cache_limit = env::var("CACHE_LIMIT")
            .unwrap_or_else(|_| DEFAULT_CACHE_LIMIT.to_string())
            .parse()
            .unwrap_or(DEFAULT_CACHE_LIMIT);

        Ok(Config {
            branding_server_url,
            thumbnail_server_url,
            user_id,
            fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            query_by_hash,
            cache_limit,
            is_dev,
        })
    }
}
