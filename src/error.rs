use thiserror::Error;

/// Errors raised while talking to the branding or thumbnail-cache servers.
///
/// The read path never surfaces these to its callers: they are logged and
/// turned into an absent result. Submission returns them as-is.
#[derive(Debug, Error)]
pub enum BrandingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Malformed branding response for {video_id}: {source}")]
    MalformedBody {
        video_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid x-timestamp header {value:?} for {video_id}")]
    InvalidTimestamp { video_id: String, value: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Collaborator(String),
}

pub type Result<T> = std::result::Result<T, BrandingError>;
