//! HTTP calls to the branding server and the thumbnail cache.
//!
//! These functions report failures as [`BrandingError`]s; deciding whether to
//! log or surface them is up to the caller.

use crate::error::{BrandingError, Result};
use crate::model::{BrandingResult, BrandingSubmission};
use reqwest::{Client, Response, StatusCode};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

/// Number of hex characters of the video hash sent in bucket queries.
pub const HASH_PREFIX_LEN: usize = 4;

/// Branding keyed by video id, as returned by either query mode.
pub type BrandingMap = HashMap<String, BrandingResult>;

/// Leading hex characters of the SHA-256 of `video_id`.
pub fn hash_prefix(video_id: &str) -> String {
    let digest = Sha256::digest(video_id.as_bytes());
    let mut prefix = hex::encode(digest);
    prefix.truncate(HASH_PREFIX_LEN);
    prefix
}

fn endpoint(server_url: &str, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{}{}",
        server_url.trim_end_matches('/'),
        path
    ))?)
}

/// Fetch branding for `video_id` from the branding server.
///
/// With `query_by_hash` the request only reveals a hash prefix and the
/// response may contain other videos from the same bucket. Otherwise the
/// single result is keyed by `video_id`.
///
/// Returns `Ok(None)` for 404 and for a 200 whose body cannot be parsed.
///
/// # Errors
///
/// Returns an error on transport failure or any status other than 200/404.
pub async fn fetch_branding(
    client: &Client,
    server_url: &str,
    video_id: &str,
    query_by_hash: bool,
) -> Result<Option<BrandingMap>> {
    let url = if query_by_hash {
        endpoint(
            server_url,
            &format!("/api/branding/{}", hash_prefix(video_id)),
        )?
    } else {
        let mut url = endpoint(server_url, "/api/branding")?;
        url.query_pairs_mut().append_pair("videoID", video_id);
        url
    };

    debug!("Fetching branding for {} from {}", video_id, url);
    let response = client.get(url.clone()).send().await?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::NOT_FOUND => return Ok(None),
        status => {
            return Err(BrandingError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
    }

    let body = response.bytes().await?;
    let parsed = if query_by_hash {
        serde_json::from_slice::<BrandingMap>(&body)
    } else {
        serde_json::from_slice::<BrandingResult>(&body)
            .map(|branding| HashMap::from([(video_id.to_string(), branding)]))
    };

    match parsed {
        Ok(map) => Ok(Some(map)),
        Err(source) => {
            let e = BrandingError::MalformedBody {
                video_id: video_id.to_string(),
                source,
            };
            warn!("{}", e);
            Ok(None)
        }
    }
}

/// Parameters of a thumbnail-cache request.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest<'a> {
    pub video_id: &'a str,
    pub time: Option<f64>,
    pub title: Option<&'a str>,
    pub generate_now: bool,
}

/// Answer from the thumbnail cache.
#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailResponse {
    /// A rendered image for the frame at `timestamp` seconds.
    Found {
        timestamp: f64,
        title: Option<String>,
        image: Vec<u8>,
    },
    /// Any non-200 status.
    NotFound,
}

/// Ask the thumbnail cache for a rendered thumbnail.
///
/// # Errors
///
/// Returns an error on transport failure or when a 200 response carries a
/// missing or non-numeric `x-timestamp` header.
pub async fn fetch_thumbnail(
    client: &Client,
    server_url: &str,
    request: &ThumbnailRequest<'_>,
) -> Result<ThumbnailResponse> {
    let mut url = endpoint(server_url, "/api/v1/getThumbnail")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("videoID", request.video_id);
        if let Some(time) = request.time {
            query.append_pair("time", &time.to_string());
        }
        if let Some(title) = request.title {
            query.append_pair("title", title);
        }
        if request.generate_now {
            query.append_pair("generateNow", "true");
        }
    }

    debug!("Fetching cached thumbnail: {}", url);
    let response = client.get(url).send().await?;

    if response.status() != StatusCode::OK {
        debug!(
            "Thumbnail cache returned {} for {}",
            response.status(),
            request.video_id
        );
        return Ok(ThumbnailResponse::NotFound);
    }

    let raw_timestamp = header_str(&response, "x-timestamp").unwrap_or_default();
    let timestamp = raw_timestamp
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite())
        .ok_or_else(|| BrandingError::InvalidTimestamp {
            video_id: request.video_id.to_string(),
            value: raw_timestamp.clone(),
        })?;
    let title = header_str(&response, "x-title").filter(|t| !t.is_empty());

    let image = response.bytes().await?.to_vec();

    Ok(ThumbnailResponse::Found {
        timestamp,
        title,
        image,
    })
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Post a title and/or thumbnail vote to the branding server.
///
/// The response is returned untouched, whatever its status.
///
/// # Errors
///
/// Returns an error only when the request could not be sent.
pub async fn submit_branding(
    client: &Client,
    server_url: &str,
    submission: &BrandingSubmission<'_>,
) -> Result<Response> {
    let url = endpoint(server_url, "/api/branding")?;
    debug!("Submitting branding for {}", submission.video_id);
    Ok(client.post(url).json(submission).send().await?)
}
