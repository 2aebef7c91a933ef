//! Wire and cache types for video branding.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A community title candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleResult {
    pub title: String,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(rename = "UUID", default)]
    pub uuid: String,
}

/// A community thumbnail candidate. Original thumbnails carry no timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(rename = "UUID", default)]
    pub uuid: String,
}

impl TitleResult {
    /// Title the user staged locally or one the thumbnail cache reported.
    pub fn unvoted(title: String, original: bool) -> Self {
        Self {
            title,
            original,
            votes: 0,
            locked: false,
            uuid: fresh_submission_id(),
        }
    }

    /// Downvoted submissions are hidden unless an admin locked them.
    pub fn is_visible(&self) -> bool {
        self.locked || self.votes >= 0
    }
}

impl ThumbnailResult {
    pub fn unvoted(timestamp: Option<f64>, original: bool) -> Self {
        Self {
            timestamp,
            original,
            votes: 0,
            locked: false,
            uuid: fresh_submission_id(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.locked || self.votes >= 0
    }
}

/// Branding for one video. The first element of each list is the preferred
/// candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandingResult {
    #[serde(default)]
    pub titles: Vec<TitleResult>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailResult>,
    /// Random frame offset (0..1) the server picks for videos with no thumbnail votes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_duration: Option<f64>,
}

impl BrandingResult {
    /// Whether the server actually knows anything about this video.
    pub fn has_data(&self) -> bool {
        !self.titles.is_empty() || !self.thumbnails.is_empty()
    }
}

/// A cached branding result plus its recency, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub branding: BrandingResult,
    pub last_used: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleSubmission {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThumbnailSubmission {
    pub original: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Body of `POST /api/branding`.
#[derive(Debug, Serialize)]
pub struct BrandingSubmission<'a> {
    #[serde(rename = "userID")]
    pub user_id: &'a str,
    #[serde(rename = "videoID")]
    pub video_id: &'a str,
    pub title: Option<&'a TitleSubmission>,
    pub thumbnail: Option<&'a ThumbnailSubmission>,
}

/// A title staged locally but not yet sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsubmittedTitle {
    pub title: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubmittedThumbnail {
    pub timestamp: Option<f64>,
    pub original: bool,
    pub selected: bool,
}

/// All locally staged edits for one video.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnsubmittedBranding {
    pub titles: Vec<UnsubmittedTitle>,
    pub thumbnails: Vec<UnsubmittedThumbnail>,
}

/// Generate a submission id for results that never came from the server.
pub fn fresh_submission_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_branding() {
        let json = r#"{
            "titles": [
                {"title": "A better title", "original": false, "votes": 3,
                 "locked": false, "UUID": "t1"}
            ],
            "thumbnails": [
                {"timestamp": 12.5, "original": false, "votes": 1, "locked": true, "UUID": "th1"}
            ],
            "randomTime": 0.42,
            "videoDuration": 600.0
        }"#;

        let branding: BrandingResult = serde_json::from_str(json).unwrap();
        assert_eq!(branding.titles[0].title, "A better title");
        assert_eq!(branding.titles[0].uuid, "t1");
        assert_eq!(branding.thumbnails[0].timestamp, Some(12.5));
        assert!(branding.thumbnails[0].locked);
        assert_eq!(branding.random_time, Some(0.42));
        assert!(branding.has_data());
    }

    #[test]
    fn original_thumbnail_has_no_timestamp() {
        let json = r#"{
            "titles": [],
            "thumbnails": [{"original": true, "votes": 0, "locked": false, "UUID": "x"}]
        }"#;
        let branding: BrandingResult = serde_json::from_str(json).unwrap();
        assert_eq!(branding.thumbnails[0].timestamp, None);
        assert!(branding.thumbnails[0].original);
    }

    #[test]
    fn empty_branding_has_no_data() {
        assert!(!BrandingResult::default().has_data());
    }

    #[test]
    fn downvoted_unlocked_title_is_hidden() {
        let mut title = TitleResult::unvoted("t".to_string(), false);
        title.votes = -1;
        assert!(!title.is_visible());

        title.locked = true;
        assert!(title.is_visible(), "Locked titles stay visible");
    }

    #[test]
    fn unvoted_results_get_unique_ids() {
        let a = ThumbnailResult::unvoted(Some(1.0), false);
        let b = ThumbnailResult::unvoted(Some(1.0), false);
        assert_ne!(a.uuid, b.uuid);
        assert_eq!(a.votes, 0);
        assert!(!a.locked);
    }

    #[test]
    fn submission_serializes_server_field_names() {
        let title = TitleSubmission {
            title: "New".to_string(),
        };
        let body = BrandingSubmission {
            user_id: "user",
            video_id: "vid",
            title: Some(&title),
            thumbnail: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["userID"], "user");
        assert_eq!(json["videoID"], "vid");
        assert_eq!(json["title"]["title"], "New");
        assert!(json["thumbnail"].is_null());
    }
}
