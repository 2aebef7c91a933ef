use brandcache::{BrandingClient, Config};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Setup logging
    tracing_subscriber::fmt::init();

    info!("Starting brandcache lookup");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    info!("Running in {} mode", if config.is_dev { "DEV" } else { "PROD" });

    let query_by_hash = config.query_by_hash;
    let client = match BrandingClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create branding client: {}", e);
            std::process::exit(1);
        }
    };

    let video_ids: Vec<String> = std::env::args().skip(1).collect();
    if video_ids.is_empty() {
        warn!("No video ids given; usage: brandcache <video-id>...");
        return;
    }

    for video_id in &video_ids {
        match client.get_branding(video_id, query_by_hash).await {
            Some(record) => {
                let title = record.branding.titles.first().map(|t| t.title.as_str());
                let thumbnail = record.branding.thumbnails.first();
                info!(
                    "{}: title={:?} thumbnail_timestamp={:?} original_thumbnail={}",
                    video_id,
                    title,
                    thumbnail.and_then(|t| t.timestamp),
                    thumbnail.is_some_and(|t| t.original)
                );
            }
            None => warn!("{}: no branding available", video_id),
        }
    }
}
