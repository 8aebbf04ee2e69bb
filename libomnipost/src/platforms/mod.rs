//! Platform adapter implementations
//!
//! One adapter per publishing target, all behind the [`Publisher`] trait.
//! Adapters translate a resolved post (text plus media) into the provider's
//! API calls and surface failures through the [`PlatformError`] taxonomy so
//! the dispatcher can tell recoverable auth problems from terminal ones.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

pub mod bluesky;
pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod mock;
pub mod pinterest;
pub mod tiktok;
pub mod upload;
pub mod x;

/// A provider-side reference to uploaded media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaHandle {
    /// An id the provider assigned after ingesting the bytes.
    Provider(String),
    /// The original URL, for providers that pull media themselves.
    Url(String),
    /// A provider blob reference carried as opaque JSON (Bluesky).
    Blob(serde_json::Value),
}

/// A publishing target.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn id(&self) -> PlatformId;

    /// Whether this platform can carry the given media kind at all.
    fn supports(&self, kind: MediaKind) -> bool;

    /// Make one media attachment available on the provider side.
    async fn upload_media(
        &self,
        account: &ConnectedAccount,
        media: &Media,
    ) -> std::result::Result<MediaHandle, PlatformError>;

    /// Publish the post, returning the provider's post id.
    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> std::result::Result<String, PlatformError>;
}

/// Build one publisher per platform section present in config.
pub fn create_publishers(config: &Config) -> Result<Vec<Box<dyn Publisher>>> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();
    let p = &config.platforms;

    if let Some(app) = &p.x {
        publishers.push(Box::new(x::XPublisher::new(app.clone())));
    }
    if let Some(app) = &p.facebook {
        publishers.push(Box::new(facebook::FacebookPublisher::new(app.clone())));
    }
    if let Some(app) = &p.instagram {
        publishers.push(Box::new(instagram::InstagramPublisher::new(app.clone())));
    }
    if let Some(bsky) = &p.bluesky {
        publishers.push(Box::new(bluesky::BlueskyPublisher::from_config(bsky)?));
    }
    if let Some(app) = &p.linkedin {
        publishers.push(Box::new(linkedin::LinkedinPublisher::new(app.clone())));
    }
    if let Some(app) = &p.pinterest {
        publishers.push(Box::new(pinterest::PinterestPublisher::new(app.clone())));
    }
    if let Some(app) = &p.tiktok {
        publishers.push(Box::new(tiktok::TiktokPublisher::new(app.clone())));
    }

    Ok(publishers)
}

/// Bounded HTTP client shared by all adapters. Provider calls that hang
/// would otherwise stall the whole batch.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

/// Fetch media bytes from the post's media URL, for providers that only
/// accept direct uploads.
pub(crate) async fn fetch_media_bytes(
    client: &reqwest::Client,
    platform: PlatformId,
    media: &Media,
) -> std::result::Result<Vec<u8>, PlatformError> {
    let response = client
        .get(&media.url)
        .send()
        .await
        .map_err(|e| PlatformError::Network(format!("{platform}: fetch {}: {e}", media.url)))?;

    if !response.status().is_success() {
        return Err(PlatformError::Network(format!(
            "{platform}: fetch {}: HTTP {}",
            media.url,
            response.status().as_u16()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PlatformError::Network(format!("{platform}: fetch {}: {e}", media.url)))?;
    Ok(bytes.to_vec())
}

/// Read a JSON response body, classifying non-2xx statuses into the error
/// taxonomy with the raw body preserved as detail.
pub(crate) async fn read_json(
    platform: PlatformId,
    response: reqwest::Response,
) -> std::result::Result<serde_json::Value, PlatformError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| PlatformError::Network(format!("{platform}: read response: {e}")))?;

    if !status.is_success() {
        return Err(PlatformError::from_status(platform, status.as_u16(), &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| PlatformError::Network(format!("{platform}: malformed response: {e}")))
}
