//! TikTok adapter
//!
//! Video-only. Publishing hands TikTok the video URL through the direct
//! post init endpoint and lets their side pull and process it; the
//! returned publish id is the provider reference.

use async_trait::async_trait;
use serde_json::json;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::{read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://open.tiktokapis.com";

pub struct TiktokPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl TiktokPublisher {
    pub fn new(app: OauthAppConfig) -> Self {
        Self {
            client: super::http_client(),
            app,
        }
    }

    fn base(&self) -> &str {
        self.app
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }
}

#[async_trait]
impl Publisher for TiktokPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::Tiktok
    }

    fn supports(&self, kind: MediaKind) -> bool {
        matches!(kind, MediaKind::Video)
    }

    async fn upload_media(
        &self,
        _account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        match media.kind {
            MediaKind::Video => Ok(MediaHandle::Url(media.url.clone())),
            MediaKind::Image => Err(PlatformError::Unsupported(
                "tiktok: image posts are not supported".to_string(),
            )),
        }
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let Some(MediaHandle::Url(video_url)) = media.first() else {
            return Err(PlatformError::Unsupported(
                "tiktok: posts require a video".to_string(),
            ));
        };

        let response = self
            .client
            .post(format!("{}/v2/post/publish/video/init/", self.base()))
            .bearer_auth(&account.access_token)
            .json(&json!({
                "post_info": {
                    "title": text,
                    "privacy_level": "PUBLIC_TO_EVERYONE",
                },
                "source_info": {
                    "source": "PULL_FROM_URL",
                    "video_url": video_url,
                }
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("tiktok: video init: {e}")))?;

        let body = read_json(PlatformId::Tiktok, response).await?;
        body["data"]["publish_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::ProviderRejected(format!(
                    "tiktok: init response missing publish_id: {body}"
                ))
            })
    }
}
