//! Pinterest adapter
//!
//! Pins are created on the board stored as the account's
//! `platform_user_id`, pointing Pinterest at the image URL. Pins without
//! an image cannot exist, so text-only posts are unsupported here.

use async_trait::async_trait;
use serde_json::json;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::{read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://api.pinterest.com";

pub struct PinterestPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl PinterestPublisher {
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

fn board_id(account: &ConnectedAccount) -> Result<&str, PlatformError> {
    account.platform_user_id.as_deref().ok_or_else(|| {
        PlatformError::NotConnected("pinterest: account has no board id".to_string())
    })
}

#[async_trait]
impl Publisher for PinterestPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::Pinterest
    }

    fn supports(&self, kind: MediaKind) -> bool {
        matches!(kind, MediaKind::Image)
    }

    async fn upload_media(
        &self,
        _account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        // Pinterest pulls the image itself
        Ok(MediaHandle::Url(media.url.clone()))
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let board = board_id(account)?;

        let Some(MediaHandle::Url(image_url)) = media.first() else {
            return Err(PlatformError::Unsupported(
                "pinterest: pins require an image".to_string(),
            ));
        };

        let response = self
            .client
            .post(format!("{}/v5/pins", self.base()))
            .bearer_auth(&account.access_token)
            .json(&json!({
                "board_id": board,
                "description": text,
                "media_source": {
                    "source_type": "image_url",
                    "url": image_url,
                }
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("pinterest: create pin: {e}")))?;

        let body = read_json(PlatformId::Pinterest, response).await?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PlatformError::ProviderRejected(format!(
                "pinterest: pin response missing id: {body}"
            ))
        })
    }
}
