//! Facebook Page adapter
//!
//! Publishes to the Page identified by the account's `platform_user_id`,
//! using the stored Page access token. Images are staged as unpublished
//! photos and attached to a feed post; videos are pulled by URL through
//! the videos edge.

use async_trait::async_trait;
use serde_json::json;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::{read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct FacebookPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl FacebookPublisher {
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

fn page_id(account: &ConnectedAccount) -> Result<&str, PlatformError> {
    account.platform_user_id.as_deref().ok_or_else(|| {
        PlatformError::NotConnected("facebook: account has no page id".to_string())
    })
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::Facebook
    }

    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    async fn upload_media(
        &self,
        account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        match media.kind {
            // Videos are pulled by URL at publish time
            MediaKind::Video => Ok(MediaHandle::Url(media.url.clone())),
            MediaKind::Image => {
                let page = page_id(account)?;
                let response = self
                    .client
                    .post(format!("{}/{}/photos", self.base(), page))
                    .bearer_auth(&account.access_token)
                    .form(&[("url", media.url.as_str()), ("published", "false")])
                    .send()
                    .await
                    .map_err(|e| PlatformError::Network(format!("facebook: photo stage: {e}")))?;

                let body = read_json(PlatformId::Facebook, response).await?;
                let id = body["id"].as_str().ok_or_else(|| {
                    PlatformError::ProviderRejected(format!(
                        "facebook: photo response missing id: {body}"
                    ))
                })?;
                Ok(MediaHandle::Provider(id.to_string()))
            }
        }
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let page = page_id(account)?;

        // A video post goes through the videos edge; everything else is a
        // feed post with staged photos attached
        if let Some(MediaHandle::Url(video_url)) = media
            .iter()
            .find(|h| matches!(h, MediaHandle::Url(_)))
        {
            let response = self
                .client
                .post(format!("{}/{}/videos", self.base(), page))
                .bearer_auth(&account.access_token)
                .form(&[("file_url", video_url.as_str()), ("description", text)])
                .send()
                .await
                .map_err(|e| PlatformError::Network(format!("facebook: video post: {e}")))?;
            let body = read_json(PlatformId::Facebook, response).await?;
            return post_id_from(&body);
        }

        let mut form: Vec<(String, String)> = vec![("message".to_string(), text.to_string())];
        for (i, handle) in media.iter().enumerate() {
            if let MediaHandle::Provider(photo_id) = handle {
                form.push((
                    format!("attached_media[{i}]"),
                    json!({ "media_fbid": photo_id }).to_string(),
                ));
            }
        }

        let response = self
            .client
            .post(format!("{}/{}/feed", self.base(), page))
            .bearer_auth(&account.access_token)
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("facebook: feed post: {e}")))?;

        let body = read_json(PlatformId::Facebook, response).await?;
        post_id_from(&body)
    }
}

fn post_id_from(body: &serde_json::Value) -> Result<String, PlatformError> {
    body["id"]
        .as_str()
        .or_else(|| body["post_id"].as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            PlatformError::ProviderRejected(format!("facebook: response missing id: {body}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(page: Option<&str>) -> ConnectedAccount {
        ConnectedAccount {
            owner_id: "owner-1".to_string(),
            platform: PlatformId::Facebook,
            access_token: "page-token".to_string(),
            refresh_token: None,
            expires_at: None,
            platform_user_id: page.map(str::to_string),
        }
    }

    #[test]
    fn test_page_id_required() {
        let err = page_id(&account(None)).unwrap_err();
        assert!(matches!(err, PlatformError::NotConnected(_)));
        assert_eq!(page_id(&account(Some("123"))).unwrap(), "123");
    }

    #[test]
    fn test_post_id_from_feed_response() {
        assert_eq!(
            post_id_from(&json!({ "id": "123_456" })).unwrap(),
            "123_456"
        );
        assert_eq!(
            post_id_from(&json!({ "post_id": "123_789" })).unwrap(),
            "123_789"
        );
        assert!(post_id_from(&json!({})).is_err());
    }
}
