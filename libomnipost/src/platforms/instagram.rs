//! Instagram adapter
//!
//! Instagram publishes in two steps against the Graph API: create a media
//! container pointing at the source URL, then publish the container. Both
//! steps can fail independently, so errors name the step that failed.

use async_trait::async_trait;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::{read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl InstagramPublisher {
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

fn ig_user_id(account: &ConnectedAccount) -> Result<&str, PlatformError> {
    account.platform_user_id.as_deref().ok_or_else(|| {
        PlatformError::NotConnected("instagram: account has no user id".to_string())
    })
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::Instagram
    }

    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    async fn upload_media(
        &self,
        _account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        // The container step pulls the media itself
        Ok(MediaHandle::Url(media.url.clone()))
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let user = ig_user_id(account)?;

        let Some(MediaHandle::Url(url)) = media.first() else {
            return Err(PlatformError::Unsupported(
                "instagram: posts require a media attachment".to_string(),
            ));
        };

        // Step 1: create the container
        let is_video = url.ends_with(".mp4") || url.ends_with(".mov");
        let mut form: Vec<(&str, &str)> = vec![("caption", text)];
        if is_video {
            form.push(("media_type", "REELS"));
            form.push(("video_url", url));
        } else {
            form.push(("image_url", url));
        }

        let response = self
            .client
            .post(format!("{}/{}/media", self.base(), user))
            .bearer_auth(&account.access_token)
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("instagram: container step: {e}")))?;

        let body = read_json(PlatformId::Instagram, response)
            .await
            .map_err(|e| prefix_step(e, "container step"))?;
        let container_id = body["id"].as_str().ok_or_else(|| {
            PlatformError::ProviderRejected(format!(
                "instagram: container step: response missing id: {body}"
            ))
        })?;

        // Step 2: publish it
        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.base(), user))
            .bearer_auth(&account.access_token)
            .form(&[("creation_id", container_id)])
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("instagram: publish step: {e}")))?;

        let body = read_json(PlatformId::Instagram, response)
            .await
            .map_err(|e| prefix_step(e, "publish step"))?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PlatformError::ProviderRejected(format!(
                "instagram: publish step: response missing id: {body}"
            ))
        })
    }
}

fn prefix_step(e: PlatformError, step: &str) -> PlatformError {
    match e {
        PlatformError::AuthExpired(m) => PlatformError::AuthExpired(format!("{step}: {m}")),
        PlatformError::RateLimited(m) => PlatformError::RateLimited(format!("{step}: {m}")),
        PlatformError::ProviderRejected(m) => {
            PlatformError::ProviderRejected(format!("{step}: {m}"))
        }
        PlatformError::Network(m) => PlatformError::Network(format!("{step}: {m}")),
        other => other,
    }
}
