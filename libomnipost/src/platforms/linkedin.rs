//! LinkedIn adapter
//!
//! Media goes through the assets API: register an upload, PUT the bytes to
//! the returned URL, then reference the asset URN from a UGC post. All
//! Rest.li calls carry the protocol version header.

use async_trait::async_trait;
use serde_json::json;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::{fetch_media_bytes, read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://api.linkedin.com";
const RESTLI_HEADER: (&str, &str) = ("X-Restli-Protocol-Version", "2.0.0");

pub struct LinkedinPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl LinkedinPublisher {
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

fn author_urn(account: &ConnectedAccount) -> Result<String, PlatformError> {
    let id = account.platform_user_id.as_deref().ok_or_else(|| {
        PlatformError::NotConnected("linkedin: account has no member id".to_string())
    })?;
    Ok(format!("urn:li:person:{id}"))
}

fn recipe_for(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "urn:li:digitalmediaRecipe:feedshare-image",
        MediaKind::Video => "urn:li:digitalmediaRecipe:feedshare-video",
    }
}

#[async_trait]
impl Publisher for LinkedinPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::Linkedin
    }

    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    async fn upload_media(
        &self,
        account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        let author = author_urn(account)?;

        let response = self
            .client
            .post(format!("{}/v2/assets?action=registerUpload", self.base()))
            .bearer_auth(&account.access_token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .json(&json!({
                "registerUploadRequest": {
                    "recipes": [recipe_for(media.kind)],
                    "owner": author,
                    "serviceRelationships": [{
                        "relationshipType": "OWNER",
                        "identifier": "urn:li:userGeneratedContent"
                    }]
                }
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("linkedin: register upload: {e}")))?;

        let body = read_json(PlatformId::Linkedin, response).await?;
        let upload_url = body["value"]["uploadMechanism"]
            ["com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest"]["uploadUrl"]
            .as_str()
            .ok_or_else(|| {
                PlatformError::ProviderRejected(format!(
                    "linkedin: register response missing upload url: {body}"
                ))
            })?
            .to_string();
        let asset = body["value"]["asset"]
            .as_str()
            .ok_or_else(|| {
                PlatformError::ProviderRejected(format!(
                    "linkedin: register response missing asset urn: {body}"
                ))
            })?
            .to_string();

        let bytes = fetch_media_bytes(&self.client, PlatformId::Linkedin, media).await?;
        let put = self
            .client
            .put(&upload_url)
            .bearer_auth(&account.access_token)
            .body(bytes)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("linkedin: upload bytes: {e}")))?;

        if !put.status().is_success() {
            let status = put.status().as_u16();
            let detail = put.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(
                PlatformId::Linkedin,
                status,
                &detail,
            ));
        }

        Ok(MediaHandle::Provider(asset))
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let author = author_urn(account)?;
        let payload = ugc_payload(&author, text, media);

        let response = self
            .client
            .post(format!("{}/v2/ugcPosts", self.base()))
            .bearer_auth(&account.access_token)
            .header(RESTLI_HEADER.0, RESTLI_HEADER.1)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("linkedin: ugc post: {e}")))?;

        let body = read_json(PlatformId::Linkedin, response).await?;
        body["id"].as_str().map(str::to_string).ok_or_else(|| {
            PlatformError::ProviderRejected(format!(
                "linkedin: ugc response missing id: {body}"
            ))
        })
    }
}

fn ugc_payload(author: &str, text: &str, media: &[MediaHandle]) -> serde_json::Value {
    let assets: Vec<&str> = media
        .iter()
        .filter_map(|h| match h {
            MediaHandle::Provider(urn) => Some(urn.as_str()),
            _ => None,
        })
        .collect();

    let category = if assets.is_empty() { "NONE" } else { "IMAGE" };
    let media_entries: Vec<serde_json::Value> = assets
        .iter()
        .map(|urn| json!({ "status": "READY", "media": urn }))
        .collect();

    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": text },
                "shareMediaCategory": category,
                "media": media_entries,
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}
