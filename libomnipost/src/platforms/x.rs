//! X (Twitter) adapter
//!
//! Text posts go through the v2 tweet endpoint. Images use the one-shot
//! media upload; videos go through the chunked initialize/append/finalize
//! flow with processing polls.

use async_trait::async_trait;
use serde_json::json;

use crate::config::OauthAppConfig;
use crate::error::PlatformError;
use crate::platforms::upload::{
    ChunkedUploader, MediaTransport, ProcessingState, ProcessingStatus,
};
use crate::platforms::{fetch_media_bytes, read_json, MediaHandle, Publisher};
use crate::types::{ConnectedAccount, Media, MediaKind, PlatformId};

const DEFAULT_API_BASE: &str = "https://api.x.com";

pub struct XPublisher {
    client: reqwest::Client,
    app: OauthAppConfig,
}

impl XPublisher {
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

    async fn upload_image(
        &self,
        token: &str,
        media: &Media,
        bytes: Vec<u8>,
    ) -> Result<String, PlatformError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(media.id.clone());
        let form = reqwest::multipart::Form::new()
            .part("media", part)
            .text("media_category", "tweet_image");

        let response = self
            .client
            .post(format!("{}/2/media/upload", self.base()))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: media upload: {e}")))?;

        let body = read_json(PlatformId::X, response).await?;
        media_id_from(&body)
    }
}

#[async_trait]
impl Publisher for XPublisher {
    fn id(&self) -> PlatformId {
        PlatformId::X
    }

    fn supports(&self, _kind: MediaKind) -> bool {
        true
    }

    async fn upload_media(
        &self,
        account: &ConnectedAccount,
        media: &Media,
    ) -> Result<MediaHandle, PlatformError> {
        let bytes = fetch_media_bytes(&self.client, PlatformId::X, media).await?;

        let media_id = match media.kind {
            MediaKind::Image => {
                self.upload_image(&account.access_token, media, bytes).await?
            }
            MediaKind::Video => {
                let transport = XMediaTransport {
                    client: self.client.clone(),
                    base: self.base().to_string(),
                    token: account.access_token.clone(),
                };
                ChunkedUploader::new().upload(&transport, media, &bytes).await?
            }
        };

        Ok(MediaHandle::Provider(media_id))
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        text: &str,
        media: &[MediaHandle],
    ) -> Result<String, PlatformError> {
        let payload = tweet_payload(text, media);

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base()))
            .bearer_auth(&account.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: create tweet: {e}")))?;

        let body = read_json(PlatformId::X, response).await?;
        body["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::ProviderRejected(format!("x: tweet response missing id: {body}"))
            })
    }
}

fn tweet_payload(text: &str, media: &[MediaHandle]) -> serde_json::Value {
    let media_ids: Vec<&str> = media
        .iter()
        .filter_map(|h| match h {
            MediaHandle::Provider(id) => Some(id.as_str()),
            _ => None,
        })
        .collect();

    if media_ids.is_empty() {
        json!({ "text": text })
    } else {
        json!({ "text": text, "media": { "media_ids": media_ids } })
    }
}

/// Chunked upload transport over the v2 media endpoints.
struct XMediaTransport {
    client: reqwest::Client,
    base: String,
    token: String,
}

#[async_trait]
impl MediaTransport for XMediaTransport {
    async fn initialize(
        &self,
        media: &Media,
        total_bytes: usize,
    ) -> Result<String, PlatformError> {
        let response = self
            .client
            .post(format!("{}/2/media/upload/initialize", self.base))
            .bearer_auth(&self.token)
            .json(&json!({
                "media_type": guess_mime(media),
                "total_bytes": total_bytes,
                "media_category": "tweet_video",
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: media initialize: {e}")))?;

        let body = read_json(PlatformId::X, response).await?;
        media_id_from(&body)
    }

    async fn append(
        &self,
        media_id: &str,
        segment_index: usize,
        chunk: &[u8],
    ) -> Result<(), PlatformError> {
        let part = reqwest::multipart::Part::bytes(chunk.to_vec());
        let form = reqwest::multipart::Form::new()
            .part("media", part)
            .text("segment_index", segment_index.to_string());

        let response = self
            .client
            .post(format!("{}/2/media/upload/{}/append", self.base, media_id))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: media append: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(PlatformId::X, status, &detail));
        }
        Ok(())
    }

    async fn finalize(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError> {
        let response = self
            .client
            .post(format!("{}/2/media/upload/{}/finalize", self.base, media_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: media finalize: {e}")))?;

        let body = read_json(PlatformId::X, response).await?;
        Ok(processing_status_from(&body))
    }

    async fn status(&self, media_id: &str) -> Result<ProcessingStatus, PlatformError> {
        let response = self
            .client
            .get(format!("{}/2/media/upload", self.base))
            .query(&[("command", "STATUS"), ("media_id", media_id)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("x: media status: {e}")))?;

        let body = read_json(PlatformId::X, response).await?;
        Ok(processing_status_from(&body))
    }
}

fn media_id_from(body: &serde_json::Value) -> Result<String, PlatformError> {
    body["data"]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            PlatformError::ProviderRejected(format!("x: media response missing id: {body}"))
        })
}

/// No processing_info in the response means the media is already usable.
fn processing_status_from(body: &serde_json::Value) -> ProcessingStatus {
    let info = &body["data"]["processing_info"];
    if info.is_null() {
        return ProcessingStatus::succeeded();
    }

    let state = match info["state"].as_str() {
        Some("succeeded") => ProcessingState::Succeeded,
        Some("failed") => ProcessingState::Failed,
        Some("in_progress") => ProcessingState::InProgress,
        _ => ProcessingState::Pending,
    };

    ProcessingStatus {
        state,
        check_after_secs: info["check_after_secs"].as_u64(),
    }
}

fn guess_mime(media: &Media) -> &'static str {
    match media.kind {
        MediaKind::Image => "image/jpeg",
        MediaKind::Video => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tweet_payload_text_only() {
        let payload = tweet_payload("hello", &[]);
        assert_eq!(payload, json!({ "text": "hello" }));
    }

    #[test]
    fn test_tweet_payload_with_media() {
        let handles = vec![
            MediaHandle::Provider("101".to_string()),
            MediaHandle::Provider("102".to_string()),
        ];
        let payload = tweet_payload("hello", &handles);
        assert_eq!(
            payload,
            json!({ "text": "hello", "media": { "media_ids": ["101", "102"] } })
        );
    }

    #[test]
    fn test_tweet_payload_ignores_non_provider_handles() {
        let handles = vec![MediaHandle::Url("https://cdn.example/a.png".to_string())];
        let payload = tweet_payload("hello", &handles);
        assert_eq!(payload, json!({ "text": "hello" }));
    }

    #[test]
    fn test_processing_status_absent_means_done() {
        let body = json!({ "data": { "id": "7" } });
        let status = processing_status_from(&body);
        assert_eq!(status.state, ProcessingState::Succeeded);
    }

    #[test]
    fn test_processing_status_in_progress() {
        let body = json!({
            "data": { "id": "7", "processing_info": { "state": "in_progress", "check_after_secs": 5 } }
        });
        let status = processing_status_from(&body);
        assert_eq!(status.state, ProcessingState::InProgress);
        assert_eq!(status.check_after_secs, Some(5));
    }

    #[test]
    fn test_processing_status_failed() {
        let body = json!({
            "data": { "id": "7", "processing_info": { "state": "failed" } }
        });
        assert_eq!(processing_status_from(&body).state, ProcessingState::Failed);
    }

    #[test]
    fn test_media_id_missing_is_rejection() {
        let err = media_id_from(&json!({ "errors": [{"message": "bad"}] })).unwrap_err();
        assert!(matches!(err, PlatformError::ProviderRejected(_)));
    }
}
