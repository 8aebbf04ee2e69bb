//! Publish dispatch
//!
//! Takes due scheduled posts and fans each one out to its target
//! platforms. Failures are isolated twice over: a platform failing never
//! stops the post's other platforms, and a post failing never stops the
//! rest of the batch. A post counts as published when at least one
//! platform accepted it; per-platform outcomes land in the activity log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::error::{OmnipostError, PlatformError, Result};
use crate::platforms::{MediaHandle, Publisher};
use crate::tokens::TokenStore;
use crate::types::{ConnectedAccount, PlatformId, PlatformOutcome, Post};

/// Upper bound on posts handled per run.
pub const MAX_BATCH: usize = 50;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DispatchSummary {
    /// Due posts picked up this run.
    pub processed: usize,
    /// Posts where at least one platform succeeded.
    pub published: usize,
    /// Posts where every platform failed, or processing broke down.
    pub failed: usize,
    /// Post-level breakdowns that never reached a platform outcome.
    pub errors: Vec<String>,
}

pub struct PublishDispatcher {
    db: Database,
    tokens: TokenStore,
    publishers: Vec<Box<dyn Publisher>>,
}

impl PublishDispatcher {
    pub fn new(db: Database, tokens: TokenStore, publishers: Vec<Box<dyn Publisher>>) -> Self {
        Self {
            db,
            tokens,
            publishers,
        }
    }

    /// Publish everything due at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DispatchSummary> {
        let due = self.db.due_scheduled_posts(now, MAX_BATCH).await?;
        let mut summary = DispatchSummary {
            processed: due.len(),
            ..Default::default()
        };

        for post in due {
            match self.process_post(&post, now).await {
                Ok(true) => summary.published += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    // The batch keeps going no matter how one post breaks
                    tracing::error!(post = %post.id, error = %e, "post processing failed");
                    summary.errors.push(format!("{}: {e}", post.id));
                    summary.failed += 1;
                    if let Err(mark_err) = self.db.mark_failed(&post.id).await {
                        tracing::error!(post = %post.id, error = %mark_err, "could not mark post failed");
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Fan one post out to all of its platforms. Returns whether any
    /// platform accepted it.
    async fn process_post(&self, post: &Post, now: DateTime<Utc>) -> Result<bool> {
        let mut outcomes = Vec::with_capacity(post.platforms.len());

        for &platform in &post.platforms {
            let result = self.publish_one(post, platform, now).await?;
            match &result {
                Ok(provider_id) => {
                    tracing::info!(post = %post.id, %platform, provider_id, "published");
                }
                Err(e) => {
                    tracing::warn!(post = %post.id, %platform, error = %e, "platform publish failed");
                }
            }
            outcomes.push(PlatformOutcome {
                platform,
                result,
            });
        }

        let any_success = outcomes.iter().any(PlatformOutcome::succeeded);
        if any_success {
            self.db.mark_published(&post.id, now).await?;
        } else {
            self.db.mark_failed(&post.id).await?;
        }

        // The terminal status is already written; a broken audit insert
        // must not turn a post that went out into a failed one.
        if let Err(e) = self.db.record_activity(&post.id, now, &outcomes).await {
            tracing::error!(post = %post.id, error = %e, "could not record platform outcomes");
        }

        Ok(any_success)
    }

    /// One platform's attempt, as an outcome. Only infrastructure errors
    /// (database, config) escape as `Err`.
    async fn publish_one(
        &self,
        post: &Post,
        platform: PlatformId,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<String, PlatformError>> {
        let Some(publisher) = self.publishers.iter().find(|p| p.id() == platform) else {
            return Ok(Err(PlatformError::NotConnected(format!(
                "{platform}: platform not configured"
            ))));
        };

        let account = match self.tokens.get_or_refresh(&post.owner_id, platform, now).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(Err(PlatformError::NotConnected(format!(
                    "{platform}: owner {} has no connected account",
                    post.owner_id
                ))))
            }
            Err(e) => return Ok(Err(as_platform_error(e)?)),
        };

        match self.attempt(publisher.as_ref(), &account, post).await {
            Ok(provider_id) => Ok(Ok(provider_id)),
            // A provider-side auth rejection gets one refresh-and-retry
            Err(PlatformError::AuthExpired(first)) => {
                tracing::debug!(post = %post.id, %platform, "token rejected, refreshing and retrying");
                let account = match self.tokens.force_refresh(&post.owner_id, platform, now).await {
                    Ok(account) => account,
                    Err(e) => return Ok(Err(as_platform_error(e)?)),
                };
                match self.attempt(publisher.as_ref(), &account, post).await {
                    Ok(provider_id) => Ok(Ok(provider_id)),
                    Err(retry) => Ok(Err(with_first_attempt(retry, &first))),
                }
            }
            Err(e) => Ok(Err(e)),
        }
    }

    async fn attempt(
        &self,
        publisher: &dyn Publisher,
        account: &ConnectedAccount,
        post: &Post,
    ) -> std::result::Result<String, PlatformError> {
        for media in &post.media {
            if !publisher.supports(media.kind) {
                return Err(PlatformError::Unsupported(format!(
                    "{}: cannot carry {:?} media",
                    publisher.id(),
                    media.kind
                )));
            }
        }

        let mut handles: Vec<MediaHandle> = Vec::with_capacity(post.media.len());
        for media in &post.media {
            handles.push(publisher.upload_media(account, media).await?);
        }

        let text = post.content_for(publisher.id());
        publisher.publish(account, text, &handles).await
    }
}

/// Platform-level failures become outcomes; anything else is a real error.
fn as_platform_error(e: OmnipostError) -> Result<PlatformError> {
    match e {
        OmnipostError::Platform(pe) => Ok(pe),
        other => Err(other),
    }
}

/// Keep the retry's own classification and fold the original auth
/// rejection into its message.
fn with_first_attempt(retry: PlatformError, first: &str) -> PlatformError {
    let note = format!(" (first attempt: {first})");
    match retry {
        PlatformError::NotConnected(m) => PlatformError::NotConnected(m + &note),
        PlatformError::AuthExpired(m) => {
            PlatformError::AuthExpired(format!("retry after refresh failed: {m}{note}"))
        }
        PlatformError::RateLimited(m) => PlatformError::RateLimited(m + &note),
        PlatformError::ProviderRejected(m) => PlatformError::ProviderRejected(m + &note),
        PlatformError::MediaProcessingFailed(m) => PlatformError::MediaProcessingFailed(m + &note),
        PlatformError::MediaProcessingTimeout(m) => {
            PlatformError::MediaProcessingTimeout(m + &note)
        }
        PlatformError::Network(m) => PlatformError::Network(m + &note),
        PlatformError::Unsupported(m) => PlatformError::Unsupported(m + &note),
    }
}
