//! OAuth token storage and refresh
//!
//! Access tokens live in the `connected_accounts` table. The store hands
//! out a token that is valid at call time, refreshing through the
//! platform's token endpoint when the stored one has expired. Rotated
//! refresh tokens are persisted before the new access token is returned,
//! so a crash mid-dispatch never strands a connection on a consumed
//! refresh token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::config::{OauthAppConfig, PlatformsConfig};
use crate::db::Database;
use crate::error::{PlatformError, Result};
use crate::types::{ConnectedAccount, PlatformId};

/// A freshly issued token grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present only when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

/// Exchanges a refresh token for a new grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        platform: PlatformId,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, PlatformError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// Refreshes tokens against the real provider endpoints using the app
/// credentials from config.
pub struct OauthRefresher {
    client: reqwest::Client,
    platforms: PlatformsConfig,
}

impl OauthRefresher {
    pub fn new(platforms: PlatformsConfig) -> Self {
        Self {
            client: crate::platforms::http_client(),
            platforms,
        }
    }

    fn app_config(&self, platform: PlatformId) -> Option<&OauthAppConfig> {
        match platform {
            PlatformId::X => self.platforms.x.as_ref(),
            PlatformId::Facebook => self.platforms.facebook.as_ref(),
            PlatformId::Instagram => self.platforms.instagram.as_ref(),
            PlatformId::Linkedin => self.platforms.linkedin.as_ref(),
            PlatformId::Pinterest => self.platforms.pinterest.as_ref(),
            PlatformId::Tiktok => self.platforms.tiktok.as_ref(),
            // Bluesky refresh is DPoP-bound and handled separately
            PlatformId::Bluesky => None,
        }
    }

    fn token_endpoint(app: &OauthAppConfig, platform: PlatformId) -> String {
        if let Some(base) = &app.api_base {
            return format!("{}/oauth/token", base.trim_end_matches('/'));
        }
        match platform {
            PlatformId::X => "https://api.x.com/2/oauth2/token".to_string(),
            PlatformId::Facebook | PlatformId::Instagram => {
                "https://graph.facebook.com/v19.0/oauth/access_token".to_string()
            }
            PlatformId::Linkedin => "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            PlatformId::Pinterest => "https://api.pinterest.com/v5/oauth/token".to_string(),
            PlatformId::Tiktok => "https://open.tiktokapis.com/v2/oauth/token/".to_string(),
            PlatformId::Bluesky => String::new(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OauthRefresher {
    async fn refresh(
        &self,
        platform: PlatformId,
        refresh_token: &str,
    ) -> std::result::Result<TokenGrant, PlatformError> {
        if platform == PlatformId::Bluesky {
            let config = self.platforms.bluesky.as_ref().ok_or_else(|| {
                PlatformError::NotConnected("bluesky: no service configured".to_string())
            })?;
            return crate::platforms::bluesky::refresh_session(&self.client, config, refresh_token)
                .await;
        }

        let app = self.app_config(platform).ok_or_else(|| {
            PlatformError::NotConnected(format!("{platform}: no app credentials configured"))
        })?;

        let response = self
            .client
            .post(Self::token_endpoint(app, platform))
            .basic_auth(&app.client_id, Some(&app.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", app.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("{platform}: token refresh: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A refused refresh means the connection itself is dead
            return Err(PlatformError::AuthExpired(format!(
                "{platform}: refresh rejected: HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Network(format!("{platform}: token refresh: {e}")))?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

/// Issues valid access tokens for connected accounts, refreshing lazily.
pub struct TokenStore {
    db: Database,
    refresher: Box<dyn TokenRefresher>,
}

impl TokenStore {
    pub fn new(db: Database, refresher: Box<dyn TokenRefresher>) -> Self {
        Self { db, refresher }
    }

    /// Return the stored account with a token valid at `now`, refreshing
    /// first when the stored one has expired.
    pub async fn get_or_refresh(
        &self,
        owner_id: &str,
        platform: PlatformId,
        now: DateTime<Utc>,
    ) -> Result<Option<ConnectedAccount>> {
        let Some(account) = self.db.connected_account(owner_id, platform).await? else {
            return Ok(None);
        };

        if !account.is_expired(now) {
            return Ok(Some(account));
        }

        Ok(Some(self.refresh_account(account, now).await?))
    }

    /// Refresh unconditionally, for retry after a provider rejected a
    /// token that looked fresh locally.
    pub async fn force_refresh(
        &self,
        owner_id: &str,
        platform: PlatformId,
        now: DateTime<Utc>,
    ) -> Result<ConnectedAccount> {
        let account = self
            .db
            .connected_account(owner_id, platform)
            .await?
            .ok_or_else(|| {
                PlatformError::NotConnected(format!("{platform}: account for {owner_id} vanished"))
            })?;

        self.refresh_account(account, now).await
    }

    async fn refresh_account(
        &self,
        account: ConnectedAccount,
        now: DateTime<Utc>,
    ) -> Result<ConnectedAccount> {
        let refresh_token = account.refresh_token.as_deref().ok_or_else(|| {
            PlatformError::AuthExpired(format!(
                "{}: token expired and no refresh token stored",
                account.platform
            ))
        })?;

        tracing::debug!(
            platform = %account.platform,
            owner = %account.owner_id,
            "refreshing access token"
        );

        let grant = self
            .refresher
            .refresh(account.platform, refresh_token)
            .await?;
        let expires_at = grant.expires_at(now);

        // Persist before use so a rotated refresh token is never lost
        self.db
            .update_account_tokens(
                &account.owner_id,
                account.platform,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        Ok(ConnectedAccount {
            owner_id: account.owner_id,
            platform: account.platform,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token.or(account.refresh_token),
            expires_at,
            platform_user_id: account.platform_user_id,
        })
    }
}

/// Refresher returning canned grants, public so integration tests can
/// exercise dispatch without a network.
pub struct StaticRefresher {
    grant: TokenGrant,
    calls: std::sync::atomic::AtomicUsize,
    fail: bool,
}

impl StaticRefresher {
    pub fn new(grant: TokenGrant) -> Self {
        Self {
            grant,
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            grant: TokenGrant {
                access_token: String::new(),
                refresh_token: None,
                expires_in: None,
            },
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(
        &self,
        platform: PlatformId,
        _refresh_token: &str,
    ) -> std::result::Result<TokenGrant, PlatformError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            return Err(PlatformError::AuthExpired(format!(
                "{platform}: refresh rejected"
            )));
        }
        Ok(self.grant.clone())
    }
}
