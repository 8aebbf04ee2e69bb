//! Batch engine
//!
//! One batch run is the whole scheduled-publishing cycle: evaluate weekly
//! slots (promoting due drafts), then dispatch everything scheduled and
//! due. The combined report is what the cron surface returns to callers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::db::Database;
use crate::dispatch::{DispatchSummary, PublishDispatcher};
use crate::error::Result;
use crate::platforms::create_publishers;
use crate::slots::{SlotScheduler, SlotSummary};
use crate::tokens::{OauthRefresher, TokenStore};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// False when any post broke down before reaching platform outcomes.
    pub success: bool,
    pub slots: SlotSummary,
    pub publishing: DispatchSummary,
}

pub struct Engine {
    slots: SlotScheduler,
    dispatcher: PublishDispatcher,
}

impl Engine {
    pub fn new(slots: SlotScheduler, dispatcher: PublishDispatcher) -> Self {
        Self { slots, dispatcher }
    }

    /// Wire up the full engine from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let publishers = create_publishers(config)?;
        let tokens = TokenStore::new(
            db.clone(),
            Box::new(OauthRefresher::new(config.platforms.clone())),
        );
        Ok(Self {
            slots: SlotScheduler::new(db.clone()),
            dispatcher: PublishDispatcher::new(db, tokens, publishers),
        })
    }

    /// Run one full cycle: slots first, so a draft promoted for this very
    /// hour publishes in the same batch.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let slots = self.slots.run(now).await?;
        let publishing = self.dispatcher.run(now).await?;

        tracing::info!(
            promoted = slots.promoted,
            processed = publishing.processed,
            published = publishing.published,
            failed = publishing.failed,
            "batch complete"
        );

        Ok(BatchReport {
            success: publishing.errors.is_empty(),
            slots,
            publishing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPublisher;
    use crate::tokens::{StaticRefresher, TokenGrant};
    use crate::types::{ConnectedAccount, ContentLibrary, PlatformId, Post, PostStatus, WeeklySlot};
    use chrono::{TimeZone, Utc};
    use std::collections::{BTreeMap, BTreeSet};

    #[tokio::test]
    async fn test_promotion_and_publish_in_one_batch() {
        let db = Database::new(":memory:").await.unwrap();
        db.upsert_profile("owner-1", Some("UTC")).await.unwrap();
        db.create_library(&ContentLibrary {
            id: "lib-1".to_string(),
            owner_id: "owner-1".to_string(),
            name: "evergreen".to_string(),
            paused: false,
        })
        .await
        .unwrap();
        db.create_slot(&WeeklySlot {
            id: "slot-1".to_string(),
            owner_id: "owner-1".to_string(),
            day_of_week: 1,
            hour: 9,
            library_id: "lib-1".to_string(),
            platforms: BTreeSet::from([PlatformId::X]),
            last_fired_at: None,
        })
        .await
        .unwrap();
        db.upsert_account(&ConnectedAccount {
            owner_id: "owner-1".to_string(),
            platform: PlatformId::X,
            access_token: "tok".to_string(),
            refresh_token: None,
            expires_at: None,
            platform_user_id: None,
        })
        .await
        .unwrap();

        let now = Utc.with_ymd_and_hms(2025, 6, 9, 9, 5, 0).unwrap();
        db.create_post(&Post {
            id: "draft-1".to_string(),
            owner_id: "owner-1".to_string(),
            body: "evergreen tip".to_string(),
            overrides: BTreeMap::new(),
            media: vec![],
            platforms: BTreeSet::new(),
            status: PostStatus::Draft,
            created_at: now - chrono::Duration::days(2),
            scheduled_at: None,
            published_at: None,
            library_id: Some("lib-1".to_string()),
        })
        .await
        .unwrap();

        let tokens = TokenStore::new(
            db.clone(),
            Box::new(StaticRefresher::new(TokenGrant {
                access_token: "unused".to_string(),
                refresh_token: None,
                expires_in: None,
            })),
        );
        let engine = Engine::new(
            SlotScheduler::new(db.clone()),
            PublishDispatcher::new(
                db.clone(),
                tokens,
                vec![Box::new(MockPublisher::new(PlatformId::X))],
            ),
        );

        let report = engine.run_batch(now).await.unwrap();
        assert!(report.success);
        assert_eq!(report.slots.promoted, 1);
        assert_eq!(report.publishing.processed, 1);
        assert_eq!(report.publishing.published, 1);

        let post = db.get_post("draft-1").await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let report = BatchReport {
            success: true,
            slots: Default::default(),
            publishing: Default::default(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["slots"]["promoted"], 0);
        assert_eq!(json["publishing"]["processed"], 0);
    }
}
