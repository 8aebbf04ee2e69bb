//! Database operations for Omnipost

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{DbError, Result};
use crate::types::{
    ConnectedAccount, ContentLibrary, Media, PlatformId, PlatformOutcome, Post, PostStatus,
    WeeklySlot,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // In-memory databases vanish per-connection, so the pool must not
        // hand out more than one.
        if db_path == ":memory:" {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(DbError::MigrationError)?;
            return Ok(Self { pool });
        }

        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Raw pool handle so tests can break the schema out from under us.
    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new post, including its platform target rows
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let overrides = serde_json::to_string(&post.overrides)
            .map_err(|e| DbError::CorruptRow(e.to_string()))?;
        let media = serde_json::to_string(&post.media)
            .map_err(|e| DbError::CorruptRow(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, owner_id, body, overrides, media, status,
                               created_at, scheduled_at, published_at, library_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.body)
        .bind(overrides)
        .bind(media)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.library_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for platform in &post.platforms {
            sqlx::query("INSERT INTO post_platforms (post_id, platform) VALUES (?, ?)")
                .bind(&post.id)
                .bind(platform.as_str())
                .execute(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT id, owner_id, body, overrides, media, status,
                   created_at, scheduled_at, published_at, library_id
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => {
                let platforms = self.post_platforms(r.get("id")).await?;
                Ok(Some(map_post_row(&r, platforms)?))
            }
            None => Ok(None),
        }
    }

    /// Posts in `scheduled` status whose scheduled_at is at or before `now`,
    /// oldest first, capped at `limit`
    pub async fn due_scheduled_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>> {
        use sqlx::Row;

        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, body, overrides, media, status,
                   created_at, scheduled_at, published_at, library_id
            FROM posts
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut posts = Vec::with_capacity(rows.len());
        for r in &rows {
            let platforms = self.post_platforms(r.get("id")).await?;
            posts.push(map_post_row(r, platforms)?);
        }
        Ok(posts)
    }

    /// All slots whose library is not paused
    pub async fn active_slots(&self) -> Result<Vec<WeeklySlot>> {
        use sqlx::Row;

        let rows = sqlx::query(
            r#"
            SELECT s.id, s.owner_id, s.day_of_week, s.hour, s.library_id,
                   s.platforms, s.last_fired_at
            FROM weekly_slots s
            JOIN content_libraries l ON s.library_id = l.id
            WHERE l.paused = 0
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let platforms = parse_platform_list(r.get("platforms"))?;
                Ok(WeeklySlot {
                    id: r.get("id"),
                    owner_id: r.get("owner_id"),
                    day_of_week: r.get::<i64, _>("day_of_week") as u8,
                    hour: r.get::<i64, _>("hour") as u8,
                    library_id: r.get("library_id"),
                    platforms,
                    last_fired_at: r.get("last_fired_at"),
                })
            })
            .collect()
    }

    /// The oldest draft in a library, FIFO by creation time
    pub async fn oldest_draft_in_library(&self, library_id: &str) -> Result<Option<Post>> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT id, owner_id, body, overrides, media, status,
                   created_at, scheduled_at, published_at, library_id
            FROM posts
            WHERE library_id = ? AND status = 'draft'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(library_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(r) => {
                let platforms = self.post_platforms(r.get("id")).await?;
                Ok(Some(map_post_row(&r, platforms)?))
            }
            None => Ok(None),
        }
    }

    /// Promote a draft to `scheduled`, stamping its publish time and
    /// replacing its platform targets with the slot's
    pub async fn promote_post(
        &self,
        post_id: &str,
        scheduled_at: DateTime<Utc>,
        platforms: &BTreeSet<PlatformId>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            UPDATE posts SET status = 'scheduled', scheduled_at = ?
            WHERE id = ? AND status = 'draft'
            "#,
        )
        .bind(scheduled_at)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM post_platforms WHERE post_id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        for platform in platforms {
            sqlx::query("INSERT INTO post_platforms (post_id, platform) VALUES (?, ?)")
                .bind(post_id)
                .bind(platform.as_str())
                .execute(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Record that a slot fired
    pub async fn mark_slot_fired(&self, slot_id: &str, fired_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE weekly_slots SET last_fired_at = ? WHERE id = ?")
            .bind(fired_at)
            .bind(slot_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Mark a post published
    pub async fn mark_published(&self, post_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE posts SET status = 'published', published_at = ? WHERE id = ?")
            .bind(at)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Mark a post failed, leaving published_at NULL
    pub async fn mark_failed(&self, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET status = 'failed' WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Get one owner's connection for a platform, if any
    pub async fn connected_account(
        &self,
        owner_id: &str,
        platform: PlatformId,
    ) -> Result<Option<ConnectedAccount>> {
        use sqlx::Row;

        let row = sqlx::query(
            r#"
            SELECT owner_id, platform, access_token, refresh_token, expires_at, platform_user_id
            FROM connected_accounts
            WHERE owner_id = ? AND platform = ?
            "#,
        )
        .bind(owner_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| {
            let platform: PlatformId = r
                .get::<String, _>("platform")
                .parse()
                .map_err(DbError::CorruptRow)?;
            Ok(ConnectedAccount {
                owner_id: r.get("owner_id"),
                platform,
                access_token: r.get("access_token"),
                refresh_token: r.get("refresh_token"),
                expires_at: r.get("expires_at"),
                platform_user_id: r.get("platform_user_id"),
            })
        })
        .transpose()
    }

    /// Persist freshly issued tokens. Keeps the old refresh token when the
    /// provider did not rotate it.
    pub async fn update_account_tokens(
        &self,
        owner_id: &str,
        platform: PlatformId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE connected_accounts
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                expires_at = ?
            WHERE owner_id = ? AND platform = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(owner_id)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// The owner's IANA timezone string, if set
    pub async fn owner_timezone(&self, owner_id: &str) -> Result<Option<String>> {
        use sqlx::Row;

        let row = sqlx::query("SELECT timezone FROM profiles WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.and_then(|r| r.get("timezone")))
    }

    /// Append a dispatch record to the activity log
    pub async fn record_activity(
        &self,
        post_id: &str,
        at: DateTime<Utc>,
        outcomes: &[PlatformOutcome],
    ) -> Result<()> {
        let summary: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(provider_id) => serde_json::json!({
                    "platform": o.platform.as_str(),
                    "ok": true,
                    "providerId": provider_id,
                }),
                Err(e) => serde_json::json!({
                    "platform": o.platform.as_str(),
                    "ok": false,
                    "error": e.to_string(),
                }),
            })
            .collect();
        let outcomes_json = serde_json::to_string(&summary)
            .map_err(|e| DbError::CorruptRow(e.to_string()))?;

        sqlx::query("INSERT INTO activity_log (post_id, recorded_at, outcomes) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(at)
            .bind(outcomes_json)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Create or update an owner profile
    pub async fn upsert_profile(&self, owner_id: &str, timezone: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (owner_id, timezone) VALUES (?, ?)
            ON CONFLICT(owner_id) DO UPDATE SET timezone = excluded.timezone
            "#,
        )
        .bind(owner_id)
        .bind(timezone)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Create a content library
    pub async fn create_library(&self, library: &ContentLibrary) -> Result<()> {
        sqlx::query(
            "INSERT INTO content_libraries (id, owner_id, name, paused) VALUES (?, ?, ?, ?)",
        )
        .bind(&library.id)
        .bind(&library.owner_id)
        .bind(&library.name)
        .bind(library.paused as i64)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Pause or resume a library
    pub async fn set_library_paused(&self, library_id: &str, paused: bool) -> Result<()> {
        sqlx::query("UPDATE content_libraries SET paused = ? WHERE id = ?")
            .bind(paused as i64)
            .bind(library_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Create a weekly slot
    pub async fn create_slot(&self, slot: &WeeklySlot) -> Result<()> {
        let platforms: Vec<&str> = slot.platforms.iter().map(|p| p.as_str()).collect();
        let platforms_json = serde_json::to_string(&platforms)
            .map_err(|e| DbError::CorruptRow(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO weekly_slots (id, owner_id, day_of_week, hour, library_id,
                                      platforms, last_fired_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&slot.id)
        .bind(&slot.owner_id)
        .bind(slot.day_of_week as i64)
        .bind(slot.hour as i64)
        .bind(&slot.library_id)
        .bind(platforms_json)
        .bind(slot.last_fired_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Create or replace a connected account
    pub async fn upsert_account(&self, account: &ConnectedAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connected_accounts
                (owner_id, platform, access_token, refresh_token, expires_at, platform_user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                platform_user_id = excluded.platform_user_id
            "#,
        )
        .bind(&account.owner_id)
        .bind(account.platform.as_str())
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at)
        .bind(&account.platform_user_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn post_platforms(&self, post_id: String) -> Result<BTreeSet<PlatformId>> {
        use sqlx::Row;

        let rows = sqlx::query("SELECT platform FROM post_platforms WHERE post_id = ?")
            .bind(&post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                r.get::<String, _>("platform")
                    .parse::<PlatformId>()
                    .map_err(|e| DbError::CorruptRow(e).into())
            })
            .collect()
    }
}

fn map_post_row(row: &sqlx::sqlite::SqliteRow, platforms: BTreeSet<PlatformId>) -> Result<Post> {
    use sqlx::Row;

    let overrides: BTreeMap<PlatformId, String> =
        serde_json::from_str(&row.get::<String, _>("overrides"))
            .map_err(|e| DbError::CorruptRow(format!("overrides: {e}")))?;
    let media: Vec<Media> = serde_json::from_str(&row.get::<String, _>("media"))
        .map_err(|e| DbError::CorruptRow(format!("media: {e}")))?;
    let status: PostStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(DbError::CorruptRow)?;

    Ok(Post {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        body: row.get("body"),
        overrides,
        media,
        platforms,
        status,
        created_at: row.get("created_at"),
        scheduled_at: row.get("scheduled_at"),
        published_at: row.get("published_at"),
        library_id: row.get("library_id"),
    })
}

fn parse_platform_list(raw: String) -> Result<BTreeSet<PlatformId>> {
    let names: Vec<String> = serde_json::from_str(&raw)
        .map_err(|e| DbError::CorruptRow(format!("platforms: {e}")))?;
    names
        .iter()
        .map(|n| n.parse::<PlatformId>().map_err(|e| DbError::CorruptRow(e).into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use chrono::Duration;

    async fn test_db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    fn draft(id: &str, library_id: &str, created_at: DateTime<Utc>) -> Post {
        Post {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            body: format!("body of {id}"),
            overrides: BTreeMap::new(),
            media: vec![],
            platforms: BTreeSet::new(),
            status: PostStatus::Draft,
            created_at,
            scheduled_at: None,
            published_at: None,
            library_id: Some(library_id.to_string()),
        }
    }

    async fn seed_library(db: &Database, id: &str, paused: bool) {
        db.create_library(&ContentLibrary {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            name: format!("library {id}"),
            paused,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;

        let mut post = draft("post-1", "lib-1", Utc::now());
        post.overrides
            .insert(PlatformId::X, "short version".to_string());
        post.platforms.insert(PlatformId::X);
        post.platforms.insert(PlatformId::Bluesky);
        post.media.push(Media {
            id: "m1".to_string(),
            kind: crate::types::MediaKind::Image,
            url: "https://cdn.example/a.png".to_string(),
            alt_text: None,
        });
        db.create_post(&post).await.unwrap();

        let loaded = db.get_post("post-1").await.unwrap().unwrap();
        assert_eq!(loaded.body, "body of post-1");
        assert_eq!(loaded.content_for(PlatformId::X), "short version");
        assert_eq!(loaded.platforms.len(), 2);
        assert_eq!(loaded.media.len(), 1);
        assert_eq!(loaded.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_get_missing_post() {
        let db = test_db().await;
        assert!(db.get_post("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_scheduled_posts_ordering_and_cutoff() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        for (id, offset_mins, status) in [
            ("late", -5i64, PostStatus::Scheduled),
            ("early", -60, PostStatus::Scheduled),
            ("future", 60, PostStatus::Scheduled),
            ("draft", -60, PostStatus::Draft),
        ] {
            let mut post = draft(id, "lib-1", now - Duration::hours(2));
            post.status = status;
            post.scheduled_at = Some(now + Duration::minutes(offset_mins));
            db.create_post(&post).await.unwrap();
        }

        let due = db.due_scheduled_posts(now, 50).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_due_scheduled_posts_limit() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        for i in 0..5 {
            let mut post = draft(&format!("p{i}"), "lib-1", now);
            post.status = PostStatus::Scheduled;
            post.scheduled_at = Some(now - Duration::minutes(10 - i));
            db.create_post(&post).await.unwrap();
        }

        let due = db.due_scheduled_posts(now, 3).await.unwrap();
        assert_eq!(due.len(), 3);
    }

    #[tokio::test]
    async fn test_active_slots_excludes_paused_libraries() {
        let db = test_db().await;
        seed_library(&db, "lib-live", false).await;
        seed_library(&db, "lib-paused", true).await;

        for (slot_id, lib) in [("slot-a", "lib-live"), ("slot-b", "lib-paused")] {
            db.create_slot(&WeeklySlot {
                id: slot_id.to_string(),
                owner_id: "owner-1".to_string(),
                day_of_week: 1,
                hour: 9,
                library_id: lib.to_string(),
                platforms: BTreeSet::from([PlatformId::X]),
                last_fired_at: None,
            })
            .await
            .unwrap();
        }

        let slots = db.active_slots().await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, "slot-a");
        assert_eq!(slots[0].platforms, BTreeSet::from([PlatformId::X]));
    }

    #[tokio::test]
    async fn test_oldest_draft_is_fifo() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        db.create_post(&draft("newer", "lib-1", now)).await.unwrap();
        db.create_post(&draft("older", "lib-1", now - Duration::days(1)))
            .await
            .unwrap();

        let oldest = db.oldest_draft_in_library("lib-1").await.unwrap().unwrap();
        assert_eq!(oldest.id, "older");
    }

    #[tokio::test]
    async fn test_oldest_draft_skips_non_drafts() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        let mut published = draft("done", "lib-1", now - Duration::days(2));
        published.status = PostStatus::Published;
        db.create_post(&published).await.unwrap();
        db.create_post(&draft("pending", "lib-1", now)).await.unwrap();

        let oldest = db.oldest_draft_in_library("lib-1").await.unwrap().unwrap();
        assert_eq!(oldest.id, "pending");
    }

    #[tokio::test]
    async fn test_promote_post_sets_schedule_and_platforms() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        let mut post = draft("post-1", "lib-1", now);
        post.platforms.insert(PlatformId::X);
        db.create_post(&post).await.unwrap();

        let targets = BTreeSet::from([PlatformId::Facebook, PlatformId::Pinterest]);
        db.promote_post("post-1", now, &targets).await.unwrap();

        let loaded = db.get_post("post-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Scheduled);
        assert!(loaded.scheduled_at.is_some());
        assert_eq!(loaded.platforms, targets);
    }

    #[tokio::test]
    async fn test_promote_is_noop_for_non_draft() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        let mut post = draft("post-1", "lib-1", now);
        post.status = PostStatus::Published;
        post.published_at = Some(now);
        db.create_post(&post).await.unwrap();

        db.promote_post("post-1", now, &BTreeSet::from([PlatformId::X]))
            .await
            .unwrap();

        let loaded = db.get_post("post-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_mark_published_and_failed() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        let now = Utc::now();

        db.create_post(&draft("ok", "lib-1", now)).await.unwrap();
        db.create_post(&draft("bad", "lib-1", now)).await.unwrap();

        db.mark_published("ok", now).await.unwrap();
        db.mark_failed("bad").await.unwrap();

        let ok = db.get_post("ok").await.unwrap().unwrap();
        assert_eq!(ok.status, PostStatus::Published);
        assert!(ok.published_at.is_some());

        let bad = db.get_post("bad").await.unwrap().unwrap();
        assert_eq!(bad.status, PostStatus::Failed);
        assert!(bad.published_at.is_none());
    }

    #[tokio::test]
    async fn test_slot_watermark_roundtrip() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;

        db.create_slot(&WeeklySlot {
            id: "slot-1".to_string(),
            owner_id: "owner-1".to_string(),
            day_of_week: 0,
            hour: 18,
            library_id: "lib-1".to_string(),
            platforms: BTreeSet::from([PlatformId::Tiktok]),
            last_fired_at: None,
        })
        .await
        .unwrap();

        let fired_at = Utc::now();
        db.mark_slot_fired("slot-1", fired_at).await.unwrap();

        let slots = db.active_slots().await.unwrap();
        let stored = slots[0].last_fired_at.unwrap();
        assert!((stored - fired_at).num_seconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_account_roundtrip_and_token_update() {
        let db = test_db().await;
        let now = Utc::now();

        db.upsert_account(&ConnectedAccount {
            owner_id: "owner-1".to_string(),
            platform: PlatformId::X,
            access_token: "old-access".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(now - Duration::minutes(5)),
            platform_user_id: Some("12345".to_string()),
        })
        .await
        .unwrap();

        // Provider did not rotate the refresh token
        db.update_account_tokens(
            "owner-1",
            PlatformId::X,
            "new-access",
            None,
            Some(now + Duration::hours(2)),
        )
        .await
        .unwrap();

        let account = db
            .connected_account("owner-1", PlatformId::X)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.access_token, "new-access");
        assert_eq!(account.refresh_token.as_deref(), Some("refresh-1"));
        assert!(!account.is_expired(now));
    }

    #[tokio::test]
    async fn test_token_update_with_rotation() {
        let db = test_db().await;

        db.upsert_account(&ConnectedAccount {
            owner_id: "owner-1".to_string(),
            platform: PlatformId::Tiktok,
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_at: None,
            platform_user_id: None,
        })
        .await
        .unwrap();

        db.update_account_tokens("owner-1", PlatformId::Tiktok, "a2", Some("r2"), None)
            .await
            .unwrap();

        let account = db
            .connected_account("owner-1", PlatformId::Tiktok)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let db = test_db().await;
        let account = db
            .connected_account("owner-1", PlatformId::Linkedin)
            .await
            .unwrap();
        assert!(account.is_none());
    }

    #[tokio::test]
    async fn test_owner_timezone() {
        let db = test_db().await;
        assert!(db.owner_timezone("owner-1").await.unwrap().is_none());

        db.upsert_profile("owner-1", Some("America/New_York"))
            .await
            .unwrap();
        assert_eq!(
            db.owner_timezone("owner-1").await.unwrap().as_deref(),
            Some("America/New_York")
        );

        db.upsert_profile("owner-2", None).await.unwrap();
        assert!(db.owner_timezone("owner-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_activity() {
        let db = test_db().await;
        seed_library(&db, "lib-1", false).await;
        db.create_post(&draft("post-1", "lib-1", Utc::now()))
            .await
            .unwrap();

        let outcomes = vec![
            PlatformOutcome {
                platform: PlatformId::X,
                result: Ok("190123".to_string()),
            },
            PlatformOutcome {
                platform: PlatformId::Facebook,
                result: Err(PlatformError::RateLimited("slow down".to_string())),
            },
        ];
        db.record_activity("post-1", Utc::now(), &outcomes)
            .await
            .unwrap();
    }
}
