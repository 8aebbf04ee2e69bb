//! Core types for Omnipost

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

/// The closed set of supported publishing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    X,
    Facebook,
    Instagram,
    Bluesky,
    Linkedin,
    Pinterest,
    Tiktok,
}

impl PlatformId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::X => "x",
            PlatformId::Facebook => "facebook",
            PlatformId::Instagram => "instagram",
            PlatformId::Bluesky => "bluesky",
            PlatformId::Linkedin => "linkedin",
            PlatformId::Pinterest => "pinterest",
            PlatformId::Tiktok => "tiktok",
        }
    }

    pub fn all() -> [PlatformId; 7] {
        [
            PlatformId::X,
            PlatformId::Facebook,
            PlatformId::Instagram,
            PlatformId::Bluesky,
            PlatformId::Linkedin,
            PlatformId::Pinterest,
            PlatformId::Tiktok,
        ]
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(PlatformId::X),
            "facebook" => Ok(PlatformId::Facebook),
            "instagram" => Ok(PlatformId::Instagram),
            "bluesky" => Ok(PlatformId::Bluesky),
            "linkedin" => Ok(PlatformId::Linkedin),
            "pinterest" => Ok(PlatformId::Pinterest),
            "tiktok" => Ok(PlatformId::Tiktok),
            _ => Err(format!("Unknown platform: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            _ => Err(format!("Unknown post status: {}", s)),
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// A media attachment referenced by URL.
///
/// Omnipost never stores media bytes itself. Adapters either hand the URL
/// straight to the provider or download the bytes and re-upload them,
/// depending on what the provider's API accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    #[serde(rename = "altText", default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    /// Base text used for any platform without an override.
    pub body: String,
    /// Per-platform text overrides keyed by target platform.
    pub overrides: BTreeMap<PlatformId, String>,
    pub media: Vec<Media>,
    pub platforms: BTreeSet<PlatformId>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub library_id: Option<String>,
}

impl Post {
    /// Resolve the text to publish on a platform: the override when one
    /// exists, otherwise the base body.
    pub fn content_for(&self, platform: PlatformId) -> &str {
        self.overrides
            .get(&platform)
            .map(String::as_str)
            .unwrap_or(&self.body)
    }
}

/// A recurring weekly publication slot.
///
/// `day_of_week` uses 0 = Sunday through 6 = Saturday, evaluated in the
/// owner's local timezone. `hour` is the local hour 0..=23.
#[derive(Debug, Clone)]
pub struct WeeklySlot {
    pub id: String,
    pub owner_id: String,
    pub day_of_week: u8,
    pub hour: u8,
    pub library_id: String,
    pub platforms: BTreeSet<PlatformId>,
    /// When this slot last promoted a draft, used to suppress repeat
    /// firings within the same local hour.
    pub last_fired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ContentLibrary {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub paused: bool,
}

/// Stored OAuth credentials for one owner on one platform.
#[derive(Debug, Clone)]
pub struct ConnectedAccount {
    pub owner_id: String,
    pub platform: PlatformId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider-side identifier: page id for Facebook, IG user id for
    /// Instagram, board id for Pinterest, DID for Bluesky, and so on.
    pub platform_user_id: Option<String>,
}

impl ConnectedAccount {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now,
            None => false,
        }
    }
}

/// The result of attempting to publish one post to one platform.
#[derive(Debug, Clone)]
pub struct PlatformOutcome {
    pub platform: PlatformId,
    /// Provider post id on success.
    pub result: Result<String, PlatformError>,
}

impl PlatformOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}
