//! Omnipost - scheduled multi-platform social publishing
//!
//! This library implements the whole publishing cycle: weekly slots
//! promote drafts from content libraries in the owner's timezone, and the
//! dispatcher fans due posts out to the connected platforms with isolated
//! per-platform outcomes.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod slots;
pub mod tokens;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use dispatch::{DispatchSummary, PublishDispatcher};
pub use engine::{BatchReport, Engine};
pub use error::{OmnipostError, PlatformError, Result};
pub use slots::{SlotScheduler, SlotSummary};
pub use tokens::TokenStore;
pub use types::{ConnectedAccount, Media, PlatformId, Post, PostStatus, WeeklySlot};
