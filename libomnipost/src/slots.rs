//! Weekly slot scheduling
//!
//! Slots are defined on a local weekly grid (day of week plus hour) in the
//! owner's IANA timezone. Each scheduler run evaluates every active slot
//! against the current instant: a slot whose local day and hour match
//! promotes the oldest draft from its library to `scheduled`, stamped with
//! the current time. The `last_fired_at` watermark stops a slot from
//! promoting twice within the same local hour, however often the scheduler
//! runs.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::db::Database;
use crate::error::Result;
use crate::types::WeeklySlot;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SlotSummary {
    /// Active slots examined this run.
    pub evaluated: usize,
    /// Slots whose local day and hour matched and were not watermarked.
    pub fired: usize,
    /// Drafts promoted to scheduled.
    pub promoted: usize,
    /// Slots skipped for having no target platforms.
    pub skipped_empty: usize,
}

pub struct SlotScheduler {
    db: Database,
}

impl SlotScheduler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Evaluate all active slots against `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SlotSummary> {
        let slots = self.db.active_slots().await?;
        let mut summary = SlotSummary::default();
        let mut zones: HashMap<String, Option<Tz>> = HashMap::new();

        for slot in slots {
            summary.evaluated += 1;

            if slot.platforms.is_empty() {
                tracing::debug!(slot = %slot.id, "slot has no platforms, skipping");
                summary.skipped_empty += 1;
                continue;
            }

            let zone = match zones.get(&slot.owner_id) {
                Some(cached) => *cached,
                None => {
                    let resolved = self.resolve_zone(&slot.owner_id).await?;
                    zones.insert(slot.owner_id.clone(), resolved);
                    resolved
                }
            };
            // Unresolvable timezone: every slot of this owner sits out the run
            let Some(zone) = zone else { continue };

            if !slot_matches(&slot, zone, now) {
                continue;
            }
            if fired_this_hour(&slot, zone, now) {
                tracing::debug!(slot = %slot.id, "slot already fired this hour");
                continue;
            }

            summary.fired += 1;

            let Some(draft) = self.db.oldest_draft_in_library(&slot.library_id).await? else {
                tracing::debug!(
                    slot = %slot.id,
                    library = %slot.library_id,
                    "no drafts available"
                );
                continue;
            };

            self.db.promote_post(&draft.id, now, &slot.platforms).await?;
            self.db.mark_slot_fired(&slot.id, now).await?;
            summary.promoted += 1;

            tracing::info!(
                slot = %slot.id,
                post = %draft.id,
                platforms = ?slot.platforms,
                "promoted draft to scheduled"
            );
        }

        Ok(summary)
    }

    /// Missing or empty timezone falls back to UTC; an unparseable one
    /// disables the owner's slots rather than firing at wrong times.
    async fn resolve_zone(&self, owner_id: &str) -> Result<Option<Tz>> {
        let stored = self.db.owner_timezone(owner_id).await?;
        let Some(name) = stored.filter(|s| !s.is_empty()) else {
            return Ok(Some(Tz::UTC));
        };

        match name.parse::<Tz>() {
            Ok(zone) => Ok(Some(zone)),
            Err(_) => {
                tracing::warn!(owner = %owner_id, timezone = %name, "invalid timezone, skipping owner");
                Ok(None)
            }
        }
    }
}

/// Whether the slot's local day-of-week (0 = Sunday) and hour match `now`.
pub fn slot_matches(slot: &WeeklySlot, zone: Tz, now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&zone);
    local.weekday().num_days_from_sunday() == slot.day_of_week as u32
        && local.hour() == slot.hour as u32
}

/// Whether the watermark falls in the same local date and hour as `now`.
pub fn fired_this_hour(slot: &WeeklySlot, zone: Tz, now: DateTime<Utc>) -> bool {
    match slot.last_fired_at {
        Some(fired) => {
            let fired = fired.with_timezone(&zone);
            let local = now.with_timezone(&zone);
            fired.date_naive() == local.date_naive() && fired.hour() == local.hour()
        }
        None => false,
    }
}
