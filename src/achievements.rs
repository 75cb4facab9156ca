//! Achievement levels and the activity ledger.
//!
//! [`compute_level`] is a pure threshold lookup mirroring the mobile app's
//! level computation. [`record_progress`] is the write path for achievement
//! progress: it persists forward progress and, when the level strictly
//! increases, writes a single deterministic activity row so replayed
//! deliveries cannot duplicate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{Store, StoreError};

/// Highest achievement level; reached once the last threshold is met.
pub const MAX_LEVEL: u32 = 10;

/// Progress thresholds for [`AchievementKind::PlantsNumber`].
pub const PLANTS_NUMBER_THRESHOLDS: [i64; 9] = [1, 3, 5, 10, 15, 20, 30, 40, 50];

/// Progress thresholds for [`AchievementKind::FriendsNumber`].
pub const FRIENDS_NUMBER_THRESHOLDS: [i64; 9] = [1, 3, 5, 10, 15, 20, 25, 30, 40];

/// Progress thresholds for [`AchievementKind::HealthyStreak`].
pub const HEALTHY_STREAK_THRESHOLDS: [i64; 9] = [1, 3, 5, 7, 10, 20, 30, 40, 50];

/// Kind of tracked achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    /// Number of plants the user owns.
    PlantsNumber,
    /// Number of friends the user has.
    FriendsNumber,
    /// Longest run of consecutive healthy days for a plant.
    HealthyStreak,
}

impl AchievementKind {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlantsNumber => "PLANTS_NUMBER",
            Self::FriendsNumber => "FRIENDS_NUMBER",
            Self::HealthyStreak => "HEALTHY_STREAK",
        }
    }

    /// Parse from a stored text value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLANTS_NUMBER" => Some(Self::PlantsNumber),
            "FRIENDS_NUMBER" => Some(Self::FriendsNumber),
            "HEALTHY_STREAK" => Some(Self::HealthyStreak),
            _ => None,
        }
    }

    /// Ascending progress thresholds for this kind.
    pub fn thresholds(&self) -> &'static [i64] {
        match self {
            Self::PlantsNumber => &PLANTS_NUMBER_THRESHOLDS,
            Self::FriendsNumber => &FRIENDS_NUMBER_THRESHOLDS,
            Self::HealthyStreak => &HEALTHY_STREAK_THRESHOLDS,
        }
    }
}

/// Compute the 1-based level for a progress value.
///
/// Level 1 is the base; each threshold met or exceeded adds one, and meeting
/// the last threshold caps the result at [`MAX_LEVEL`]. Monotonic
/// non-decreasing in `value`.
pub fn compute_level(value: i64, thresholds: &[i64]) -> u32 {
    for (i, t) in thresholds.iter().enumerate() {
        if value < *t {
            return u32::try_from(i).map_or(MAX_LEVEL, |i| i.saturating_add(1));
        }
    }
    MAX_LEVEL
}

/// Deterministic activity document id for a level-up.
pub fn activity_id(kind: AchievementKind, level: u32) -> String {
    format!("ACHIEVEMENT_{}_LEVEL_{level}", kind.as_str())
}

/// Record forward achievement progress and emit a level-up activity.
///
/// Only strict value increases are persisted. When the computed level also
/// strictly increases, one activity row keyed by [`activity_id`] is written;
/// the insert is idempotent, so re-delivering the same transition is safe.
/// Users without a pseudo get the value update but no activity.
///
/// Returns the newly reached level when an activity was recorded.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn record_progress(
    store: &Store,
    user_id: &str,
    kind: AchievementKind,
    new_value: i64,
    now: DateTime<Utc>,
) -> Result<Option<u32>, StoreError> {
    let before_value = store.achievement_value(user_id, kind).await?.unwrap_or(0);
    if new_value <= before_value {
        return Ok(None);
    }
    store.set_achievement_value(user_id, kind, new_value).await?;

    let before_level = compute_level(before_value, kind.thresholds());
    let after_level = compute_level(new_value, kind.thresholds());
    if after_level <= before_level {
        debug!(
            user = user_id,
            kind = kind.as_str(),
            value = new_value,
            "progress recorded, no level change"
        );
        return Ok(None);
    }

    let Some(pseudo) = store.user_pseudo(user_id).await? else {
        debug!(user = user_id, "no pseudo, skipping level-up activity");
        return Ok(None);
    };

    let id = activity_id(kind, after_level);
    let inserted = store
        .insert_activity_once(
            user_id,
            &id,
            kind,
            after_level,
            &pseudo,
            now.timestamp_millis(),
        )
        .await?;

    if inserted {
        info!(
            user = user_id,
            kind = kind.as_str(),
            level = after_level,
            "achievement level reached"
        );
        Ok(Some(after_level))
    } else {
        debug!(user = user_id, activity = %id, "level-up activity already recorded");
        Ok(None)
    }
}
