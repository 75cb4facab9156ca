//! Plant health classification from watering history.
//!
//! [`classify`] is a pure function of the watering record and an injected
//! evaluation time. Dryness (time since the last watering as a percentage of
//! the expected cycle) drives a bucket ladder; overwatering is inferred from
//! the interval between the two most recent waterings and fades linearly as
//! the plant dries out again. No I/O and no clock reads happen here, so the
//! sweep can re-run the classification for the same stored fields and get
//! the same answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interval percentage below which a watering counts as fully severe.
pub const SEVERELY_OVERWATERED_MAX_PCT: f64 = 30.0;

/// Interval percentage at and above which a watering is not overwatering.
pub const OVERWATERED_MAX_PCT: f64 = 70.0;

/// Upper dryness bound (inclusive) of the `HEALTHY` bucket.
pub const HEALTHY_MAX_PCT: f64 = 70.0;

/// Upper dryness bound (inclusive) of the `SLIGHTLY_DRY` bucket.
pub const SLIGHTLY_DRY_MAX_PCT: f64 = 100.0;

/// Upper dryness bound (inclusive) of the `NEEDS_WATER` bucket.
pub const NEEDS_WATER_MAX_PCT: f64 = 130.0;

/// Dryness percentage at which overwatering is fully resolved.
pub const OVERWATER_RECOVERY_END_PCT: f64 = 30.0;

/// Effective severity above which overwatering counts as severe (strict).
pub const OVERWATER_SEVERITY_SPLIT: f64 = 0.5;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Discrete plant health state.
///
/// The variants partition a continuous dryness/wetness axis; the two
/// overwatered states and the three dry states are independent tails, not a
/// linear severity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlantHealthStatus {
    /// Watered far too soon after the previous watering.
    SeverelyOverwatered,
    /// Watered somewhat too soon after the previous watering.
    Overwatered,
    /// Within the expected watering cycle.
    Healthy,
    /// Slightly past the expected cycle.
    SlightlyDry,
    /// Noticeably overdue for watering.
    NeedsWater,
    /// Critically overdue for watering.
    SeverelyDry,
    /// Watering history is missing or the cadence is invalid.
    Unknown,
}

impl PlantHealthStatus {
    /// Returns the string representation stored in SQLite and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeverelyOverwatered => "SEVERELY_OVERWATERED",
            Self::Overwatered => "OVERWATERED",
            Self::Healthy => "HEALTHY",
            Self::SlightlyDry => "SLIGHTLY_DRY",
            Self::NeedsWater => "NEEDS_WATER",
            Self::SeverelyDry => "SEVERELY_DRY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a stored status value. Unrecognised values map to [`Self::Unknown`]
    /// so a bad row degrades instead of failing the sweep.
    pub fn parse(s: &str) -> Self {
        match s {
            "SEVERELY_OVERWATERED" => Self::SeverelyOverwatered,
            "OVERWATERED" => Self::Overwatered,
            "HEALTHY" => Self::Healthy,
            "SLIGHTLY_DRY" => Self::SlightlyDry,
            "NEEDS_WATER" => Self::NeedsWater,
            "SEVERELY_DRY" => Self::SeverelyDry,
            _ => Self::Unknown,
        }
    }

    /// Binary healthy/unhealthy partition used for streak bookkeeping.
    ///
    /// `HEALTHY` and `SLIGHTLY_DRY` count as healthy; every other state,
    /// including `UNKNOWN`, does not.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy | Self::SlightlyDry)
    }
}

impl std::fmt::Display for PlantHealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watering history for one plant, as read from the plant record store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WateringRecord {
    /// When the plant was last watered (epoch milliseconds).
    pub last_watered_ms: Option<i64>,
    /// The watering before that, if any. Absence disables overwatering
    /// detection for this evaluation.
    pub previous_last_watered_ms: Option<i64>,
    /// Expected watering cadence in days. Must be positive.
    pub watering_frequency_days: f64,
}

/// Compute the health status for a watering record at the given time.
///
/// Invalid input (missing last-watered instant, non-positive cadence)
/// returns [`PlantHealthStatus::Unknown`]; the function never panics for
/// well-formed numeric input.
pub fn classify(record: &WateringRecord, now: DateTime<Utc>) -> PlantHealthStatus {
    let Some(last_ms) = record.last_watered_ms else {
        return PlantHealthStatus::Unknown;
    };
    let freq = record.watering_frequency_days;
    if freq <= 0.0 {
        return PlantHealthStatus::Unknown;
    }

    let dryness_pct = days_between(last_ms, now.timestamp_millis()) / freq * 100.0;

    // Severity in [0,1] from the gap between the two most recent waterings.
    let starting_severity = match record.previous_last_watered_ms {
        None => 0.0,
        Some(prev_ms) => {
            let interval_pct = days_between(prev_ms, last_ms) / freq * 100.0;
            if interval_pct < SEVERELY_OVERWATERED_MAX_PCT {
                1.0
            } else if interval_pct < OVERWATERED_MAX_PCT {
                1.0 - relative_position(
                    SEVERELY_OVERWATERED_MAX_PCT,
                    OVERWATERED_MAX_PCT,
                    interval_pct,
                )
            } else {
                0.0
            }
        }
    };

    // Overwatering fades as the plant dries out; gone once dryness reaches
    // the recovery threshold.
    let decay = (1.0 - dryness_pct / OVERWATER_RECOVERY_END_PCT).clamp(0.0, 1.0);
    let effective_severity = starting_severity * decay;

    if effective_severity > 0.0 {
        if effective_severity > OVERWATER_SEVERITY_SPLIT {
            return PlantHealthStatus::SeverelyOverwatered;
        }
        return PlantHealthStatus::Overwatered;
    }

    if dryness_pct <= HEALTHY_MAX_PCT {
        PlantHealthStatus::Healthy
    } else if dryness_pct <= SLIGHTLY_DRY_MAX_PCT {
        PlantHealthStatus::SlightlyDry
    } else if dryness_pct <= NEEDS_WATER_MAX_PCT {
        PlantHealthStatus::NeedsWater
    } else {
        PlantHealthStatus::SeverelyDry
    }
}

/// Elapsed days from one epoch-millisecond instant to another.
#[allow(clippy::cast_precision_loss)]
fn days_between(from_ms: i64, to_ms: i64) -> f64 {
    // Millisecond spans of realistic watering histories fit f64 exactly.
    to_ms.saturating_sub(from_ms) as f64 / MS_PER_DAY
}

/// Normalise `value` within `[lo, hi]` to `[0,1]`, clamping outside values.
///
/// Equal bounds yield 0 rather than dividing by zero.
fn relative_position(lo: f64, hi: f64, value: f64) -> f64 {
    if hi == lo {
        return 0.0;
    }
    (value.clamp(lo, hi) - lo) / (hi - lo)
}
