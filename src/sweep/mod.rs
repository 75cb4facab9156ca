//! Periodic plant sweep: classification, transition handling, notifications.
//!
//! Runs as a background Tokio task ticking at a configurable interval. Each
//! tick evaluates the sweep cron expression and, when due, walks every
//! user's plants: recompute the health status, persist transitions, keep the
//! healthy-streak achievement current, and notify users whose plants entered
//! a thirsty state. Each plant is handled independently; evaluation errors
//! are logged per plant and never abort the batch.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::achievements::{self, AchievementKind};
use crate::config::Config;
use crate::health::{classify, PlantHealthStatus};
use crate::push::{self, PushTransport};
use crate::store::{PlantRecord, Store, StoreError};

/// Shared dependencies for the sweep runner.
pub struct SweepDeps {
    /// Service configuration.
    pub config: Arc<Config>,
    /// Plant record and achievement store.
    pub store: Arc<Store>,
    /// Push transport for water notifications.
    pub push: Arc<dyn PushTransport>,
}

/// Tracks when the sweep last ran.
#[derive(Debug, Default)]
pub struct SweepState {
    last_run: Option<DateTime<Utc>>,
}

impl SweepState {
    /// Create a state with no recorded run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sweep execution time.
    pub fn record_run(&mut self, at: DateTime<Utc>) {
        self.last_run = Some(at);
    }

    /// The last recorded run, if any.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }
}

/// Summary of one sweep over all plants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Plants evaluated.
    pub plants_seen: u64,
    /// Status transitions persisted.
    pub transitions: u64,
    /// Water notifications delivered.
    pub notifications_sent: u64,
    /// Plants whose evaluation failed.
    pub failures: u64,
}

/// Whether a sweep is due this tick.
///
/// Due when the cron expression has a trigger between the last run and
/// `now`. A never-run sweep uses the epoch so the first matching trigger
/// fires. Invalid cron expressions are logged and never due.
pub fn sweep_due(cron_expr: &str, state: &SweepState, now: DateTime<Utc>) -> bool {
    let schedule = match cron::Schedule::from_str(cron_expr) {
        Ok(s) => s,
        Err(e) => {
            warn!(cron = cron_expr, error = %e, "invalid sweep cron expression");
            return false;
        }
    };
    let after = state.last_run().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    schedule.after(&after).take(1).any(|next| next <= now)
}

/// Run the sweep background loop.
///
/// Ticks every `tick_secs`, sweeping when the cron schedule says a run is
/// due. Exits when the shutdown signal is received or the watch channel
/// closes.
pub async fn run_sweeper(deps: SweepDeps, mut shutdown_rx: watch::Receiver<bool>) {
    let tick_secs = deps.config.sweep.tick_secs;
    info!(tick_secs, cron = %deps.config.sweep.cron, "sweeper started");

    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
    let mut state = SweepState::new();

    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                if !sweep_due(&deps.config.sweep.cron, &state, now) {
                    continue;
                }
                state.record_run(now);
                match run_once(&deps, now).await {
                    Ok(outcome) => {
                        info!(
                            plants = outcome.plants_seen,
                            transitions = outcome.transitions,
                            notifications = outcome.notifications_sent,
                            failures = outcome.failures,
                            "sweep completed"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "sweep failed");
                    }
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("sweeper shutting down");
                    break;
                }
            }
        }
    }

    info!("sweeper stopped");
}

/// Sweep every plant of every user once, at the given evaluation time.
///
/// Re-running with the same stored fields and the same `now` is idempotent:
/// statuses settle, streak updates only move forward, and activity writes
/// are absorbed by their deterministic keys.
///
/// # Errors
///
/// Returns an error only when user or plant enumeration fails; per-plant
/// evaluation errors are logged and counted instead.
pub async fn run_once(deps: &SweepDeps, now: DateTime<Utc>) -> Result<SweepOutcome, StoreError> {
    let mut outcome = SweepOutcome::default();

    for user_id in deps.store.list_user_ids().await? {
        for plant in deps.store.plants_for_user(&user_id).await? {
            outcome.plants_seen = outcome.plants_seen.saturating_add(1);
            match sweep_plant(deps, &user_id, &plant, now).await {
                Ok(result) => {
                    if result.transitioned {
                        outcome.transitions = outcome.transitions.saturating_add(1);
                    }
                    if result.notified {
                        outcome.notifications_sent = outcome.notifications_sent.saturating_add(1);
                    }
                }
                Err(e) => {
                    outcome.failures = outcome.failures.saturating_add(1);
                    error!(
                        user = %user_id,
                        plant = %plant.id,
                        error = %e,
                        "plant sweep failed"
                    );
                }
            }
        }
    }

    Ok(outcome)
}

/// What happened to a single plant during one sweep.
#[derive(Debug, Clone, Copy, Default)]
struct PlantSweep {
    transitioned: bool,
    notified: bool,
}

/// Evaluate one plant: streak bookkeeping, classification, transition
/// handling, and the water notification.
async fn sweep_plant(
    deps: &SweepDeps,
    user_id: &str,
    plant: &PlantRecord,
    now: DateTime<Utc>,
) -> Result<PlantSweep, StoreError> {
    let mut result = PlantSweep::default();

    update_healthy_streak(deps, user_id, plant, now).await?;

    let new_status = classify(&plant.watering_record(), now);
    if new_status == plant.health_status {
        return Ok(result);
    }

    deps.store.update_health_status(&plant.id, new_status).await?;
    result.transitioned = true;
    info!(
        user = user_id,
        plant = %plant.id,
        from = %plant.health_status,
        to = %new_status,
        "health status transition"
    );

    // Flip the streak marker only when the healthy/unhealthy partition
    // changes, not on every transition.
    let was_healthy = plant.health_status.is_healthy();
    let is_now_healthy = new_status.is_healthy();
    if !was_healthy && is_now_healthy {
        deps.store
            .set_healthy_since(&plant.id, now.timestamp_millis())
            .await?;
    } else if was_healthy && !is_now_healthy {
        deps.store.set_healthy_since(&plant.id, 0).await?;
    }

    if deps.config.push.enabled
        && matches!(
            new_status,
            PlantHealthStatus::NeedsWater | PlantHealthStatus::SeverelyDry
        )
    {
        if let Some(message) = push::water_message(&plant.id, &plant.name, new_status) {
            result.notified = push::notify_user(
                deps.store.as_ref(),
                deps.push.as_ref(),
                &deps.config.push.retry,
                user_id,
                &message,
            )
            .await?;
        }
    }

    Ok(result)
}

/// Advance the user's healthy-streak achievement from this plant's marker.
///
/// Only runs when the plant is currently healthy (`healthy_since != 0`) and
/// the user already has a streak progress document; the streak only ever
/// moves forward, so a shorter current streak is ignored.
async fn update_healthy_streak(
    deps: &SweepDeps,
    user_id: &str,
    plant: &PlantRecord,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if plant.healthy_since_ms == 0 {
        return Ok(());
    }
    let Some(stored) = deps
        .store
        .achievement_value(user_id, AchievementKind::HealthyStreak)
        .await?
    else {
        return Ok(());
    };
    let Some(healthy_since) = DateTime::from_timestamp_millis(plant.healthy_since_ms) else {
        warn!(plant = %plant.id, healthy_since = plant.healthy_since_ms, "unreadable healthy_since marker");
        return Ok(());
    };

    let current_streak = now.signed_duration_since(healthy_since).num_days();
    if current_streak > stored {
        achievements::record_progress(
            deps.store.as_ref(),
            user_id,
            AchievementKind::HealthyStreak,
            current_streak,
            now,
        )
        .await?;
    }
    Ok(())
}
