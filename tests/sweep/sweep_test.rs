//! End-to-end sweep tests: transitions, streak bookkeeping, notifications,
//! and idempotent re-runs, against an in-memory store and a recording
//! transport.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use verdant::config::Config;
use verdant::push::{PushError, PushMessage, PushTransport, CRITICALLY_DRY_TITLES};
use verdant::store::Store;
use verdant::sweep::{run_once, SweepDeps};

/// Transport that records every send and answers with a fixed outcome.
struct RecordingTransport {
    sent: Mutex<Vec<(String, PushMessage)>>,
    unregistered: bool,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            unregistered: false,
        }
    }

    fn rejecting_tokens() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            unregistered: true,
        }
    }

    fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().expect("lock should not be poisoned").clone()
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        self.sent
            .lock()
            .expect("lock should not be poisoned")
            .push((token.to_owned(), message.clone()));
        if self.unregistered {
            return Err(PushError::Unregistered);
        }
        Ok(())
    }
}

async fn fresh_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    // In-memory databases are per-connection, so limit to 1 connection
    // to ensure the schema and queries share the same database.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("in-memory pool should connect")
}

async fn deps_with(transport: RecordingTransport) -> (SweepDeps, Arc<RecordingTransport>) {
    let store = Arc::new(
        Store::with_pool(fresh_pool().await)
            .await
            .expect("schema should apply"),
    );
    let transport = Arc::new(transport);
    let deps = SweepDeps {
        config: Arc::new(Config::default()),
        store,
        push: Arc::clone(&transport) as Arc<dyn PushTransport>,
    };
    (deps, transport)
}

async fn seed_user(store: &Store) {
    sqlx::query("INSERT INTO users (id, pseudo, push_token) VALUES ('u1', 'alice', 'tok-1')")
        .execute(store.pool())
        .await
        .expect("user insert should succeed");
}

async fn seed_plant(
    store: &Store,
    id: &str,
    frequency_days: f64,
    status: &str,
    last_watered_ms: i64,
    healthy_since_ms: i64,
) {
    sqlx::query(
        "INSERT INTO plants \
         (id, user_id, name, watering_frequency_days, health_status, \
          last_watered, previous_last_watered, healthy_since) \
         VALUES (?1, 'u1', 'Rose', ?2, ?3, ?4, 0, ?5)",
    )
    .bind(id)
    .bind(frequency_days)
    .bind(status)
    .bind(last_watered_ms)
    .bind(healthy_since_ms)
    .execute(store.pool())
    .await
    .expect("plant insert should succeed");
}

async fn plant_status(store: &Store, id: &str) -> (String, i64) {
    sqlx::query_as("SELECT health_status, healthy_since FROM plants WHERE id = ?1")
        .bind(id)
        .fetch_one(store.pool())
        .await
        .expect("plant row should exist")
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[tokio::test]
async fn thirsty_plant_transitions_and_notifies() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    // 8 days since watering on a 7-day cycle: 114% dryness.
    seed_plant(
        &deps.store,
        "p1",
        7.0,
        "HEALTHY",
        ms(now - Duration::days(8)),
        ms(now - Duration::days(8)),
    )
    .await;

    let outcome = run_once(&deps, now).await.expect("sweep should run");
    assert_eq!(outcome.plants_seen, 1);
    assert_eq!(outcome.transitions, 1);
    assert_eq!(outcome.notifications_sent, 1);
    assert_eq!(outcome.failures, 0);

    let (status, healthy_since) = plant_status(&deps.store, "p1").await;
    assert_eq!(status, "NEEDS_WATER");
    assert_eq!(healthy_since, 0, "healthy marker should clear");

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "tok-1");
    assert_eq!(
        sent[0].1.data.get("plantId").map(String::as_str),
        Some("p1")
    );
}

#[tokio::test]
async fn sweep_is_idempotent_for_unchanged_state() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        7.0,
        "HEALTHY",
        ms(now - Duration::days(8)),
        ms(now - Duration::days(8)),
    )
    .await;

    run_once(&deps, now).await.expect("first sweep should run");
    let second = run_once(&deps, now).await.expect("second sweep should run");

    assert_eq!(second.transitions, 0);
    assert_eq!(second.notifications_sent, 0);
    assert_eq!(transport.sent().len(), 1, "no duplicate notification");
    let (status, _) = plant_status(&deps.store, "p1").await;
    assert_eq!(status, "NEEDS_WATER");
}

#[tokio::test]
async fn recovering_plant_sets_healthy_marker() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        10.0,
        "SEVERELY_DRY",
        ms(now - Duration::days(1)),
        0,
    )
    .await;

    let outcome = run_once(&deps, now).await.expect("sweep should run");
    assert_eq!(outcome.transitions, 1);
    assert_eq!(outcome.notifications_sent, 0);

    let (status, healthy_since) = plant_status(&deps.store, "p1").await;
    assert_eq!(status, "HEALTHY");
    assert_eq!(healthy_since, now.timestamp_millis());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn invalid_cadence_degrades_to_unknown() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        0.0,
        "HEALTHY",
        ms(now - Duration::days(1)),
        ms(now - Duration::days(1)),
    )
    .await;

    let outcome = run_once(&deps, now).await.expect("sweep should run");
    assert_eq!(outcome.transitions, 1);
    assert_eq!(outcome.failures, 0, "bad cadence is not a failure");

    let (status, healthy_since) = plant_status(&deps.store, "p1").await;
    assert_eq!(status, "UNKNOWN");
    assert_eq!(healthy_since, 0, "unknown counts as unhealthy");
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn severely_dry_transition_uses_urgent_catalog() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        10.0,
        "NEEDS_WATER",
        ms(now - Duration::days(20)),
        0,
    )
    .await;

    run_once(&deps, now).await.expect("sweep should run");
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(CRITICALLY_DRY_TITLES.contains(&sent[0].1.title.as_str()));
    assert!(sent[0].1.body.contains("severely dry"));
}

#[tokio::test]
async fn unregistered_token_is_cleared_during_sweep() {
    let (deps, transport) = deps_with(RecordingTransport::rejecting_tokens()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        7.0,
        "HEALTHY",
        ms(now - Duration::days(8)),
        0,
    )
    .await;

    let outcome = run_once(&deps, now).await.expect("sweep should run");
    assert_eq!(outcome.transitions, 1);
    assert_eq!(outcome.notifications_sent, 0, "delivery failed");
    assert_eq!(transport.sent().len(), 1, "one attempt was made");

    let token = deps
        .store
        .push_token("u1")
        .await
        .expect("token should read");
    assert_eq!(token, None, "stale token should be removed");
}

#[tokio::test]
async fn healthy_streak_advances_and_records_level() {
    let (deps, _transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    // Healthy for 8 days; stored streak record is 3.
    seed_plant(
        &deps.store,
        "p1",
        10.0,
        "HEALTHY",
        ms(now - Duration::days(2)),
        ms(now - Duration::days(8)),
    )
    .await;
    sqlx::query(
        "INSERT INTO achievements (user_id, kind, value) VALUES ('u1', 'HEALTHY_STREAK', 3)",
    )
    .execute(deps.store.pool())
    .await
    .expect("achievement seed should succeed");

    run_once(&deps, now).await.expect("sweep should run");

    let value = deps
        .store
        .achievement_value("u1", verdant::achievements::AchievementKind::HealthyStreak)
        .await
        .expect("value should read");
    assert_eq!(value, Some(8));

    let row: (String, i64) = sqlx::query_as(
        "SELECT id, level_reached FROM activities WHERE user_id = 'u1'",
    )
    .fetch_one(deps.store.pool())
    .await
    .expect("activity should exist");
    assert_eq!(row.0, "ACHIEVEMENT_HEALTHY_STREAK_LEVEL_5");
    assert_eq!(row.1, 5);
}

#[tokio::test]
async fn streak_without_progress_document_is_skipped() {
    let (deps, _transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    seed_plant(
        &deps.store,
        "p1",
        10.0,
        "HEALTHY",
        ms(now - Duration::days(2)),
        ms(now - Duration::days(8)),
    )
    .await;

    run_once(&deps, now).await.expect("sweep should run");

    let value = deps
        .store
        .achievement_value("u1", verdant::achievements::AchievementKind::HealthyStreak)
        .await
        .expect("value should read");
    assert_eq!(value, None, "no progress document means no streak update");
}

#[tokio::test]
async fn one_bad_plant_does_not_stop_the_batch() {
    let (deps, transport) = deps_with(RecordingTransport::new()).await;
    seed_user(&deps.store).await;
    let now = Utc::now();
    // A plant with no watering history at all degrades to UNKNOWN...
    sqlx::query(
        "INSERT INTO plants (id, user_id, name, watering_frequency_days, health_status) \
         VALUES ('p0', 'u1', 'Cactus', 30.0, 'HEALTHY')",
    )
    .execute(deps.store.pool())
    .await
    .expect("plant insert should succeed");
    // ...while the thirsty one still gets its notification.
    seed_plant(
        &deps.store,
        "p1",
        7.0,
        "HEALTHY",
        ms(now - Duration::days(8)),
        0,
    )
    .await;

    let outcome = run_once(&deps, now).await.expect("sweep should run");
    assert_eq!(outcome.plants_seen, 2);
    assert_eq!(outcome.transitions, 2);
    assert_eq!(outcome.notifications_sent, 1);

    let (status, _) = plant_status(&deps.store, "p0").await;
    assert_eq!(status, "UNKNOWN");
    assert_eq!(transport.sent().len(), 1);
}
