//! Tests for plant record reads/writes and the absent-or-zero timestamp
//! conventions.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use verdant::achievements::AchievementKind;
use verdant::health::PlantHealthStatus;
use verdant::store::Store;

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

async fn seeded_store() -> Store {
    let store = Store::with_pool(fresh_pool().await)
        .await
        .expect("schema should apply");
    sqlx::query("INSERT INTO users (id, pseudo, push_token) VALUES ('u1', 'alice', 'tok-1')")
        .execute(store.pool())
        .await
        .expect("user insert should succeed");
    store
}

async fn insert_plant(store: &Store, id: &str, status: &str, last: i64, previous: i64) {
    sqlx::query(
        "INSERT INTO plants \
         (id, user_id, name, watering_frequency_days, health_status, \
          last_watered, previous_last_watered, healthy_since) \
         VALUES (?1, 'u1', 'Rose', 7.0, ?2, ?3, ?4, 0)",
    )
    .bind(id)
    .bind(status)
    .bind(last)
    .bind(previous)
    .execute(store.pool())
    .await
    .expect("plant insert should succeed");
}

#[tokio::test]
async fn plant_rows_map_to_records() {
    let store = seeded_store().await;
    insert_plant(&store, "p1", "HEALTHY", 1_700_000_000_000, 1_699_000_000_000).await;

    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    assert_eq!(plants.len(), 1);
    let plant = &plants[0];
    assert_eq!(plant.id, "p1");
    assert_eq!(plant.name, "Rose");
    assert_eq!(plant.health_status, PlantHealthStatus::Healthy);

    let record = plant.watering_record();
    assert_eq!(record.last_watered_ms, Some(1_700_000_000_000));
    assert_eq!(record.previous_last_watered_ms, Some(1_699_000_000_000));
    assert!((record.watering_frequency_days - 7.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn zero_previous_watering_counts_as_absent() {
    let store = seeded_store().await;
    insert_plant(&store, "p1", "HEALTHY", 1_700_000_000_000, 0).await;

    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    let record = plants[0].watering_record();
    assert_eq!(record.previous_last_watered_ms, None);
}

#[tokio::test]
async fn unrecognised_stored_status_reads_as_unknown() {
    let store = seeded_store().await;
    insert_plant(&store, "p1", "WILTING", 1_700_000_000_000, 0).await;

    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    assert_eq!(plants[0].health_status, PlantHealthStatus::Unknown);
}

#[tokio::test]
async fn status_update_round_trips() {
    let store = seeded_store().await;
    insert_plant(&store, "p1", "HEALTHY", 1_700_000_000_000, 0).await;

    store
        .update_health_status("p1", PlantHealthStatus::NeedsWater)
        .await
        .expect("update should succeed");

    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    assert_eq!(plants[0].health_status, PlantHealthStatus::NeedsWater);
}

#[tokio::test]
async fn healthy_since_marker_round_trips() {
    let store = seeded_store().await;
    insert_plant(&store, "p1", "HEALTHY", 1_700_000_000_000, 0).await;

    store
        .set_healthy_since("p1", 1_700_000_100_000)
        .await
        .expect("set should succeed");
    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    assert_eq!(plants[0].healthy_since_ms, 1_700_000_100_000);

    store
        .set_healthy_since("p1", 0)
        .await
        .expect("clear should succeed");
    let plants = store
        .plants_for_user("u1")
        .await
        .expect("plants should list");
    assert_eq!(plants[0].healthy_since_ms, 0);
}

#[tokio::test]
async fn push_token_lookup_and_cleanup() {
    let store = seeded_store().await;

    let token = store.push_token("u1").await.expect("token should read");
    assert_eq!(token.as_deref(), Some("tok-1"));

    store
        .clear_push_token("u1")
        .await
        .expect("clear should succeed");
    let token = store.push_token("u1").await.expect("token should read");
    assert_eq!(token, None);

    let missing = store
        .push_token("nobody")
        .await
        .expect("missing user should read");
    assert_eq!(missing, None);
}

#[tokio::test]
async fn blank_pseudo_counts_as_missing() {
    let store = seeded_store().await;
    sqlx::query("INSERT INTO users (id, pseudo) VALUES ('u2', '   ')")
        .execute(store.pool())
        .await
        .expect("user insert should succeed");

    assert_eq!(
        store.user_pseudo("u1").await.expect("pseudo should read"),
        Some("alice".to_owned())
    );
    assert_eq!(
        store.user_pseudo("u2").await.expect("pseudo should read"),
        None
    );
}

#[tokio::test]
async fn achievement_value_upserts() {
    let store = seeded_store().await;

    assert_eq!(
        store
            .achievement_value("u1", AchievementKind::HealthyStreak)
            .await
            .expect("missing value should read"),
        None
    );

    store
        .set_achievement_value("u1", AchievementKind::HealthyStreak, 4)
        .await
        .expect("insert should succeed");
    store
        .set_achievement_value("u1", AchievementKind::HealthyStreak, 9)
        .await
        .expect("update should succeed");

    assert_eq!(
        store
            .achievement_value("u1", AchievementKind::HealthyStreak)
            .await
            .expect("value should read"),
        Some(9)
    );
}

#[tokio::test]
async fn users_list_in_insertion_order() {
    let store = seeded_store().await;
    sqlx::query("INSERT INTO users (id) VALUES ('u2'), ('u3')")
        .execute(store.pool())
        .await
        .expect("user inserts should succeed");

    let ids = store.list_user_ids().await.expect("users should list");
    assert_eq!(ids, vec!["u1", "u2", "u3"]);
}
