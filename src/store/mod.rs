//! SQLite-backed plant record and achievement progress store.
//!
//! The [`Store`] is the sole gateway to `verdant.db`. The schema lives in
//! `migrations/001_schema.sql` and is applied on open. The sweep runs as a
//! single background task, so queries go straight through the connection
//! pool; there is no write-serialisation actor here.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

use crate::health::{PlantHealthStatus, WateringRecord};

/// Bootstrap schema applied on every open (idempotent).
const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

/// Maximum connections for the SQLite pool.
const MAX_CONNECTIONS: u32 = 4;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One plant row as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantRecord {
    /// Plant identifier.
    pub id: String,
    /// Human-readable plant name, used in notification bodies.
    pub name: String,
    /// Expected watering cadence in days.
    pub watering_frequency_days: f64,
    /// Status persisted by the previous sweep.
    pub health_status: PlantHealthStatus,
    /// Last watering instant (epoch ms), if known.
    pub last_watered_ms: Option<i64>,
    /// Watering before the last one (epoch ms). Stored 0 means absent.
    pub previous_last_watered_ms: Option<i64>,
    /// Start of the current healthy streak (epoch ms), 0 when not healthy.
    pub healthy_since_ms: i64,
}

impl PlantRecord {
    /// Classifier input for this plant.
    ///
    /// Non-positive stored instants count as absent, per the store
    /// convention that 0 marks a missing watering.
    pub fn watering_record(&self) -> WateringRecord {
        WateringRecord {
            last_watered_ms: self.last_watered_ms.filter(|ms| *ms > 0),
            previous_last_watered_ms: self.previous_last_watered_ms.filter(|ms| *ms > 0),
            watering_frequency_days: self.watering_frequency_days,
        }
    }
}

/// Raw plant row tuple:
/// `(id, name, watering_frequency_days, health_status, last_watered,
/// previous_last_watered, healthy_since)`.
type PlantRow = (String, String, f64, String, Option<i64>, Option<i64>, i64);

/// SQLite store for users, plants, achievement progress, and activities.
pub struct Store {
    db: SqlitePool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// fails to apply.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(opts)
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&db).await?;
        info!(path = %path.display(), "store opened");
        Ok(Self { db })
    }

    /// Wrap an existing pool, applying the schema first.
    ///
    /// Used by tests with in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema fails to apply.
    pub async fn with_pool(db: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&db).await?;
        Ok(Self { db })
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// All user ids, in insertion order.
    pub async fn list_user_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM users ORDER BY rowid")
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// The user's display pseudo, if set and non-blank.
    pub async fn user_pseudo(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT pseudo FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(row
            .and_then(|(pseudo,)| pseudo)
            .filter(|p| !p.trim().is_empty()))
    }

    /// The user's push token, if one is registered.
    pub async fn push_token(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT push_token FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.and_then(|(token,)| token).filter(|t| !t.is_empty()))
    }

    /// Remove a user's push token after the transport reports it unregistered.
    pub async fn clear_push_token(&self, user_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET push_token = NULL WHERE id = ?1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// All plants owned by a user.
    pub async fn plants_for_user(&self, user_id: &str) -> Result<Vec<PlantRecord>, StoreError> {
        let rows: Vec<PlantRow> = sqlx::query_as(
            "SELECT id, name, watering_frequency_days, health_status, \
             last_watered, previous_last_watered, healthy_since \
             FROM plants WHERE user_id = ?1 ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, freq, status, last, previous, healthy_since)| PlantRecord {
                    id,
                    name,
                    watering_frequency_days: freq,
                    health_status: PlantHealthStatus::parse(&status),
                    last_watered_ms: last,
                    previous_last_watered_ms: previous,
                    healthy_since_ms: healthy_since,
                },
            )
            .collect())
    }

    /// Persist a newly computed health status for a plant.
    pub async fn update_health_status(
        &self,
        plant_id: &str,
        status: PlantHealthStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE plants SET health_status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(plant_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Set the healthy-streak marker for a plant (epoch ms, 0 to clear).
    pub async fn set_healthy_since(&self, plant_id: &str, at_ms: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE plants SET healthy_since = ?1 WHERE id = ?2")
            .bind(at_ms)
            .bind(plant_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Stored progress value for an achievement, or `None` when the user has
    /// no progress document for that kind.
    pub async fn achievement_value(
        &self,
        user_id: &str,
        kind: crate::achievements::AchievementKind,
    ) -> Result<Option<i64>, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT value FROM achievements WHERE user_id = ?1 AND kind = ?2")
                .bind(user_id)
                .bind(kind.as_str())
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Upsert the progress value for an achievement.
    pub async fn set_achievement_value(
        &self,
        user_id: &str,
        kind: crate::achievements::AchievementKind,
        value: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO achievements (user_id, kind, value) VALUES (?1, ?2, ?3) \
             ON CONFLICT(user_id, kind) DO UPDATE SET value = excluded.value",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(value)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Insert an achievement activity with a deterministic id.
    ///
    /// Returns `false` when a row with the same `(user_id, activity_id)`
    /// already exists, which makes retried level-up deliveries a no-op.
    pub async fn insert_activity_once(
        &self,
        user_id: &str,
        activity_id: &str,
        kind: crate::achievements::AchievementKind,
        level_reached: u32,
        pseudo: &str,
        created_at_ms: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO activities \
             (user_id, id, type, achievement_kind, level_reached, pseudo, created_at) \
             VALUES (?1, ?2, 'ACHIEVEMENT', ?3, ?4, ?5, ?6)",
        )
        .bind(user_id)
        .bind(activity_id)
        .bind(kind.as_str())
        .bind(level_reached)
        .bind(pseudo)
        .bind(created_at_ms)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
