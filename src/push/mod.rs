//! Push notifications: transport abstraction, retry policy, message catalog.
//!
//! The transport is a trait so the sweep can run against a recording fake in
//! tests. Production uses [`http::HttpTransport`]. Failures form a closed
//! set: an unregistered token is terminal and triggers token cleanup,
//! transient/quota failures are retried with capped exponential backoff,
//! everything else is logged and dropped.

pub mod http;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::PushRetryConfig;
use crate::health::PlantHealthStatus;
use crate::store::{Store, StoreError};

/// Notification titles for plants entering `NEEDS_WATER`.
pub const NEEDS_WATER_TITLES: [&str; 10] = [
    "Time to give your plant a drink 🌱",
    "Your plant is feeling a bit thirsty 🌿",
    "Hey, your green friend needs some water 🌱",
    "Don't forget to water your plant today 🌿",
    "A little hydration goes a long way 🌱",
    "Your plant could use a refreshing sip 🌿",
    "It's watering time for your plant 🌱",
    "Your plant's leaves are calling for water 🌿",
    "Keep your plant happy — water it now 🌱",
    "Looks like your plant needs a bit of care 🌿",
];

/// Notification titles for plants entering `SEVERELY_DRY`.
pub const CRITICALLY_DRY_TITLES: [&str; 4] = [
    "Your plant is really thirsty ⚠️",
    "Emergency hydration needed 🚨",
    "Your plant is drying out fast ⚠️",
    "Uh oh...your plant needs water ASAP 🚨",
];

/// Errors a push transport can report.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The destination token is no longer valid. Terminal; the stored token
    /// should be removed.
    #[error("push token is no longer registered")]
    Unregistered,

    /// Transient or quota failure. Worth retrying with backoff.
    #[error("transient push failure: {0}")]
    Retryable(String),

    /// The transport rejected the message. Not retryable.
    #[error("push rejected: {0}")]
    Rejected(String),
}

/// A push notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// Opaque key/value data delivered alongside the notification.
    pub data: HashMap<String, String>,
}

/// Delivers a [`PushMessage`] to a destination token.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Send one message to one token.
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError>;
}

/// Build the water notification for a plant entering the given status.
///
/// Returns `None` for statuses that do not notify. The title is drawn at
/// random from the matching catalog; the body names the plant.
pub fn water_message(
    plant_id: &str,
    plant_name: &str,
    status: PlantHealthStatus,
) -> Option<PushMessage> {
    let (titles, body): (&[&str], String) = match status {
        PlantHealthStatus::NeedsWater => {
            (&NEEDS_WATER_TITLES, format!("{plant_name} needs water!"))
        }
        PlantHealthStatus::SeverelyDry => (
            &CRITICALLY_DRY_TITLES,
            format!("{plant_name} is severely dry and needs immediate watering to recover!"),
        ),
        _ => return None,
    };

    let mut rng = rand::thread_rng();
    let title = titles.choose(&mut rng).copied().unwrap_or("Water your plant");

    let mut data = HashMap::new();
    data.insert("type".to_owned(), "WATER_PLANT".to_owned());
    data.insert("plantId".to_owned(), plant_id.to_owned());

    Some(PushMessage {
        title: title.to_owned(),
        body,
        data,
    })
}

/// Send a message, retrying transient failures with exponential backoff.
///
/// Attempts up to `retry.max_attempts` sends. Only [`PushError::Retryable`]
/// triggers another attempt; the delay doubles each time and is capped at
/// `retry.max_backoff_secs`.
///
/// # Errors
///
/// Returns the last transport error once attempts are exhausted, or the
/// terminal error immediately.
pub async fn send_with_retry(
    transport: &dyn PushTransport,
    token: &str,
    message: &PushMessage,
    retry: &PushRetryConfig,
) -> Result<(), PushError> {
    let mut backoff_secs = retry.backoff_secs;
    let mut attempt: u32 = 1;
    loop {
        match transport.send(token, message).await {
            Ok(()) => return Ok(()),
            Err(PushError::Retryable(reason)) if attempt < retry.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = retry.max_attempts,
                    delay_secs = backoff_secs.min(retry.max_backoff_secs),
                    %reason,
                    "transient push failure, backing off"
                );
                tokio::time::sleep(Duration::from_secs(
                    backoff_secs.min(retry.max_backoff_secs),
                ))
                .await;
                backoff_secs = backoff_secs.saturating_mul(2);
                attempt = attempt.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deliver a message to a user's registered token.
///
/// Looks up the token, sends with retry, and clears the stored token when
/// the transport reports it unregistered. Send failures are logged, not
/// propagated: one undeliverable notification must not fail the sweep.
///
/// Returns whether the message was delivered.
///
/// # Errors
///
/// Returns an error only for store failures (token lookup or cleanup).
pub async fn notify_user(
    store: &Store,
    transport: &dyn PushTransport,
    retry: &PushRetryConfig,
    user_id: &str,
    message: &PushMessage,
) -> Result<bool, StoreError> {
    let Some(token) = store.push_token(user_id).await? else {
        info!(user = user_id, "no push token registered, skipping notification");
        return Ok(false);
    };

    match send_with_retry(transport, &token, message, retry).await {
        Ok(()) => {
            info!(user = user_id, "notification sent");
            Ok(true)
        }
        Err(PushError::Unregistered) => {
            warn!(user = user_id, "push token no longer valid, clearing");
            store.clear_push_token(user_id).await?;
            Ok(false)
        }
        Err(e) => {
            warn!(user = user_id, error = %e, "notification dropped");
            Ok(false)
        }
    }
}
