//! HTTP push transport.
//!
//! Posts messages to a configurable gateway endpoint (an FCM-style relay).
//! Response statuses map onto the closed [`PushError`](super::PushError) set:
//! 404/410 mean the token is gone, 429 and 5xx are transient, anything else
//! is a rejection.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::{PushError, PushMessage, PushTransport};

/// HTTP connect timeout for the gateway client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Wire form of one push send.
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    token: &'a str,
    notification: Notification<'a>,
    data: &'a std::collections::HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Notification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Push transport backed by an HTTP gateway.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Create a transport posting to the given endpoint URL.
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self { client, endpoint }
    }
}

#[async_trait]
impl PushTransport for HttpTransport {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), PushError> {
        let request = SendRequest {
            token,
            notification: Notification {
                title: &message.title,
                body: &message.body,
            },
            data: &message.data,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| PushError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(PushError::Unregistered);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PushError::Retryable(format!("gateway returned {status}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(PushError::Rejected(format!(
            "gateway returned {status}: {body}"
        )))
    }
}
