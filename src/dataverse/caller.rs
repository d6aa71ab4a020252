//! Retrying, authenticating request executor
//!
//! Every remote call goes through [`ApiCaller::call`]:
//! - transient statuses (429, 500, 502, 503, 504) and timeouts/connection
//!   failures are retried with exponential backoff up to `max_attempts`
//! - a `Retry-After` header overrides the computed delay
//! - the first 401 drops the cached token and retries once with a fresh one
//! - anything else is permanent and returned immediately

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::auth::TokenCache;
use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive transient failure
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }
}

/// Counts transport attempts made on behalf of one planned object
#[derive(Debug, Default)]
pub struct AttemptMeter(AtomicU32);

impl AttemptMeter {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct ApiCaller {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenCache>,
    policy: RetryPolicy,
}

impl ApiCaller {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenCache>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            tokens,
            policy,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    pub async fn call(
        &self,
        request: &ApiRequest,
        meter: &AttemptMeter,
    ) -> Result<ApiResponse, RemoteError> {
        let mut failures = 0u32;
        let mut reauthenticated = false;

        loop {
            let bearer = self.tokens.bearer().await?;
            meter.record();

            let (status, message, retry_after) = match self.transport.send(request, &bearer).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 401 => {
                    if reauthenticated {
                        return Err(RemoteError::Permanent {
                            status: Some(401),
                            message: format!(
                                "authorization denied with a fresh token: {}",
                                platform_message(&response)
                            ),
                        });
                    }
                    warn!(path = %request.path, "token rejected, refreshing");
                    self.tokens.invalidate(&bearer).await;
                    reauthenticated = true;
                    continue;
                }
                Ok(response) if RetryPolicy::is_retryable_status(response.status) => (
                    Some(response.status),
                    platform_message(&response),
                    response.retry_after(),
                ),
                Ok(response) => {
                    return Err(RemoteError::Permanent {
                        status: Some(response.status),
                        message: platform_message(&response),
                    })
                }
                Err(e) if e.is_transient() => (None, e.to_string(), None),
                Err(e) => {
                    return Err(RemoteError::Permanent {
                        status: None,
                        message: e.to_string(),
                    })
                }
            };

            failures += 1;
            if failures >= self.policy.max_attempts {
                warn!(
                    path = %request.path,
                    attempts = failures,
                    status = ?status,
                    "retry budget exhausted"
                );
                return Err(RemoteError::Transient {
                    status,
                    message,
                    attempts: failures,
                });
            }

            let delay = retry_after.unwrap_or_else(|| self.policy.backoff(failures));
            warn!(
                path = %request.path,
                attempt = failures,
                status = ?status,
                delay_ms = delay.as_millis() as u64,
                retry_after = retry_after.is_some(),
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Platform error message from an OData error body, else a body snippet
pub fn platform_message(response: &ApiResponse) -> String {
    match serde_json::from_str::<ErrorEnvelope>(&response.body) {
        Ok(envelope) => match envelope.error.code {
            Some(code) => format!("{} ({})", envelope.error.message, code),
            None => envelope.error.message,
        },
        Err(_) if response.body.trim().is_empty() => format!("HTTP {}", response.status),
        Err(_) => response.body_snippet(),
    }
}
