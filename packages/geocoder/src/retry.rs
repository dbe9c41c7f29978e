//! HTTP retry helpers for transient geocoder errors.
//!
//! Census batch requests go through [`send_text`] so that connection
//! failures, timeouts, HTTP 429 and 5xx responses are retried with
//! exponential backoff. Client errors (4xx other than 429) are permanent
//! and returned immediately.

use std::time::Duration;

use crate::GeocodeError;

/// Retry policy for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt since builders
/// are consumed by `.send()`.
///
/// # Errors
///
/// Returns [`GeocodeError`] if the request fails after all retries or the
/// server returns a non-retryable status code.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(build_request: F, policy: RetryPolicy) -> Result<String, GeocodeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, policy).await?;
    Ok(response.text().await?)
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    policy: RetryPolicy,
) -> Result<reqwest::Response, GeocodeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut last_error: Option<GeocodeError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(GeocodeError::Http(e));
                    continue;
                }
                return Err(GeocodeError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    if attempt < max_retries {
                        log::warn!("  HTTP 429 (rate limited)");
                        last_error = Some(GeocodeError::RateLimited);
                        continue;
                    }
                    return Err(GeocodeError::RateLimited);
                }

                if status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} (server error)");
                        last_error = Some(status_error(status, "server error"));
                        continue;
                    }
                    return Err(status_error(
                        status,
                        &format!("server error after {max_retries} retries"),
                    ));
                }

                if status.is_client_error() {
                    return Err(status_error(status, "client error"));
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GeocodeError::Parse {
        message: "request failed after all retries".to_string(),
    }))
}

fn status_error(status: reqwest::StatusCode, message: &str) -> GeocodeError {
    GeocodeError::Status {
        status: status.as_u16(),
        message: message.to_string(),
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
