use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

use super::ProviderError;

/// Retry schedule shared by the HTTP providers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_max_retries(3)
    }
}

impl RetryPolicy {
    /// Policy with the default 500ms base delay.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Policy that never sleeps; used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
        }
    }

    pub(crate) fn should_retry_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    pub(crate) fn should_retry_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }

    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1_u32 << attempt.min(5))
    }
}

/// Send the request built by `build`, retrying rate limits, server errors, and transient
/// transport failures according to `policy`.
pub(crate) async fn send_with_retry<F>(
    policy: &RetryPolicy,
    provider: &'static str,
    build: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0_u32;
    loop {
        match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if RetryPolicy::should_retry_status(status) && attempt < policy.max_retries {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        provider,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Embedding request rejected; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(ProviderError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            Err(error) => {
                if RetryPolicy::should_retry_error(&error) && attempt < policy.max_retries {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        provider,
                        error = %error,
                        attempt = attempt + 1,
                        "Embedding request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                return Err(ProviderError::Http(error));
            }
        }
    }
}
