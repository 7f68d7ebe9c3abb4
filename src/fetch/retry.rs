use super::request::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::CallError;
use crate::notify::{NotificationSink, Severity};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry bounds for outbound requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the given zero-based failed attempt: `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// HTTP client that retries failed attempts with deterministic exponential backoff
///
/// An attempt fails when the transport errors or the status is not 2xx. No jitter
/// is applied; the last error is returned once every attempt has failed.
#[derive(Clone)]
pub struct RetryingHttpClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl RetryingHttpClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            notifier: None,
        }
    }

    /// Also report failed attempts to a notification sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send with the client's default attempt bound
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, CallError> {
        self.request(request, self.policy.max_attempts).await
    }

    /// Send, retrying up to `max_attempts` times in total
    pub async fn request(
        &self,
        request: &HttpRequest,
        max_attempts: u32,
    ) -> Result<HttpResponse, CallError> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            match self.transport.execute(request).await {
                Ok(response) if response.is_success() => {
                    debug!(
                        "{} succeeded on attempt {} (status={})",
                        request.url,
                        attempt + 1,
                        response.status
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    last_error = format!("HTTP error! status: {}", response.status);
                }
                Err(e) => {
                    last_error = format!("{:#}", e);
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.policy.delay_for(attempt);
                let message = format!(
                    "Attempt {} failed ({}), retrying in {}ms...",
                    attempt + 1,
                    last_error,
                    delay.as_millis()
                );
                warn!("{}", message);
                if let Some(notifier) = &self.notifier {
                    notifier.notify(&message, Severity::Debug);
                }
                tokio::time::sleep(delay).await;
            } else {
                warn!(
                    "Attempt {} failed ({}), giving up on {}",
                    attempt + 1,
                    last_error,
                    request.url
                );
            }
        }

        Err(CallError::Network(last_error))
    }
}
