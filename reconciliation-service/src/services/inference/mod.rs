//! Inference client abstractions for the discrepancy analyzer.
//!
//! A `TextCompletion` provider wraps one call to a text-completion API; the
//! `InferenceClient` adds the pacing delay and the throttle-directed retry
//! policy on top of any provider.

pub mod gemini;
pub mod mock;

pub use gemini::GeminiTextCompletion;
pub use mock::MockTextCompletion;

use crate::services::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Total attempts per prompt, counting the first one.
const MAX_ATTEMPTS: u32 = 3;

/// Error type for inference operations.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited")]
    RateLimited {
        /// Server-suggested backoff, when the 429 body carried one.
        retry_after: Option<Duration>,
    },

    #[error("Rate limit retries exhausted")]
    RetriesExhausted,
}

/// One call to a text-completion service.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}

/// Pacing and retry wrapper around a completion provider.
///
/// Every attempt, including the first, is preceded by the pacing delay so the
/// aggregate call rate stays bounded no matter how many invoice tasks are in
/// flight. A throttle response with a server-suggested delay is honored and
/// retried up to [`MAX_ATTEMPTS`] total attempts; anything else surfaces to
/// the caller unchanged.
pub struct InferenceClient {
    provider: Arc<dyn TextCompletion>,
    pacing_delay: Duration,
}

impl InferenceClient {
    pub fn new(provider: Arc<dyn TextCompletion>, pacing_delay: Duration) -> Self {
        Self {
            provider,
            pacing_delay,
        }
    }

    pub async fn invoke(&self, prompt: &str) -> Result<String, InferenceError> {
        let mut attempt = 0;

        loop {
            if !self.pacing_delay.is_zero() {
                sleep(self.pacing_delay).await;
            }

            match self.provider.complete(prompt).await {
                Ok(text) => {
                    metrics::record_inference_request("ok");
                    return Ok(text);
                }
                Err(InferenceError::RateLimited {
                    retry_after: Some(delay),
                }) => {
                    attempt += 1;
                    metrics::record_inference_request("rate_limited");
                    if attempt >= MAX_ATTEMPTS {
                        warn!(attempts = attempt, "Inference retries exhausted");
                        return Err(InferenceError::RetriesExhausted);
                    }
                    warn!(
                        retry_after_secs = delay.as_secs_f64(),
                        attempt = attempt,
                        "Rate limit hit, backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    metrics::record_inference_request("error");
                    return Err(e);
                }
            }
        }
    }
}
