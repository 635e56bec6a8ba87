//! Timeout and retry policy for backend calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use studydesk_core::Username;

use super::{StoreError, UserBackend, UserRecord};
use crate::config::ResilienceConfig;

/// Upper bound for a single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Wraps a backend so every call has a deadline and transient failures are
/// retried with exponential backoff plus jitter.
///
/// A retried `insert` whose first attempt actually landed reports
/// `StoreError::AlreadyExists`.
pub struct Resilient {
    inner: Arc<dyn UserBackend>,
    config: ResilienceConfig,
}

impl Resilient {
    /// Wrap `inner` with the given policy.
    #[must_use]
    pub fn new(inner: Arc<dyn UserBackend>, config: ResilienceConfig) -> Self {
        Self { inner, config }
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.config.timeout, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.config.timeout)),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.base_backoff, attempt);
                    attempt += 1;
                    tracing::warn!(
                        backend = self.inner.kind(),
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Transient backend failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if attempt > 0 {
                        tracing::error!(
                            backend = self.inner.kind(),
                            operation,
                            attempt,
                            error = %e,
                            "Backend call failed after retries"
                        );
                    }
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }
}

/// Delay before retry number `attempt + 1`: `base * 2^attempt`, capped,
/// plus up to one `base` of random jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base
        .checked_mul(2_u32.saturating_pow(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let jitter = if base_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=base_ms)
    };
    exponential + Duration::from_millis(jitter)
}

#[async_trait]
impl UserBackend for Resilient {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn fetch(&self, username: &Username) -> Result<Option<UserRecord>, StoreError> {
        self.call("fetch", || self.inner.fetch(username)).await
    }

    async fn insert(&self, username: &Username, record: &UserRecord) -> Result<(), StoreError> {
        self.call("insert", || self.inner.insert(username, record)).await
    }

    async fn set_password(&self, username: &Username, digest: &str) -> Result<(), StoreError> {
        self.call("set_password", || self.inner.set_password(username, digest))
            .await
    }

    async fn swap_password(
        &self,
        username: &Username,
        current: &str,
        replacement: &str,
    ) -> Result<bool, StoreError> {
        self.call("swap_password", || {
            self.inner.swap_password(username, current, replacement)
        })
        .await
    }

    async fn remove(&self, username: &Username) -> Result<bool, StoreError> {
        self.call("remove", || self.inner.remove(username)).await
    }
}
