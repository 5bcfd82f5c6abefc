// src/services/generation/retry.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use super::GenerationProvider;
use crate::errors::GenerationError;
use crate::models::{StylizeParams, TryOnParams};

/// Waits `base_delay * 2^n` after failed attempt `n` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

pub struct RetryingProvider {
    inner: Arc<dyn GenerationProvider>,
    try_on: RetryPolicy,
    stylize: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn GenerationProvider>, try_on: RetryPolicy, stylize: RetryPolicy) -> Self {
        Self {
            inner,
            try_on,
            stylize,
        }
    }
}

#[async_trait]
impl GenerationProvider for RetryingProvider {
    async fn generate(&self, params: &TryOnParams) -> Result<String, GenerationError> {
        self.try_on.run(|| self.inner.generate(params)).await
    }

    async fn stylize(&self, params: &StylizeParams) -> Result<String, GenerationError> {
        self.stylize.run(|| self.inner.stylize(params)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{
        FieldError, GenerationFailure, Operation, ProviderResponseError, ValidationErrors,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with `failure`, then succeeds.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        failure: fn() -> GenerationFailure,
    }

    impl Flaky {
        fn new(failures: u32, failure: fn() -> GenerationFailure) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                failures,
                failure,
            })
        }

        fn attempt(&self, operation: Operation) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(GenerationError::new(operation, (self.failure)()))
            } else {
                Ok("QUJD".to_string())
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for Flaky {
        async fn generate(&self, _: &TryOnParams) -> Result<String, GenerationError> {
            self.attempt(Operation::TryOn)
        }

        async fn stylize(&self, _: &StylizeParams) -> Result<String, GenerationError> {
            self.attempt(Operation::Stylize)
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn no_image() -> GenerationFailure {
        ProviderResponseError::NoImageData.into()
    }

    fn invalid() -> GenerationFailure {
        ValidationErrors(vec![FieldError::new("modelImage", "bad")]).into()
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(attempts, Duration::ZERO)
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::exponential(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn stylize_retries_until_success() {
        let flaky = Flaky::new(2, no_image);
        let provider = RetryingProvider::new(flaky.clone(), RetryPolicy::none(), quick(3));

        let out = provider.stylize(&StylizeParams::default()).await.unwrap();

        assert_eq!(out, "QUJD");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_exhausting_attempts() {
        let flaky = Flaky::new(10, no_image);
        let provider = RetryingProvider::new(flaky.clone(), RetryPolicy::none(), quick(3));

        let err = provider.stylize(&StylizeParams::default()).await.unwrap_err();

        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().starts_with("generateStylized failed: No image data"));
    }

    #[tokio::test]
    async fn try_on_does_not_retry_by_default() {
        let flaky = Flaky::new(1, no_image);
        let provider = RetryingProvider::new(flaky.clone(), RetryPolicy::none(), quick(3));

        assert!(provider.generate(&TryOnParams::default()).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn try_on_retry_is_configurable() {
        let flaky = Flaky::new(1, no_image);
        let provider = RetryingProvider::new(flaky.clone(), quick(2), RetryPolicy::none());

        assert!(provider.generate(&TryOnParams::default()).await.is_ok());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let flaky = Flaky::new(10, invalid);
        let provider = RetryingProvider::new(flaky.clone(), quick(3), quick(3));

        let err = provider.generate(&TryOnParams::default()).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
