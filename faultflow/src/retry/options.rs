//! Retry strategy configuration.

use super::BackoffKind;
use crate::context::ResilienceContext;
use crate::errors::ConfigurationError;
use crate::outcome::Outcome;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether an outcome is eligible for handling.
///
/// Sees the full outcome (so a `Success` value can be classified as a
/// failure) and the execution context (so callers can opt calls in or out
/// per execution through properties).
pub type ShouldHandle<T, E> =
    Arc<dyn Fn(&Outcome<T, E>, &ResilienceContext) -> bool + Send + Sync>;

/// Generator that overrides the backoff formula for a single retry.
pub type DelayGenerator<T, E> =
    Arc<dyn Fn(&RetryDelayArgs<'_, T, E>) -> Option<Duration> + Send + Sync>;

/// Hook invoked before each retry wait.
pub type OnRetry<T, E> = Arc<dyn Fn(&OnRetryArgs<'_, T, E>) -> anyhow::Result<()> + Send + Sync>;

/// Arguments given to a [`DelayGenerator`].
pub struct RetryDelayArgs<'a, T, E> {
    /// Zero-based number of the attempt that just completed.
    pub attempt: u32,
    /// The outcome that triggered the retry.
    pub outcome: &'a Outcome<T, E>,
}

/// Arguments given to an [`OnRetry`] hook.
pub struct OnRetryArgs<'a, T, E> {
    /// Zero-based number of the attempt that just completed.
    pub attempt: u32,
    /// The wait before the next attempt.
    pub delay: Duration,
    /// The outcome that triggered the retry.
    pub outcome: &'a Outcome<T, E>,
}

/// Configuration for [`super::RetryStrategy`].
pub struct RetryOptions<T, E> {
    /// Strategy name used in telemetry.
    pub name: String,
    /// Maximum number of retries after the initial attempt.
    /// [`RetryOptions::INFINITE`] retries until cancelled or unhandled.
    pub max_retry_attempts: u32,
    /// Backoff formula.
    pub backoff: BackoffKind,
    /// Base delay fed into the backoff formula.
    pub base_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Option<Duration>,
    /// Whether to jitter computed delays.
    pub use_jitter: bool,
    /// Outcome classification predicate. Defaults to handling every
    /// failure outcome.
    pub should_handle: ShouldHandle<T, E>,
    /// Optional per-retry delay override. A `None` result falls back to
    /// the formula; a `Some` value is used verbatim, zero included.
    pub delay_generator: Option<DelayGenerator<T, E>>,
    /// Optional hook fired before each retry wait. A hook error aborts the
    /// execution.
    pub on_retry: Option<OnRetry<T, E>>,
}

impl<T, E> Default for RetryOptions<T, E> {
    fn default() -> Self {
        Self {
            name: "retry".to_string(),
            max_retry_attempts: 3,
            backoff: BackoffKind::default(),
            base_delay: Duration::from_secs(1),
            max_delay: None,
            use_jitter: false,
            should_handle: Arc::new(|outcome, _| outcome.is_failure()),
            delay_generator: None,
            on_retry: None,
        }
    }
}

impl<T, E> RetryOptions<T, E> {
    /// Sentinel for unbounded retries; relies on cancellation or the
    /// predicate to terminate.
    pub const INFINITE: u32 = u32::MAX;

    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strategy name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum retry attempts.
    #[must_use]
    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    /// Sets the backoff formula.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Enables jitter.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.use_jitter = true;
        self
    }

    /// Sets the handling predicate.
    #[must_use]
    pub fn with_should_handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Outcome<T, E>, &ResilienceContext) -> bool + Send + Sync + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    /// Sets the delay generator.
    #[must_use]
    pub fn with_delay_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RetryDelayArgs<'_, T, E>) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Sets the retry hook.
    #[must_use]
    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&OnRetryArgs<'_, T, E>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Validates the options, as done eagerly by the builder.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::new("retry", "name must not be empty"));
        }
        if let Some(max) = self.max_delay {
            if max < self.base_delay {
                return Err(ConfigurationError::new(
                    &self.name,
                    "max_delay must be >= base_delay",
                ));
            }
        }
        Ok(())
    }
}

impl<T, E> std::fmt::Debug for RetryOptions<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("name", &self.name)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("backoff", &self.backoff)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("use_jitter", &self.use_jitter)
            .field("delay_generator", &self.delay_generator.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options: RetryOptions<i32, String> = RetryOptions::new();
        assert_eq!(options.max_retry_attempts, 3);
        assert_eq!(options.backoff, BackoffKind::Constant);
        assert_eq!(options.base_delay, Duration::from_secs(1));
        assert!(!options.use_jitter);
    }

    #[test]
    fn test_default_predicate_handles_failures_only() {
        let options: RetryOptions<i32, String> = RetryOptions::new();
        let ctx = crate::context::ResilienceContext::new();

        assert!((options.should_handle)(&Outcome::Failure("e".to_string()), &ctx));
        assert!(!(options.should_handle)(&Outcome::Success(1), &ctx));
    }

    #[test]
    fn test_builder_style() {
        let options: RetryOptions<i32, String> = RetryOptions::new()
            .with_name("http-retry")
            .with_max_retry_attempts(5)
            .with_backoff(BackoffKind::Exponential)
            .with_base_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_jitter();

        assert_eq!(options.name, "http-retry");
        assert_eq!(options.max_retry_attempts, 5);
        assert_eq!(options.backoff, BackoffKind::Exponential);
        assert!(options.use_jitter);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let options: RetryOptions<i32, String> = RetryOptions::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(1));

        assert!(options.validate().is_err());
    }
}
