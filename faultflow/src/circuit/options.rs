//! Circuit breaker strategy configuration.

use super::control::{CircuitManualControl, CircuitStateProvider};
use super::state::TransitionHook;
use crate::errors::ConfigurationError;
use crate::retry::ShouldHandle;
use std::sync::Arc;
use std::time::Duration;

/// How long the circuit stays open after a transition to `Open`.
#[derive(Clone)]
pub enum BreakDuration {
    /// Same duration for every break.
    Fixed(Duration),
    /// Computed per break from the cumulative handled-failure count since
    /// the circuit last closed. Later breaks see a larger count, so the
    /// generator can grow the pause across consecutive opens.
    Generator(Arc<dyn Fn(u64) -> Duration + Send + Sync>),
}

impl BreakDuration {
    /// Wraps a closure as a dynamic break duration.
    pub fn generator<F>(generator: F) -> Self
    where
        F: Fn(u64) -> Duration + Send + Sync + 'static,
    {
        Self::Generator(Arc::new(generator))
    }

    pub(crate) fn duration_for(&self, failure_count: u64) -> Duration {
        match self {
            Self::Fixed(duration) => *duration,
            Self::Generator(generator) => generator(failure_count),
        }
    }
}

impl std::fmt::Debug for BreakDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(duration) => f.debug_tuple("Fixed").field(duration).finish(),
            Self::Generator(_) => f.write_str("Generator"),
        }
    }
}

/// Configuration for [`super::CircuitBreakerStrategy`].
pub struct CircuitBreakerOptions<T, E> {
    /// Strategy name used in telemetry.
    pub name: String,
    /// Failure ratio in `(0, 1]` at which the circuit opens.
    pub failure_ratio: f64,
    /// Minimum outcomes inside the window before the ratio is evaluated.
    pub minimum_throughput: u32,
    /// Length of the trailing health window.
    pub sampling_duration: Duration,
    /// How long the circuit stays open per break.
    pub break_duration: BreakDuration,
    /// Outcome classification predicate. Defaults to counting every
    /// failure outcome against the circuit.
    pub should_handle: ShouldHandle<T, E>,
    /// Fired after a transition to `Open` or `Isolated`.
    pub on_opened: Option<TransitionHook>,
    /// Fired after a transition to `Closed`.
    pub on_closed: Option<TransitionHook>,
    /// Fired after a transition to `HalfOpen`.
    pub on_half_opened: Option<TransitionHook>,
    /// Manual control handle bound to this breaker at build time.
    pub manual_control: Option<CircuitManualControl>,
    /// State observer bound to this breaker at build time.
    pub state_provider: Option<CircuitStateProvider>,
}

impl<T, E> Default for CircuitBreakerOptions<T, E> {
    fn default() -> Self {
        Self {
            name: "circuit_breaker".to_string(),
            failure_ratio: 0.1,
            minimum_throughput: 100,
            sampling_duration: Duration::from_secs(30),
            break_duration: BreakDuration::Fixed(Duration::from_secs(5)),
            should_handle: Arc::new(|outcome, _| outcome.is_failure()),
            on_opened: None,
            on_closed: None,
            on_half_opened: None,
            manual_control: None,
            state_provider: None,
        }
    }
}

impl<T, E> CircuitBreakerOptions<T, E> {
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

    /// Sets the failure ratio threshold.
    #[must_use]
    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Sets the minimum throughput gate.
    #[must_use]
    pub fn with_minimum_throughput(mut self, throughput: u32) -> Self {
        self.minimum_throughput = throughput;
        self
    }

    /// Sets the sampling window length.
    #[must_use]
    pub fn with_sampling_duration(mut self, duration: Duration) -> Self {
        self.sampling_duration = duration;
        self
    }

    /// Sets a fixed break duration.
    #[must_use]
    pub fn with_break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = BreakDuration::Fixed(duration);
        self
    }

    /// Sets a dynamic break duration generator.
    #[must_use]
    pub fn with_break_duration_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(u64) -> Duration + Send + Sync + 'static,
    {
        self.break_duration = BreakDuration::generator(generator);
        self
    }

    /// Sets the handling predicate.
    #[must_use]
    pub fn with_should_handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&crate::outcome::Outcome<T, E>, &crate::context::ResilienceContext) -> bool
            + Send
            + Sync
            + 'static,
    {
        self.should_handle = Arc::new(predicate);
        self
    }

    /// Sets the opened hook.
    #[must_use]
    pub fn with_on_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&super::StateTransition) + Send + Sync + 'static,
    {
        self.on_opened = Some(Arc::new(hook));
        self
    }

    /// Sets the closed hook.
    #[must_use]
    pub fn with_on_closed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&super::StateTransition) + Send + Sync + 'static,
    {
        self.on_closed = Some(Arc::new(hook));
        self
    }

    /// Sets the half-opened hook.
    #[must_use]
    pub fn with_on_half_opened<F>(mut self, hook: F) -> Self
    where
        F: Fn(&super::StateTransition) + Send + Sync + 'static,
    {
        self.on_half_opened = Some(Arc::new(hook));
        self
    }

    /// Attaches a manual control handle.
    #[must_use]
    pub fn with_manual_control(mut self, control: CircuitManualControl) -> Self {
        self.manual_control = Some(control);
        self
    }

    /// Attaches a state observer.
    #[must_use]
    pub fn with_state_provider(mut self, provider: CircuitStateProvider) -> Self {
        self.state_provider = Some(provider);
        self
    }

    /// Validates the options, as done eagerly by the builder.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::new(
                "circuit_breaker",
                "name must not be empty",
            ));
        }
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(ConfigurationError::new(
                &self.name,
                "failure_ratio must be in (0, 1]",
            ));
        }
        if self.minimum_throughput < 2 {
            return Err(ConfigurationError::new(
                &self.name,
                "minimum_throughput must be >= 2",
            ));
        }
        if self.sampling_duration.is_zero() {
            return Err(ConfigurationError::new(
                &self.name,
                "sampling_duration must be positive",
            ));
        }
        Ok(())
    }
}

impl<T, E> std::fmt::Debug for CircuitBreakerOptions<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerOptions")
            .field("name", &self.name)
            .field("failure_ratio", &self.failure_ratio)
            .field("minimum_throughput", &self.minimum_throughput)
            .field("sampling_duration", &self.sampling_duration)
            .field("break_duration", &self.break_duration)
            .field("manual_control", &self.manual_control.is_some())
            .field("state_provider", &self.state_provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let options: CircuitBreakerOptions<i32, String> = CircuitBreakerOptions::new();
        assert!(options.validate().is_ok());
        assert!((options.failure_ratio - 0.1).abs() < f64::EPSILON);
        assert_eq!(options.minimum_throughput, 100);
        assert_eq!(options.sampling_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        for ratio in [0.0, -0.5, 1.5] {
            let options: CircuitBreakerOptions<i32, String> =
                CircuitBreakerOptions::new().with_failure_ratio(ratio);
            assert!(options.validate().is_err(), "ratio {ratio} should fail");
        }
        let options: CircuitBreakerOptions<i32, String> =
            CircuitBreakerOptions::new().with_failure_ratio(1.0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_low_throughput() {
        let options: CircuitBreakerOptions<i32, String> =
            CircuitBreakerOptions::new().with_minimum_throughput(1);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let options: CircuitBreakerOptions<i32, String> =
            CircuitBreakerOptions::new().with_sampling_duration(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_dynamic_break_duration() {
        let duration = BreakDuration::generator(|failures| Duration::from_secs(failures.min(30)));
        assert_eq!(duration.duration_for(2), Duration::from_secs(2));
        assert_eq!(duration.duration_for(100), Duration::from_secs(30));
    }
}
