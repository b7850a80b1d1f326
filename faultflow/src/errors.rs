//! Error types for the faultflow resilience engine.
//!
//! Two families exist: configuration errors raised eagerly while a pipeline
//! is being built, and execution errors returned by `Pipeline::execute`.
//! Strategies never swallow failures silently; an exhausted retry loop
//! surfaces the last observed failure unchanged inside
//! [`ResilienceError::Operation`].

use std::time::Duration;
use thiserror::Error;

/// Error raised when a strategy is added to a builder with invalid options.
///
/// Configuration problems always fail fast at `retry`/`circuit_breaker`
/// time, never during execution.
#[derive(Debug, Clone, Error)]
#[error("invalid {strategy} configuration: {message}")]
pub struct ConfigurationError {
    /// Name of the strategy being configured.
    pub strategy: String,
    /// What was wrong with the options.
    pub message: String,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

/// Terminal error returned from a pipeline execution.
///
/// `E` is the caller's failure type; it is carried through unchanged so no
/// cause information is lost.
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The protected operation failed and the failure was not (or no
    /// longer) retriable. The original failure reason is preserved.
    #[error("operation failed")]
    Operation(E),

    /// The circuit breaker rejected the call without invoking the
    /// operation because the circuit is open.
    #[error("circuit breaker is open")]
    CircuitOpen {
        /// Remaining break duration at rejection time, when known.
        retry_after: Option<Duration>,
    },

    /// The circuit breaker rejected the call because the circuit was
    /// isolated via manual control.
    #[error("circuit breaker is isolated by manual control")]
    CircuitIsolated,

    /// The execution was cancelled through the context's cancellation
    /// token. Always terminal; cancellation wins over any pending retry.
    #[error("execution cancelled: {reason}")]
    Cancelled {
        /// The reason supplied when cancellation was requested.
        reason: String,
    },

    /// A user-supplied hook (e.g. `on_retry`) failed. Hook failures are
    /// not swallowed; they abort the execution.
    #[error("strategy hook failed")]
    Hook(#[source] anyhow::Error),
}

impl<E> ResilienceError<E> {
    /// Returns true for a circuit-open or isolated rejection.
    #[must_use]
    pub const fn is_circuit_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::CircuitIsolated)
    }

    /// Returns true if the execution was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns the original operation failure, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(error) => Some(error),
            _ => None,
        }
    }
}
