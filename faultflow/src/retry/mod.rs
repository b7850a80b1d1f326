//! Retry with configurable backoff, jitter, and predicate-based handling.

mod backoff;
mod options;
mod strategy;

pub use backoff::{BackoffKind, JITTER_MAX_FACTOR, JITTER_MIN_FACTOR};
pub use options::{
    DelayGenerator, OnRetry, OnRetryArgs, RetryDelayArgs, RetryOptions, ShouldHandle,
};
pub use strategy::RetryStrategy;
