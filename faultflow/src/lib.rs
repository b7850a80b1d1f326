//! # Faultflow
//!
//! Composable async resilience pipelines for fallible operations.
//!
//! Faultflow wraps an async operation in an ordered stack of
//! fault-tolerance strategies:
//!
//! - **Retry**: constant, linear, or exponential backoff with optional
//!   jitter, per-retry delay overrides, and predicate-based handling
//! - **Circuit breaking**: sliding-window failure ratios, half-open
//!   probing, dynamic break durations, and manual isolation
//! - **Execution context**: correlation ids, typed properties, and
//!   linked cancellation threaded through every layer
//! - **Telemetry**: structured fire-and-forget lifecycle events for
//!   every attempt, retry, and circuit transition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use faultflow::prelude::*;
//!
//! let pipeline: Pipeline<Response, ApiError> = PipelineBuilder::new("orders")
//!     .retry(
//!         RetryOptions::new()
//!             .with_max_retry_attempts(3)
//!             .with_backoff(BackoffKind::Exponential)
//!             .with_base_delay(Duration::from_millis(200))
//!             .with_jitter(),
//!     )?
//!     .circuit_breaker(
//!         CircuitBreakerOptions::new()
//!             .with_failure_ratio(0.5)
//!             .with_minimum_throughput(10),
//!     )?
//!     .build();
//!
//! let ctx = ResilienceContext::new();
//! let response = pipeline.execute(&ctx, |_| fetch_order(42)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod circuit;
pub mod context;
pub mod errors;
pub mod outcome;
pub mod pipeline;
pub mod retry;
pub mod telemetry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::circuit::{
        BreakDuration, CircuitBreakerOptions, CircuitBreakerStrategy, CircuitManualControl,
        CircuitState, CircuitStateProvider, StateTransition,
    };
    pub use crate::context::{ContextPool, PropertyBag, PropertyKey, ResilienceContext};
    pub use crate::errors::{ConfigurationError, ResilienceError};
    pub use crate::outcome::Outcome;
    pub use crate::pipeline::{
        ExecutionChain, Pipeline, PipelineBuilder, Strategy, StrategyResult,
    };
    pub use crate::retry::{BackoffKind, RetryOptions, RetryStrategy};
    pub use crate::telemetry::{
        init_tracing, CollectingTelemetrySink, ListenerSink, NoOpTelemetrySink, TelemetryEvent,
        TelemetryEventKind, TelemetrySink, TracingTelemetrySink,
    };
}
