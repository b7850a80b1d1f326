//! Structured telemetry events emitted by the pipeline.

use crate::circuit::CircuitState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// The kind of lifecycle event being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TelemetryEventKind {
    /// A protected operation attempt completed.
    Attempt,
    /// A retry was scheduled after a handled failure.
    Retry,
    /// The circuit transitioned to open.
    CircuitOpened,
    /// The circuit transitioned to closed.
    CircuitClosed,
    /// The circuit transitioned to half-open.
    CircuitHalfOpened,
    /// The circuit was isolated via manual control.
    CircuitIsolated,
    /// A call was rejected by an open or isolated circuit.
    CircuitRejected,
}

/// One structured telemetry event.
///
/// Delivery is fire-and-forget from the pipeline's perspective; see
/// [`super::TelemetrySink`].
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// Pipeline name, as given to the builder.
    pub pipeline: String,
    /// Pipeline instance name, when set.
    pub instance: Option<String>,
    /// Name of the strategy that produced the event.
    pub strategy: String,
    /// Event kind.
    pub kind: TelemetryEventKind,
    /// Zero-based attempt number, for attempt/retry events.
    pub attempt: Option<u32>,
    /// Resulting circuit state, for circuit events.
    pub state: Option<CircuitState>,
    /// Measured duration: attempt elapsed time or retry delay.
    pub duration: Option<Duration>,
    /// Whether the reported attempt produced a success outcome.
    pub success: Option<bool>,
    /// Correlation id of the execution, when one was in flight.
    pub correlation_id: Option<Uuid>,
    /// Operation key of the execution, when one was set.
    pub operation_key: Option<String>,
    /// Wall-clock time at which the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Creates an event with the given identity, defaulting every optional
    /// field to `None` and stamping the current time.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        instance: Option<String>,
        strategy: impl Into<String>,
        kind: TelemetryEventKind,
    ) -> Self {
        Self {
            pipeline: pipeline.into(),
            instance,
            strategy: strategy.into(),
            kind,
            attempt: None,
            state: None,
            duration: None,
            success: None,
            correlation_id: None,
            operation_key: None,
            timestamp: Utc::now(),
        }
    }
}
