//! Telemetry: structured lifecycle events, sinks, and tracing setup.
//!
//! Every attempt, retry, and circuit state transition produces a
//! [`TelemetryEvent`]. Delivery goes through a [`TelemetrySink`] and is
//! fire-and-forget: a slow or failing listener cannot block or fail the
//! protected execution.

mod event;
mod sink;

pub use event::{TelemetryEvent, TelemetryEventKind};
pub use sink::{
    CollectingTelemetrySink, ListenerSink, NoOpTelemetrySink, TelemetrySink, TracingTelemetrySink,
};

use crate::circuit::CircuitState;
use crate::context::ResilienceContext;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initializes a tracing subscriber with env-filter support.
///
/// Convenience for binaries and tests; respects `RUST_LOG`, defaulting to
/// `info`. Calling it twice is harmless: the second call fails to install
/// and is ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// Pipeline-level identity shared by all strategies of one pipeline.
pub(crate) struct PipelineTelemetry {
    pub(crate) pipeline: String,
    pub(crate) instance: Option<String>,
    pub(crate) sink: Arc<dyn TelemetrySink>,
}

impl PipelineTelemetry {
    fn event(&self, strategy: &str, kind: TelemetryEventKind) -> TelemetryEvent {
        TelemetryEvent::new(
            self.pipeline.clone(),
            self.instance.clone(),
            strategy,
            kind,
        )
    }

    /// Reports a completed attempt of the protected operation.
    pub(crate) fn emit_attempt(
        &self,
        ctx: &ResilienceContext,
        duration: Duration,
        success: bool,
    ) {
        let mut event = self.event("pipeline", TelemetryEventKind::Attempt);
        event.duration = Some(duration);
        event.success = Some(success);
        event.correlation_id = Some(ctx.correlation_id());
        event.operation_key = ctx.operation_key();
        self.sink.try_emit(&event);
    }
}

/// A strategy's handle onto the pipeline's telemetry.
#[derive(Clone)]
pub(crate) struct StrategyTelemetry {
    shared: Arc<PipelineTelemetry>,
    strategy: String,
}

impl std::fmt::Debug for StrategyTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyTelemetry")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl StrategyTelemetry {
    pub(crate) fn new(shared: Arc<PipelineTelemetry>, strategy: impl Into<String>) -> Self {
        Self {
            shared,
            strategy: strategy.into(),
        }
    }

    /// Reports a scheduled retry.
    pub(crate) fn emit_retry(&self, ctx: &ResilienceContext, attempt: u32, delay: Duration) {
        let mut event = self.shared.event(&self.strategy, TelemetryEventKind::Retry);
        event.attempt = Some(attempt);
        event.duration = Some(delay);
        event.correlation_id = Some(ctx.correlation_id());
        event.operation_key = ctx.operation_key();
        self.shared.sink.try_emit(&event);
    }

    /// Reports a circuit state transition or rejection.
    pub(crate) fn emit_circuit(&self, kind: TelemetryEventKind, state: CircuitState) {
        let mut event = self.shared.event(&self.strategy, kind);
        event.state = Some(state);
        self.shared.sink.try_emit(&event);
    }
}

/// Telemetry wired to a no-op sink, for unit tests of single strategies.
#[cfg(test)]
pub(crate) fn test_strategy_telemetry() -> StrategyTelemetry {
    StrategyTelemetry::new(
        Arc::new(PipelineTelemetry {
            pipeline: "test".to_string(),
            instance: None,
            sink: Arc::new(NoOpTelemetrySink),
        }),
        "test",
    )
}
