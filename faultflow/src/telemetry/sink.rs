//! Telemetry sink trait and built-in implementations.

use super::TelemetryEvent;
use tracing::{debug, info, warn, Level};

/// Receiver for pipeline telemetry events.
///
/// `try_emit` must never block the protected execution and must never
/// fail; sink problems are the sink's to isolate. Use [`ListenerSink`] to
/// adapt a fallible external listener.
pub trait TelemetrySink: Send + Sync {
    /// Delivers one event. Fire-and-forget from the pipeline's view.
    fn try_emit(&self, event: &TelemetryEvent);
}

/// A sink that discards all events. The default when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetrySink;

impl TelemetrySink for NoOpTelemetrySink {
    fn try_emit(&self, _event: &TelemetryEvent) {
        // Intentionally empty - discards all events
    }
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone)]
pub struct TracingTelemetrySink {
    level: Level,
}

impl Default for TracingTelemetrySink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl TracingTelemetrySink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl TelemetrySink for TracingTelemetrySink {
    fn try_emit(&self, event: &TelemetryEvent) {
        match self.level {
            Level::DEBUG => debug!(
                pipeline = %event.pipeline,
                strategy = %event.strategy,
                kind = ?event.kind,
                attempt = ?event.attempt,
                state = ?event.state,
                duration = ?event.duration,
                "telemetry event"
            ),
            _ => info!(
                pipeline = %event.pipeline,
                strategy = %event.strategy,
                kind = ?event.kind,
                attempt = ?event.attempt,
                state = ?event.state,
                duration = ?event.duration,
                "telemetry event"
            ),
        }
    }
}

/// A collecting sink for tests.
#[derive(Debug, Default)]
pub struct CollectingTelemetrySink {
    events: parking_lot::RwLock<Vec<TelemetryEvent>>,
}

impl CollectingTelemetrySink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the collected events of one kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: super::TelemetryEventKind) -> Vec<TelemetryEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears the collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl TelemetrySink for CollectingTelemetrySink {
    fn try_emit(&self, event: &TelemetryEvent) {
        self.events.write().push(event.clone());
    }
}

/// Adapts a fallible external listener into an infallible sink.
///
/// Listener errors and panics are isolated and reported through tracing
/// warnings; they never reach the caller's outcome.
pub struct ListenerSink<F> {
    listener: F,
}

impl<F> ListenerSink<F>
where
    F: Fn(&TelemetryEvent) -> anyhow::Result<()> + Send + Sync,
{
    /// Wraps a listener callback.
    pub const fn new(listener: F) -> Self {
        Self { listener }
    }
}

impl<F> TelemetrySink for ListenerSink<F>
where
    F: Fn(&TelemetryEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn try_emit(&self, event: &TelemetryEvent) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.listener)(event)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(kind = ?event.kind, error = %error, "telemetry listener failed");
            }
            Err(_) => {
                warn!(kind = ?event.kind, "telemetry listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::TelemetryEventKind;
    use super::*;

    fn event(kind: TelemetryEventKind) -> TelemetryEvent {
        TelemetryEvent::new("p", None, "s", kind)
    }

    #[test]
    fn test_noop_sink() {
        NoOpTelemetrySink.try_emit(&event(TelemetryEventKind::Attempt));
    }

    #[test]
    fn test_collecting_sink_filters_by_kind() {
        let sink = CollectingTelemetrySink::new();
        sink.try_emit(&event(TelemetryEventKind::Retry));
        sink.try_emit(&event(TelemetryEventKind::Retry));
        sink.try_emit(&event(TelemetryEventKind::CircuitOpened));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_kind(TelemetryEventKind::Retry).len(), 2);
        assert_eq!(
            sink.events_of_kind(TelemetryEventKind::CircuitOpened).len(),
            1
        );
    }

    #[test]
    fn test_listener_sink_isolates_errors() {
        let sink = ListenerSink::new(|_| anyhow::bail!("listener exploded"));
        // Must not panic or propagate.
        sink.try_emit(&event(TelemetryEventKind::Attempt));
    }

    #[test]
    fn test_listener_sink_isolates_panics() {
        let sink = ListenerSink::new(|_| -> anyhow::Result<()> { panic!("listener panicked") });
        sink.try_emit(&event(TelemetryEventKind::Attempt));
    }
}
