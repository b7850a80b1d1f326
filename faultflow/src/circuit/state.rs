//! The circuit breaker's shared state machine.
//!
//! One [`SharedBreaker`] is shared by every call flowing through one
//! pipeline instance. All state and window updates happen under a single
//! mutex; the protected call itself always runs outside that critical
//! section so executions stay concurrent. User-supplied code (lifecycle
//! hooks, telemetry sinks, break duration generators) runs after the lock
//! is released.

use super::metrics::SlidingWindow;
use super::options::BreakDuration;
use crate::telemetry::{StrategyTelemetry, TelemetryEventKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The state of a circuit breaker. Exactly one state is active at any
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls pass through; outcomes are recorded into the sliding window.
    Closed,
    /// Calls are rejected without invoking the operation.
    Open,
    /// Exactly one trial call probes recovery; others are rejected.
    HalfOpen,
    /// Forced open by manual control; only an explicit close exits.
    Isolated,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
            Self::Isolated => "isolated",
        };
        f.write_str(name)
    }
}

/// A state change reported to lifecycle hooks.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// State before the transition.
    pub from: CircuitState,
    /// State after the transition.
    pub to: CircuitState,
    /// Break duration scheduled by an opening transition.
    pub break_duration: Option<Duration>,
    /// Cumulative handled failures since the circuit last closed.
    pub failure_count: u64,
    /// True when the transition came from manual control.
    pub manual: bool,
}

/// Lifecycle hook invoked on a state transition.
pub type TransitionHook = Arc<dyn Fn(&StateTransition) + Send + Sync>;

/// Holds the single half-open trial slot.
///
/// Dropping the guard without recording an outcome (abandoned future,
/// timed-out caller) frees the slot so the next caller gets a trial; the
/// circuit can never wedge on an execution that went away.
#[derive(Debug)]
pub(crate) struct ProbeGuard {
    breaker: Option<Arc<SharedBreaker>>,
}

impl ProbeGuard {
    fn disarm(mut self) {
        self.breaker = None;
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if let Some(breaker) = self.breaker.take() {
            breaker.release_probe();
        }
    }
}

/// Permission to proceed with a call.
#[derive(Debug)]
pub(crate) enum Permit {
    /// Normal closed-state call.
    Pass,
    /// The single half-open trial call; releases its slot on drop.
    Probe(ProbeGuard),
}

impl Permit {
    pub(crate) fn is_probe(&self) -> bool {
        matches!(self, Self::Probe(_))
    }

    /// Consumes the permit without releasing the probe slot; used once an
    /// outcome has been recorded for it.
    fn disarm(self) {
        if let Self::Probe(guard) = self {
            guard.disarm();
        }
    }
}

/// Why a call was rejected without execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// The circuit is open (or a trial is already outstanding).
    Open {
        /// Remaining break duration, when known.
        retry_after: Option<Duration>,
    },
    /// The circuit is isolated by manual control.
    Isolated,
}

/// Validated breaker settings, shared across all calls.
pub(crate) struct BreakerSettings {
    pub(crate) failure_ratio: f64,
    pub(crate) minimum_throughput: u32,
    pub(crate) sampling_duration: Duration,
    pub(crate) break_duration: BreakDuration,
    pub(crate) on_opened: Option<TransitionHook>,
    pub(crate) on_closed: Option<TransitionHook>,
    pub(crate) on_half_opened: Option<TransitionHook>,
}

impl std::fmt::Debug for BreakerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerSettings")
            .field("failure_ratio", &self.failure_ratio)
            .field("minimum_throughput", &self.minimum_throughput)
            .field("sampling_duration", &self.sampling_duration)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    window: SlidingWindow,
    // None while Open means the break deadline is still being computed;
    // calls are rejected without a retry_after in that small gap.
    break_until: Option<Instant>,
    probe_in_flight: bool,
    // Accumulates across consecutive opens; reset when the circuit closes.
    failure_count: u64,
}

/// An opening transition decided under the lock, completed outside it.
struct PendingOpen {
    from: CircuitState,
    failure_count: u64,
}

/// The single point of serialization for breaker state and metrics.
#[derive(Debug)]
pub(crate) struct SharedBreaker {
    settings: BreakerSettings,
    telemetry: StrategyTelemetry,
    core: Mutex<BreakerCore>,
}

impl SharedBreaker {
    pub(crate) fn new(settings: BreakerSettings, telemetry: StrategyTelemetry) -> Self {
        let window = SlidingWindow::new(settings.sampling_duration);
        Self {
            settings,
            telemetry,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                window,
                break_until: None,
                probe_in_flight: false,
                failure_count: 0,
            }),
        }
    }

    /// Decides whether a call may proceed, lazily transitioning an expired
    /// open circuit to half-open.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Result<Permit, Rejection> {
        let now = Instant::now();
        let mut transition = None;

        let decision = {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Isolated => Err(Rejection::Isolated),
                CircuitState::Open => {
                    if core.break_until.is_some_and(|until| now >= until) {
                        core.state = CircuitState::HalfOpen;
                        core.probe_in_flight = true;
                        core.break_until = None;
                        core.window.clear();
                        transition = Some(StateTransition {
                            from: CircuitState::Open,
                            to: CircuitState::HalfOpen,
                            break_duration: None,
                            failure_count: core.failure_count,
                            manual: false,
                        });
                        Ok(())
                    } else {
                        Err(Rejection::Open {
                            retry_after: core
                                .break_until
                                .map(|until| until.saturating_duration_since(now)),
                        })
                    }
                }
                CircuitState::HalfOpen => {
                    if core.probe_in_flight {
                        Err(Rejection::Open { retry_after: None })
                    } else {
                        core.probe_in_flight = true;
                        Ok(())
                    }
                }
                CircuitState::Closed => return Ok(Permit::Pass),
            }
        };

        if let Some(transition) = transition {
            self.fire(&transition);
        }
        match decision {
            Ok(()) => Ok(Permit::Probe(ProbeGuard {
                breaker: Some(Arc::clone(self)),
            })),
            Err(rejection) => {
                self.telemetry
                    .emit_circuit(TelemetryEventKind::CircuitRejected, self.current_state());
                Err(rejection)
            }
        }
    }

    /// Records a success outcome for a completed call.
    ///
    /// A success can still open the circuit: it may lift the window total
    /// over the minimum throughput while earlier failures already satisfy
    /// the ratio.
    pub(crate) fn record_success(&self, permit: Permit) {
        let is_probe = permit.is_probe();
        permit.disarm();
        let now = Instant::now();
        let mut transition = None;
        let pending = {
            let mut core = self.core.lock();
            if is_probe {
                if core.state == CircuitState::HalfOpen {
                    transition = Some(Self::close_core(&mut core, false));
                }
                None
            } else if core.state == CircuitState::Closed {
                core.window.record(now, false);
                Self::threshold_open(&mut core, &self.settings, now)
            } else {
                None
            }
        };
        if let Some(transition) = transition {
            self.fire(&transition);
        }
        if let Some(pending) = pending {
            self.finish_open(&pending, now);
        }
    }

    /// Records a handled failure for a completed call.
    pub(crate) fn record_failure(&self, permit: Permit) {
        let is_probe = permit.is_probe();
        permit.disarm();
        let now = Instant::now();

        let pending = {
            let mut core = self.core.lock();
            if is_probe {
                if core.state == CircuitState::HalfOpen {
                    // A failed trial reopens over the incremented counter.
                    core.failure_count += 1;
                    core.state = CircuitState::Open;
                    core.probe_in_flight = false;
                    core.break_until = None;
                    Some(PendingOpen {
                        from: CircuitState::HalfOpen,
                        failure_count: core.failure_count,
                    })
                } else {
                    None
                }
            } else if core.state == CircuitState::Closed {
                core.window.record(now, true);
                Self::threshold_open(&mut core, &self.settings, now)
            } else {
                None
            }
        };

        if let Some(pending) = pending {
            self.finish_open(&pending, now);
        }
    }

    /// Releases a probe whose outcome was never recorded (unhandled
    /// failure, cancellation, or an abandoned execution): the trial was
    /// not probative and the circuit stays half-open for the next caller.
    fn release_probe(&self) {
        let mut core = self.core.lock();
        if core.state == CircuitState::HalfOpen {
            core.probe_in_flight = false;
        }
    }

    /// Forces the circuit into `Isolated`. Takes precedence over every
    /// automatic transition; idempotent.
    pub(crate) fn isolate(&self) {
        let mut transition = None;
        {
            let mut core = self.core.lock();
            if core.state != CircuitState::Isolated {
                let from = core.state;
                core.state = CircuitState::Isolated;
                core.probe_in_flight = false;
                core.break_until = None;
                transition = Some(StateTransition {
                    from,
                    to: CircuitState::Isolated,
                    break_duration: None,
                    failure_count: core.failure_count,
                    manual: true,
                });
            }
        }
        if let Some(transition) = transition {
            self.fire(&transition);
        }
    }

    /// Manually closes the circuit from any state; idempotent.
    pub(crate) fn close(&self) {
        let mut transition = None;
        {
            let mut core = self.core.lock();
            if core.state != CircuitState::Closed {
                transition = Some(Self::close_core(&mut core, true));
            }
        }
        if let Some(transition) = transition {
            self.fire(&transition);
        }
    }

    /// Returns the current stored state. Break expiry is evaluated lazily
    /// at call time, so an expired open circuit still reads `Open` here
    /// until the next call attempt.
    pub(crate) fn current_state(&self) -> CircuitState {
        self.core.lock().state
    }

    fn close_core(core: &mut BreakerCore, manual: bool) -> StateTransition {
        let from = core.state;
        core.state = CircuitState::Closed;
        core.window.clear();
        core.probe_in_flight = false;
        core.break_until = None;
        core.failure_count = 0;
        StateTransition {
            from,
            to: CircuitState::Closed,
            break_duration: None,
            failure_count: 0,
            manual,
        }
    }

    fn threshold_open(
        core: &mut BreakerCore,
        settings: &BreakerSettings,
        now: Instant,
    ) -> Option<PendingOpen> {
        let snapshot = core.window.snapshot(now);
        if snapshot.total < settings.minimum_throughput
            || snapshot.failure_ratio() < settings.failure_ratio
        {
            return None;
        }

        core.failure_count += u64::from(snapshot.failures);
        core.state = CircuitState::Open;
        core.probe_in_flight = false;
        core.break_until = None;
        core.window.clear();
        Some(PendingOpen {
            from: CircuitState::Closed,
            failure_count: core.failure_count,
        })
    }

    /// Completes an opening transition: runs the (user-supplied) break
    /// duration generator outside the lock, then stores the deadline and
    /// fires hooks. A manual transition racing the gap wins; the stale
    /// deadline is discarded.
    fn finish_open(&self, pending: &PendingOpen, now: Instant) {
        let duration = self
            .settings
            .break_duration
            .duration_for(pending.failure_count);
        {
            let mut core = self.core.lock();
            if core.state == CircuitState::Open && core.break_until.is_none() {
                core.break_until = Some(now + duration);
            }
        }
        self.fire(&StateTransition {
            from: pending.from,
            to: CircuitState::Open,
            break_duration: Some(duration),
            failure_count: pending.failure_count,
            manual: false,
        });
    }

    fn fire(&self, transition: &StateTransition) {
        tracing::info!(
            from = %transition.from,
            to = %transition.to,
            break_duration = ?transition.break_duration,
            failure_count = transition.failure_count,
            manual = transition.manual,
            "circuit state transition"
        );

        let (hook, kind) = match transition.to {
            CircuitState::Open => (&self.settings.on_opened, TelemetryEventKind::CircuitOpened),
            CircuitState::Closed => (&self.settings.on_closed, TelemetryEventKind::CircuitClosed),
            CircuitState::HalfOpen => (
                &self.settings.on_half_opened,
                TelemetryEventKind::CircuitHalfOpened,
            ),
            CircuitState::Isolated => {
                (&self.settings.on_opened, TelemetryEventKind::CircuitIsolated)
            }
        };
        if let Some(hook) = hook {
            hook(transition);
        }
        self.telemetry.emit_circuit(kind, transition.to);
    }
}
