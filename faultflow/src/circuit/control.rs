//! Out-of-band circuit control and observation handles.
//!
//! Both handles are created by the caller, attached through
//! [`super::CircuitBreakerOptions`], and bound to the live breaker when the
//! pipeline is built. They are cheap to clone and safe to hold anywhere;
//! one handle may be attached to several breakers at once.

use super::state::{CircuitState, SharedBreaker};
use parking_lot::Mutex;
use std::sync::Arc;

/// Operations a control handle can perform on a bound breaker.
pub(crate) trait BreakerHandle: Send + Sync {
    fn isolate(&self);
    fn close(&self);
    fn state(&self) -> CircuitState;
}

impl BreakerHandle for SharedBreaker {
    fn isolate(&self) {
        SharedBreaker::isolate(self);
    }

    fn close(&self) {
        SharedBreaker::close(self);
    }

    fn state(&self) -> CircuitState {
        self.current_state()
    }
}

#[derive(Default)]
struct ManualInner {
    // Remembered so an isolate() issued before the pipeline is built still
    // applies once the breaker binds.
    isolated: bool,
    breakers: Vec<Arc<dyn BreakerHandle>>,
}

/// Manually forces a breaker open (`Isolated`) or closed, e.g. for
/// maintenance windows or operator intervention.
#[derive(Clone, Default)]
pub struct CircuitManualControl {
    inner: Arc<Mutex<ManualInner>>,
}

impl CircuitManualControl {
    /// Creates an unbound control handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces every bound breaker into `Isolated`. Idempotent; takes
    /// precedence over automatic transitions until [`Self::close`].
    pub fn isolate(&self) {
        let breakers: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.isolated = true;
            inner.breakers.clone()
        };
        for breaker in breakers {
            breaker.isolate();
        }
    }

    /// Manually closes every bound breaker, clearing isolation.
    pub fn close(&self) {
        let breakers: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.isolated = false;
            inner.breakers.clone()
        };
        for breaker in breakers {
            breaker.close();
        }
    }

    /// True while this handle holds its breakers isolated.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.inner.lock().isolated
    }

    pub(crate) fn bind(&self, breaker: Arc<dyn BreakerHandle>) {
        let isolated = {
            let mut inner = self.inner.lock();
            inner.breakers.push(Arc::clone(&breaker));
            inner.isolated
        };
        if isolated {
            breaker.isolate();
        }
    }
}

impl std::fmt::Debug for CircuitManualControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitManualControl")
            .field("isolated", &inner.isolated)
            .field("breakers", &inner.breakers.len())
            .finish()
    }
}

/// Read-only observer of a breaker's current state.
#[derive(Clone, Default)]
pub struct CircuitStateProvider {
    inner: Arc<Mutex<Option<Arc<dyn BreakerHandle>>>>,
}

impl CircuitStateProvider {
    /// Creates an unbound provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bound breaker's current state, or `Closed` while
    /// unbound. Break expiry is evaluated lazily at call time, so an
    /// expired open circuit reads `Open` until the next call attempt.
    #[must_use]
    pub fn current_state(&self) -> CircuitState {
        self.inner
            .lock()
            .as_ref()
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    pub(crate) fn bind(&self, breaker: Arc<dyn BreakerHandle>) {
        *self.inner.lock() = Some(breaker);
    }
}

impl std::fmt::Debug for CircuitStateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitStateProvider")
            .field("bound", &self.inner.lock().is_some())
            .finish()
    }
}
