//! Circuit breaking over a sliding failure-ratio window.

mod control;
mod metrics;
mod options;
mod state;
mod strategy;

pub use control::{CircuitManualControl, CircuitStateProvider};
pub use options::{BreakDuration, CircuitBreakerOptions};
pub use state::{CircuitState, StateTransition, TransitionHook};
pub use strategy::CircuitBreakerStrategy;
