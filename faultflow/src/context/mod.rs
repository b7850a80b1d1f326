//! Per-call execution context: typed properties, cancellation, pooling.

mod execution;
mod properties;

pub use execution::{ContextPool, ResilienceContext};
pub use properties::{PropertyBag, PropertyKey};
