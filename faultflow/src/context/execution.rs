//! The per-call execution context and its pool.

use super::{PropertyBag, PropertyKey};
use crate::cancellation::CancellationToken;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Mutable per-call state threaded through every strategy layer.
///
/// A context is acquired before a call (freshly or from a [`ContextPool`]),
/// mutated by the caller, read by strategies during execution, and released
/// afterwards. It must not be shared across concurrent executions.
pub struct ResilienceContext {
    correlation_id: RwLock<Uuid>,
    operation_key: RwLock<Option<String>>,
    properties: PropertyBag,
    cancellation: RwLock<Arc<CancellationToken>>,
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self {
            correlation_id: RwLock::new(Uuid::new_v4()),
            operation_key: RwLock::new(None),
            properties: PropertyBag::new(),
            cancellation: RwLock::new(CancellationToken::new()),
        }
    }
}

impl ResilienceContext {
    /// Creates a fresh context with its own cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the correlation id for the current execution.
    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        *self.correlation_id.read()
    }

    /// Returns the operation key, if one was set.
    #[must_use]
    pub fn operation_key(&self) -> Option<String> {
        self.operation_key.read().clone()
    }

    /// Sets the operation key used for correlation in telemetry.
    pub fn set_operation_key(&self, key: impl Into<String>) {
        *self.operation_key.write() = Some(key.into());
    }

    /// Returns the property bag.
    #[must_use]
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Convenience accessor for a typed property.
    #[must_use]
    pub fn property<T: Clone + Send + Sync + 'static>(&self, key: PropertyKey<T>) -> Option<T> {
        self.properties.get(key)
    }

    /// Returns the cancellation token attached to this context.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation.read())
    }

    /// Attaches an externally owned cancellation token.
    ///
    /// Used to link the context to an outside timeout or user-cancel
    /// source; the engine only observes the token.
    pub fn link_cancellation(&self, token: Arc<CancellationToken>) {
        *self.cancellation.write() = token;
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.read().is_cancelled()
    }

    /// Resets the context for reuse: clears properties and the operation
    /// key, replaces the cancellation token, and assigns a fresh
    /// correlation id.
    pub fn reset(&self) {
        self.properties.clear();
        *self.operation_key.write() = None;
        *self.cancellation.write() = CancellationToken::new();
        *self.correlation_id.write() = Uuid::new_v4();
    }
}

impl std::fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("correlation_id", &self.correlation_id())
            .field("operation_key", &self.operation_key())
            .field("properties", &self.properties)
            .finish()
    }
}

/// A pool of reusable contexts.
///
/// Releasing a context resets it; a context still referenced elsewhere is
/// dropped instead of being pooled so stale references can never observe a
/// later execution.
#[derive(Default)]
pub struct ContextPool {
    idle: Mutex<Vec<Arc<ResilienceContext>>>,
}

impl ContextPool {
    /// Creates a new empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide shared pool.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<ContextPool> = OnceLock::new();
        SHARED.get_or_init(Self::new)
    }

    /// Acquires a context, reusing a pooled one when available.
    #[must_use]
    pub fn acquire(&self) -> Arc<ResilienceContext> {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(ResilienceContext::new)
    }

    /// Releases a context back to the pool after resetting it.
    pub fn release(&self, context: Arc<ResilienceContext>) {
        // Only the pool may hold the context for it to be reusable.
        if Arc::strong_count(&context) == 1 {
            context.reset();
            self.idle.lock().push(context);
        }
    }

    /// Returns the number of idle pooled contexts.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
