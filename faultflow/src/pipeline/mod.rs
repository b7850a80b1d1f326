//! Pipeline composition: the strategy onion and its entry point.
//!
//! A pipeline is an ordered sequence of strategies wrapped around a
//! protected operation. Execution enters the outermost strategy, which may
//! loop, gate, or delay before forwarding to the next layer via
//! [`ExecutionChain::proceed`]; outcomes bubble back up unchanged unless a
//! layer deliberately replaces them.

mod builder;


pub use builder::PipelineBuilder;

use crate::cancellation::CancellationToken;
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::outcome::Outcome;
use crate::telemetry::PipelineTelemetry;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

/// Result type produced by each strategy layer.
///
/// `Ok` carries the operation outcome (success or failure, still subject
/// to outer layers); `Err` carries a terminal engine error that bypasses
/// all remaining handling: circuit rejections, cancellation, hook
/// failures.
pub type StrategyResult<T, E> = Result<Outcome<T, E>, ResilienceError<E>>;

/// The boxed protected operation at the centre of the onion.
pub type BoxedOperation<T, E> =
    Box<dyn Fn(Arc<ResilienceContext>) -> BoxFuture<'static, Outcome<T, E>> + Send + Sync>;

/// One composable fault-tolerance behavior.
///
/// Implementations intercept an execution, decide to retry, short-circuit,
/// or pass through, and forward to the inner layers through `next`.
#[async_trait]
pub trait Strategy<T, E>: Send + Sync {
    /// The strategy name used in telemetry.
    fn name(&self) -> &str;

    /// Executes this layer, forwarding inward via `next.proceed(ctx)` as
    /// many times as the strategy's semantics require.
    async fn execute(
        &self,
        ctx: &Arc<ResilienceContext>,
        next: ExecutionChain<'_, T, E>,
    ) -> StrategyResult<T, E>;
}

/// The remaining inner layers of a pipeline, ending at the operation.
pub struct ExecutionChain<'a, T, E> {
    rest: &'a [Arc<dyn Strategy<T, E>>],
    operation: &'a BoxedOperation<T, E>,
    telemetry: &'a PipelineTelemetry,
}

impl<T, E> Clone for ExecutionChain<'_, T, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, E> Copy for ExecutionChain<'_, T, E> {}

impl<T, E> ExecutionChain<'_, T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Invokes the next inner layer, or the protected operation itself
    /// when no layers remain.
    ///
    /// Checks the context's cancellation token first: a cancelled context
    /// never reaches the operation.
    pub async fn proceed(self, ctx: &Arc<ResilienceContext>) -> StrategyResult<T, E> {
        match self.rest.split_first() {
            Some((head, tail)) => {
                let inner = Self {
                    rest: tail,
                    operation: self.operation,
                    telemetry: self.telemetry,
                };
                head.execute(ctx, inner).await
            }
            None => {
                let token = ctx.cancellation_token();
                if token.is_cancelled() {
                    return Err(cancellation_error(&token));
                }

                let started = Instant::now();
                let outcome = (self.operation)(Arc::clone(ctx)).await;
                self.telemetry
                    .emit_attempt(ctx, started.elapsed(), outcome.is_success());
                Ok(outcome)
            }
        }
    }
}

/// Builds the terminal cancellation error from a token's stored reason.
pub(crate) fn cancellation_error<E>(token: &CancellationToken) -> ResilienceError<E> {
    ResilienceError::Cancelled {
        reason: token
            .reason()
            .unwrap_or_else(|| "cancellation requested".to_string()),
    }
}

/// An immutable, concurrently usable composition of strategies.
///
/// Built once by [`PipelineBuilder`], executed many times. Cloning shares
/// strategy state, including the circuit breaker's metrics and state.
pub struct Pipeline<T, E> {
    strategies: Vec<Arc<dyn Strategy<T, E>>>,
    telemetry: Arc<PipelineTelemetry>,
}

impl<T, E> Clone for Pipeline<T, E> {
    fn clone(&self) -> Self {
        Self {
            strategies: self.strategies.clone(),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

impl<T, E> std::fmt::Debug for Pipeline<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.telemetry.pipeline)
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

impl<T, E> Pipeline<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn new(
        strategies: Vec<Arc<dyn Strategy<T, E>>>,
        telemetry: Arc<PipelineTelemetry>,
    ) -> Self {
        Self {
            strategies,
            telemetry,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.telemetry.pipeline
    }

    /// Returns the number of composed strategies.
    #[must_use]
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Executes the protected operation through every strategy layer and
    /// returns the raw outcome.
    ///
    /// Unlike [`Pipeline::execute`], a `Success` value that a predicate
    /// classified as a failure (and that exhausted its retries) is still
    /// returned as `Outcome::Success`, unchanged.
    ///
    /// # Errors
    ///
    /// Returns a [`ResilienceError`] for circuit rejections, cancellation,
    /// or hook failures.
    pub async fn execute_outcome<F, Fut>(
        &self,
        ctx: &Arc<ResilienceContext>,
        operation: F,
    ) -> Result<Outcome<T, E>, ResilienceError<E>>
    where
        F: Fn(Arc<ResilienceContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let boxed: BoxedOperation<T, E> = Box::new(move |ctx| {
            let fut = operation(ctx);
            Box::pin(async move { Outcome::from(fut.await) })
        });

        let chain = ExecutionChain {
            rest: &self.strategies,
            operation: &boxed,
            telemetry: &self.telemetry,
        };
        chain.proceed(ctx).await
    }

    /// Executes the protected operation and flattens the outcome.
    ///
    /// # Errors
    ///
    /// A failure outcome becomes [`ResilienceError::Operation`] carrying
    /// the original failure; circuit rejections, cancellation, and hook
    /// failures surface as their dedicated variants.
    pub async fn execute<F, Fut>(
        &self,
        ctx: &Arc<ResilienceContext>,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: Fn(Arc<ResilienceContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        match self.execute_outcome(ctx, operation).await? {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(error) => Err(ResilienceError::Operation(error)),
        }
    }
}
