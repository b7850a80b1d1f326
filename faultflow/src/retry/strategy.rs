//! The retry strategy: backoff-governed re-invocation.

use super::backoff::compute_delay;
use super::options::{OnRetryArgs, RetryDelayArgs, RetryOptions};
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::outcome::Outcome;
use crate::pipeline::{cancellation_error, ExecutionChain, Strategy, StrategyResult};
use crate::telemetry::StrategyTelemetry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Retries handled failures with configurable backoff.
///
/// No state survives across executions: each call runs a fresh local
/// attempt loop. Terminal engine errors from inner layers (circuit
/// rejections, cancellation) propagate untouched; they are not outcomes
/// and never reach the handling predicate.
pub struct RetryStrategy<T, E> {
    options: RetryOptions<T, E>,
    telemetry: StrategyTelemetry,
}

impl<T, E> RetryStrategy<T, E> {
    pub(crate) fn new(options: RetryOptions<T, E>, telemetry: StrategyTelemetry) -> Self {
        Self { options, telemetry }
    }

    fn delay_before_retry(&self, attempt: u32, outcome: &Outcome<T, E>) -> Duration {
        if let Some(generator) = &self.options.delay_generator {
            if let Some(delay) = generator(&RetryDelayArgs { attempt, outcome }) {
                return delay;
            }
        }
        compute_delay(
            self.options.backoff,
            self.options.base_delay,
            self.options.max_delay,
            self.options.use_jitter,
            attempt,
        )
    }

    fn retries_exhausted(&self, attempt: u32) -> bool {
        self.options.max_retry_attempts != RetryOptions::<T, E>::INFINITE
            && attempt >= self.options.max_retry_attempts
    }
}

#[async_trait]
impl<T, E> Strategy<T, E> for RetryStrategy<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.options.name
    }

    async fn execute(
        &self,
        ctx: &Arc<ResilienceContext>,
        next: ExecutionChain<'_, T, E>,
    ) -> StrategyResult<T, E> {
        let token = ctx.cancellation_token();
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Err(cancellation_error(&token));
            }

            let outcome = next.proceed(ctx).await?;

            if !(self.options.should_handle)(&outcome, ctx) {
                return Ok(outcome);
            }
            if self.retries_exhausted(attempt) {
                tracing::debug!(
                    strategy = %self.options.name,
                    attempts = attempt + 1,
                    "retries exhausted, surfacing last outcome"
                );
                return Ok(outcome);
            }

            let delay = self.delay_before_retry(attempt, &outcome);

            if let Some(hook) = &self.options.on_retry {
                hook(&OnRetryArgs {
                    attempt,
                    delay,
                    outcome: &outcome,
                })
                .map_err(ResilienceError::Hook)?;
            }

            self.telemetry.emit_retry(ctx, attempt, delay);
            tracing::debug!(
                strategy = %self.options.name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying after handled outcome"
            );

            if !delay.is_zero() {
                tokio::select! {
                    () = token.cancelled() => return Err(cancellation_error(&token)),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            attempt += 1;
        }
    }
}
