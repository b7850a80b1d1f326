//! The circuit breaker strategy: fail fast while a dependency is unhealthy.

use super::control::BreakerHandle;
use super::options::CircuitBreakerOptions;
use super::state::{BreakerSettings, Rejection, SharedBreaker};
use crate::context::ResilienceContext;
use crate::errors::ResilienceError;
use crate::pipeline::{ExecutionChain, Strategy, StrategyResult};
use crate::retry::ShouldHandle;
use crate::telemetry::StrategyTelemetry;
use async_trait::async_trait;
use std::sync::Arc;

/// Gates executions on a shared breaker state machine.
///
/// All clones of a pipeline share one breaker: its metrics window and
/// state are pipeline-level, not per-call. The protected call always runs
/// outside the breaker's lock, so open-state rejection is the only way the
/// breaker limits concurrency (apart from the single half-open trial).
pub struct CircuitBreakerStrategy<T, E> {
    name: String,
    should_handle: ShouldHandle<T, E>,
    shared: Arc<SharedBreaker>,
}

impl<T, E> CircuitBreakerStrategy<T, E> {
    /// Builds the strategy from validated options and binds any attached
    /// manual control and state provider to the live breaker.
    pub(crate) fn new(options: CircuitBreakerOptions<T, E>, telemetry: StrategyTelemetry) -> Self {
        let settings = BreakerSettings {
            failure_ratio: options.failure_ratio,
            minimum_throughput: options.minimum_throughput,
            sampling_duration: options.sampling_duration,
            break_duration: options.break_duration,
            on_opened: options.on_opened,
            on_closed: options.on_closed,
            on_half_opened: options.on_half_opened,
        };
        let shared = Arc::new(SharedBreaker::new(settings, telemetry));

        if let Some(control) = options.manual_control {
            control.bind(Arc::clone(&shared) as Arc<dyn BreakerHandle>);
        }
        if let Some(provider) = options.state_provider {
            provider.bind(Arc::clone(&shared) as Arc<dyn BreakerHandle>);
        }

        Self {
            name: options.name,
            should_handle: options.should_handle,
            shared,
        }
    }
}

#[async_trait]
impl<T, E> Strategy<T, E> for CircuitBreakerStrategy<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &Arc<ResilienceContext>,
        next: ExecutionChain<'_, T, E>,
    ) -> StrategyResult<T, E> {
        let permit = match self.shared.try_acquire() {
            Ok(permit) => permit,
            Err(Rejection::Open { retry_after }) => {
                return Err(ResilienceError::CircuitOpen { retry_after });
            }
            Err(Rejection::Isolated) => return Err(ResilienceError::CircuitIsolated),
        };

        match next.proceed(ctx).await {
            Ok(outcome) => {
                if (self.should_handle)(&outcome, ctx) {
                    self.shared.record_failure(permit);
                } else if permit.is_probe() && outcome.is_failure() {
                    // An unhandled failure says nothing about recovery;
                    // the dropped permit frees the trial slot.
                    drop(permit);
                } else {
                    // Unhandled outcomes count toward throughput, not the
                    // failure ratio.
                    self.shared.record_success(permit);
                }
                Ok(outcome)
            }
            Err(error) => {
                // Terminal engine errors (cancellation, inner rejection,
                // hook failure) are not health signals; dropping the
                // permit frees any trial slot.
                drop(permit);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitState;
    use crate::context::PropertyKey;
    use crate::outcome::Outcome;
    use crate::pipeline::{Pipeline, PipelineBuilder};
    use crate::telemetry::{CollectingTelemetrySink, TelemetryEventKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn options() -> CircuitBreakerOptions<i32, String> {
        CircuitBreakerOptions::new()
            .with_failure_ratio(0.5)
            .with_minimum_throughput(4)
            .with_sampling_duration(Duration::from_secs(30))
            .with_break_duration(Duration::from_secs(5))
    }

    fn pipeline(options: CircuitBreakerOptions<i32, String>) -> Pipeline<i32, String> {
        PipelineBuilder::new("breaker-test")
            .circuit_breaker(options)
            .unwrap()
            .build()
    }

    async fn fail(pipeline: &Pipeline<i32, String>) -> Result<i32, ResilienceError<String>> {
        let ctx = ResilienceContext::new();
        pipeline
            .execute(&ctx, |_| async { Err("boom".to_string()) })
            .await
    }

    async fn succeed(pipeline: &Pipeline<i32, String>) -> Result<i32, ResilienceError<String>> {
        let ctx = ResilienceContext::new();
        pipeline.execute(&ctx, |_| async { Ok(1) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects() {
        let pipeline = pipeline(options());

        for _ in 0..2 {
            let _ = fail(&pipeline).await;
            let _ = succeed(&pipeline).await;
        }

        // 2 failures out of 4 at ratio 0.5: open.
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let ctx = ResilienceContext::new();
        let result = pipeline
            .execute(&ctx, move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            })
            .await;

        match result {
            Err(ResilienceError::CircuitOpen { retry_after }) => {
                assert!(retry_after.is_some());
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_minimum_throughput_stays_closed() {
        let pipeline = pipeline(options());

        for _ in 0..3 {
            let _ = fail(&pipeline).await;
        }

        assert!(succeed(&pipeline).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_through_half_open_probe() {
        let pipeline = pipeline(options());
        for _ in 0..4 {
            let _ = fail(&pipeline).await;
        }
        assert!(matches!(
            succeed(&pipeline).await,
            Err(ResilienceError::CircuitOpen { .. })
        ));

        tokio::time::advance(Duration::from_secs(5)).await;

        // The trial call goes through and closes the circuit.
        assert!(succeed(&pipeline).await.is_ok());
        assert!(succeed(&pipeline).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let pipeline = pipeline(options());
        for _ in 0..4 {
            let _ = fail(&pipeline).await;
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(matches!(
            fail(&pipeline).await,
            Err(ResilienceError::Operation(_))
        ));
        assert!(matches!(
            succeed(&pipeline).await,
            Err(ResilienceError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_releases_probe_slot() {
        let pipeline = pipeline(options());
        for _ in 0..4 {
            let _ = fail(&pipeline).await;
        }
        tokio::time::advance(Duration::from_secs(5)).await;

        // The trial call hangs; the caller gives up and drops the
        // execution mid-flight.
        let ctx = ResilienceContext::new();
        let trial = pipeline.execute(&ctx, |_| async {
            futures::future::pending::<Result<i32, String>>().await
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), trial).await;
        assert!(timed_out.is_err());

        // The slot is free again: the next caller probes and recovers.
        assert!(succeed(&pipeline).await.is_ok());
        assert!(succeed(&pipeline).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_predicate_counts_successes_as_failures() {
        let options = options().with_should_handle(|outcome, _| {
            matches!(outcome, Outcome::Success(value) if *value >= 500)
                || matches!(outcome, Outcome::Failure(_))
        });
        let pipeline = pipeline(options);

        for _ in 0..4 {
            let ctx = ResilienceContext::new();
            // Status-code style failure carried as a success value.
            let result = pipeline.execute(&ctx, |_| async { Ok(503) }).await;
            assert!(result.is_ok(), "handled successes surface unchanged");
        }

        assert!(matches!(
            succeed(&pipeline).await,
            Err(ResilienceError::CircuitOpen { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_property_exempts_calls() {
        const CRITICAL: PropertyKey<bool> = PropertyKey::new("critical");
        let options = options().with_should_handle(|outcome, ctx| {
            outcome.is_failure() && !ctx.property(CRITICAL).unwrap_or(false)
        });
        let pipeline = pipeline(options);

        for _ in 0..8 {
            let ctx = ResilienceContext::new();
            ctx.properties().set(CRITICAL, true);
            let _ = pipeline
                .execute(&ctx, |_| async { Err("boom".to_string()) })
                .await;
        }

        // Exempted failures never counted against the circuit.
        assert!(succeed(&pipeline).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_telemetry() {
        let sink = Arc::new(CollectingTelemetrySink::new());
        let pipeline: Pipeline<i32, String> = PipelineBuilder::new("observed")
            .telemetry(Arc::clone(&sink) as _)
            .circuit_breaker(options().with_name("db-breaker"))
            .unwrap()
            .build();

        for _ in 0..4 {
            let _ = fail(&pipeline).await;
        }
        let _ = succeed(&pipeline).await;

        let opened = sink.events_of_kind(TelemetryEventKind::CircuitOpened);
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].strategy, "db-breaker");
        assert_eq!(opened[0].state, Some(CircuitState::Open));

        let rejected = sink.events_of_kind(TelemetryEventKind::CircuitRejected);
        assert_eq!(rejected.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_break_duration_grows_across_opens() {
        let options = options().with_break_duration_generator(|failures| {
            Duration::from_secs(failures)
        });
        let pipeline = pipeline(options);

        for _ in 0..4 {
            let _ = fail(&pipeline).await;
        }
        // 4 cumulative failures: 4s break. Probe fails: 5s break.
        tokio::time::advance(Duration::from_secs(4)).await;
        let _ = fail(&pipeline).await;

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(
            succeed(&pipeline).await,
            Err(ResilienceError::CircuitOpen { .. })
        ));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(succeed(&pipeline).await.is_ok());
    }
}
