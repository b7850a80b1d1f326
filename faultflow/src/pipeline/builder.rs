//! Eagerly validated pipeline construction.

use super::{Pipeline, Strategy};
use crate::circuit::{CircuitBreakerOptions, CircuitBreakerStrategy};
use crate::errors::ConfigurationError;
use crate::retry::{RetryOptions, RetryStrategy};
use crate::telemetry::{NoOpTelemetrySink, PipelineTelemetry, StrategyTelemetry, TelemetrySink};
use std::sync::Arc;

enum StrategyConfig<T, E> {
    Retry(RetryOptions<T, E>),
    CircuitBreaker(CircuitBreakerOptions<T, E>),
    Custom(Arc<dyn Strategy<T, E>>),
}

/// Builds a [`Pipeline`] from named, validated strategy configurations.
///
/// Strategies are registered outermost-first: the first one added wraps
/// all later ones and sees the operation last. Invalid options are
/// rejected at registration time, never at execution time.
pub struct PipelineBuilder<T, E> {
    name: String,
    instance: Option<String>,
    sink: Arc<dyn TelemetrySink>,
    configs: Vec<StrategyConfig<T, E>>,
}

impl<T, E> PipelineBuilder<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Starts a builder for a pipeline with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
            sink: Arc::new(NoOpTelemetrySink),
            configs: Vec::new(),
        }
    }

    /// Distinguishes instances of the same logical pipeline in telemetry.
    #[must_use]
    pub fn instance_name(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Routes all telemetry events to the given sink. Defaults to a
    /// no-op sink.
    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a retry strategy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the options are invalid.
    pub fn retry(mut self, options: RetryOptions<T, E>) -> Result<Self, ConfigurationError> {
        options.validate()?;
        self.configs.push(StrategyConfig::Retry(options));
        Ok(self)
    }

    /// Adds a circuit breaker strategy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] when the options are invalid.
    pub fn circuit_breaker(
        mut self,
        options: CircuitBreakerOptions<T, E>,
    ) -> Result<Self, ConfigurationError> {
        options.validate()?;
        self.configs.push(StrategyConfig::CircuitBreaker(options));
        Ok(self)
    }

    /// Adds a caller-provided strategy layer.
    #[must_use]
    pub fn strategy(mut self, strategy: Arc<dyn Strategy<T, E>>) -> Self {
        self.configs.push(StrategyConfig::Custom(strategy));
        self
    }

    /// Builds the immutable pipeline, instantiating strategies in
    /// registration order and binding any circuit control handles.
    #[must_use]
    pub fn build(self) -> Pipeline<T, E> {
        let telemetry = Arc::new(PipelineTelemetry {
            pipeline: self.name,
            instance: self.instance,
            sink: self.sink,
        });

        let strategies = self
            .configs
            .into_iter()
            .map(|config| match config {
                StrategyConfig::Retry(options) => {
                    let strategy_telemetry =
                        StrategyTelemetry::new(Arc::clone(&telemetry), options.name.clone());
                    Arc::new(RetryStrategy::new(options, strategy_telemetry))
                        as Arc<dyn Strategy<T, E>>
                }
                StrategyConfig::CircuitBreaker(options) => {
                    let strategy_telemetry =
                        StrategyTelemetry::new(Arc::clone(&telemetry), options.name.clone());
                    Arc::new(CircuitBreakerStrategy::new(options, strategy_telemetry))
                        as Arc<dyn Strategy<T, E>>
                }
                StrategyConfig::Custom(strategy) => strategy,
            })
            .collect();

        Pipeline::new(strategies, telemetry)
    }
}

impl<T, E> std::fmt::Debug for PipelineBuilder<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("instance", &self.instance)
            .field("strategies", &self.configs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResilienceContext;
    use crate::pipeline::{ExecutionChain, StrategyResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Tracer {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Strategy<i32, String> for Tracer {
        fn name(&self) -> &str {
            self.label
        }

        async fn execute(
            &self,
            ctx: &Arc<ResilienceContext>,
            next: ExecutionChain<'_, i32, String>,
        ) -> StrategyResult<i32, String> {
            self.order.lock().push(self.label);
            next.proceed(ctx).await
        }
    }

    #[tokio::test]
    async fn test_registration_order_is_outermost_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new("ordered")
            .strategy(Arc::new(Tracer {
                label: "outer",
                order: Arc::clone(&order),
            }))
            .strategy(Arc::new(Tracer {
                label: "inner",
                order: Arc::clone(&order),
            }))
            .build();

        let ctx = ResilienceContext::new();
        pipeline.execute(&ctx, |_| async { Ok(1) }).await.unwrap();

        assert_eq!(*order.lock(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_invalid_retry_options_fail_at_registration() {
        let result = PipelineBuilder::<i32, String>::new("invalid").retry(
            RetryOptions::new()
                .with_base_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(1)),
        );

        let err = result.err().unwrap();
        assert!(err.to_string().contains("max_delay"));
    }

    #[tokio::test]
    async fn test_invalid_breaker_options_fail_at_registration() {
        let result = PipelineBuilder::<i32, String>::new("invalid")
            .circuit_breaker(CircuitBreakerOptions::new().with_failure_ratio(0.0));

        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_count() {
        let pipeline = PipelineBuilder::<i32, String>::new("counted")
            .retry(RetryOptions::new())
            .unwrap()
            .circuit_breaker(
                CircuitBreakerOptions::new()
                    .with_failure_ratio(0.5)
                    .with_minimum_throughput(2),
            )
            .unwrap()
            .build();

        assert_eq!(pipeline.strategy_count(), 2);
        assert_eq!(pipeline.name(), "counted");
    }
}
