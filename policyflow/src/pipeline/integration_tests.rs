//! End-to-end composition tests for the execution pipeline.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::classify::Classifier;
    use crate::errors::{Failure, FailureKind};
    use crate::notify::{ChannelSink, CollectingSink, NotificationKind, NotificationSink};
    use crate::operation::TimeoutOperation;
    use crate::pipeline::Pipeline;
    use crate::policy::{CircuitBreaker, CircuitState, FallbackPolicy, PolicyWrap, RetryPolicy};
    use crate::testing::{DelayedOperation, GatedOperation, ScriptedOperation};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    const BREAK: Duration = Duration::from_secs(3);
    const RETRY_DELAY: Duration = Duration::from_millis(200);
    const ANY_FALLBACK: &str = "Please try again later [fallback for any exception]";
    const OPEN_FALLBACK: &str = "Please try again later [message substituted by fallback policy]";

    struct Scenario {
        pipeline: Pipeline<String>,
        breaker: CircuitBreaker,
        sink: Arc<CollectingSink>,
    }

    /// Fallback(any) → Fallback(circuit open) → Retry(forever, except open) → Breaker(4, 3s).
    fn scenario() -> Scenario {
        let sink = Arc::new(CollectingSink::new());
        let shared: Arc<dyn NotificationSink> = sink.clone();

        let breaker = CircuitBreaker::new(4, BREAK)
            .unwrap()
            .named("breaker")
            .with_sink(shared.clone());
        let retry = RetryPolicy::forever(|_| RETRY_DELAY)
            .handle(Classifier::except(FailureKind::CircuitOpen))
            .named("retry")
            .with_sink(shared.clone());
        let open_fallback = FallbackPolicy::with_value(OPEN_FALLBACK.to_string())
            .handle(Classifier::kind(FailureKind::CircuitOpen))
            .named("open-fallback")
            .with_sink(shared.clone());
        let any_fallback = FallbackPolicy::with_action(|_failure, _cancel| async {
            Ok(ANY_FALLBACK.to_string())
        })
        .named("any-fallback")
        .with_sink(shared);

        let pipeline = Pipeline::builder()
            .name("demo")
            .policy(any_fallback)
            .policy(open_fallback)
            .policy(retry)
            .policy(breaker.clone())
            .build()
            .unwrap();

        Scenario {
            pipeline,
            breaker,
            sink,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_operation_trips_then_falls_back() {
        let Scenario { pipeline, breaker, sink } = scenario();
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));

        let report = pipeline
            .execute_and_capture(op.clone(), &CancellationToken::new())
            .await;

        assert_eq!(report.result.unwrap(), OPEN_FALLBACK);
        assert_eq!(op.call_count(), 4);
        assert_eq!(report.elapsed, RETRY_DELAY * 3);
        assert_eq!(
            sink.kinds(),
            vec![
                NotificationKind::RetryScheduled,
                NotificationKind::RetryScheduled,
                NotificationKind::RetryScheduled,
                NotificationKind::BreakerOpened,
                NotificationKind::FallbackTriggered,
            ]
        );
        let notifications = sink.notifications();
        assert_eq!(notifications[4].policy, "open-fallback");
        assert_eq!(notifications[2].attempt, Some(3));
        assert_eq!(notifications[2].delay, Some(RETRY_DELAY));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_window_skips_operation() {
        let Scenario { pipeline, breaker, sink } = scenario();
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));
        let token = CancellationToken::new();

        pipeline.execute(op.clone(), &token).await.unwrap();
        sink.clear();

        for _ in 0..5 {
            let value = pipeline.execute(op.clone(), &token).await.unwrap();
            assert_eq!(value, OPEN_FALLBACK);
        }

        assert_eq!(op.call_count(), 4);
        assert_eq!(sink.count_of(NotificationKind::FallbackTriggered), 5);
        assert_eq!(sink.count_of(NotificationKind::RetryScheduled), 0);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_after_break_duration() {
        let Scenario { pipeline, breaker, sink } = scenario();
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));
        let token = CancellationToken::new();

        pipeline.execute(op.clone(), &token).await.unwrap();
        tokio::time::advance(BREAK).await;
        op.set_outcome(Ok("live".to_string()));
        sink.clear();

        assert_eq!(pipeline.execute(op.clone(), &token).await.unwrap(), "live");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert_eq!(
            sink.kinds(),
            vec![NotificationKind::BreakerHalfOpen, NotificationKind::BreakerReset]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let Scenario { pipeline, breaker, sink } = scenario();
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));
        let token = CancellationToken::new();

        pipeline.execute(op.clone(), &token).await.unwrap();
        tokio::time::advance(BREAK).await;
        sink.clear();

        let value = pipeline.execute(op.clone(), &token).await.unwrap();

        assert_eq!(value, OPEN_FALLBACK);
        assert_eq!(op.call_count(), 5);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(
            sink.kinds(),
            vec![
                NotificationKind::BreakerHalfOpen,
                NotificationKind::BreakerOpened,
                NotificationKind::FallbackTriggered,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_retry_delay_is_not_absorbed() {
        let Scenario { pipeline, sink, .. } = scenario();
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel("user pressed a key");
        });

        let err = pipeline.execute(op.clone(), &token).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.message(), "user pressed a key");
        assert_eq!(op.call_count(), 2);
        assert_eq!(sink.count_of(NotificationKind::FallbackTriggered), 0);
    }

    #[tokio::test]
    async fn test_unclassified_failure_passes_through_every_layer() {
        let sink = Arc::new(CollectingSink::new());
        let breaker = CircuitBreaker::new(1, BREAK)
            .unwrap()
            .handle(Classifier::kind(FailureKind::Transient))
            .with_sink(sink.clone());
        let pipeline = Pipeline::builder()
            .policy(
                FallbackPolicy::with_value(0u32)
                    .handle(Classifier::kind(FailureKind::CircuitOpen))
                    .with_sink(sink.clone()),
            )
            .policy(
                RetryPolicy::constant(5, Duration::ZERO)
                    .handle(Classifier::kind(FailureKind::Transient))
                    .with_sink(sink.clone()),
            )
            .policy(breaker.clone())
            .build()
            .unwrap();
        let op = Arc::new(ScriptedOperation::<u32>::always_failing(Failure::generic("bad request")));

        let err = pipeline.execute(op.clone(), &CancellationToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), &FailureKind::Generic);
        assert_eq!(err.message(), "bad request");
        assert_eq!(op.call_count(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_get_one_trial() {
        let breaker = CircuitBreaker::new(1, BREAK).unwrap();
        let pipeline = Pipeline::builder()
            .policy(FallbackPolicy::with_value(0u32).handle(Classifier::kind(FailureKind::CircuitOpen)))
            .policy(breaker.clone())
            .build()
            .unwrap();
        let gate = Arc::new(GatedOperation::new(Err::<u32, _>(Failure::transient("500"))));
        let token = CancellationToken::new();

        gate.release(1);
        assert_eq!(pipeline.execute(gate.clone(), &token).await.unwrap(), 0);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(BREAK).await;
        gate.set_outcome(Ok(42));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pipeline = pipeline.clone();
                let gate = gate.clone();
                let token = token.clone();
                tokio::spawn(async move { pipeline.execute(gate, &token).await })
            })
            .collect();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.call_count(), 2);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        gate.release(1);
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }
        values.sort_unstable();

        let mut expected = vec![0; 9];
        expected.push(42);
        assert_eq!(values, expected);
        assert_eq!(gate.max_in_flight(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_stack_admits_one_trial_under_concurrency() {
        let Scenario { pipeline, breaker, sink } = scenario();
        let gate = Arc::new(GatedOperation::new(Err::<String, _>(Failure::transient("500"))));
        let token = CancellationToken::new();

        gate.release(4);
        assert_eq!(pipeline.execute(gate.clone(), &token).await.unwrap(), OPEN_FALLBACK);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(BREAK).await;
        gate.set_outcome(Ok("live".to_string()));
        sink.clear();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pipeline = pipeline.clone();
                let gate = gate.clone();
                let token = token.clone();
                tokio::spawn(async move { pipeline.execute(gate, &token).await })
            })
            .collect();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gate.call_count(), 5);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        gate.release(1);
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(values.iter().filter(|v| v.as_str() == "live").count(), 1);
        assert_eq!(values.iter().filter(|v| v.as_str() == OPEN_FALLBACK).count(), 9);
        assert_eq!(gate.call_count(), 5);
        assert_eq!(gate.max_in_flight(), 1);
        assert_eq!(sink.count_of(NotificationKind::BreakerHalfOpen), 1);
        assert_eq!(sink.count_of(NotificationKind::RetryScheduled), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_invocations_keep_separate_retry_counts() {
        let sink = Arc::new(CollectingSink::new());
        let pipeline = Pipeline::new(
            RetryPolicy::constant(2, RETRY_DELAY).with_sink(sink.clone()),
        );
        let token = CancellationToken::new();

        let first = pipeline.execute(
            ScriptedOperation::failing_then(2, Failure::transient("500"), 1u32),
            &token,
        );
        let second = pipeline.execute(
            ScriptedOperation::failing_then(2, Failure::transient("500"), 2u32),
            &token,
        );
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 2);
        let attempts: Vec<_> = sink.notifications().iter().filter_map(|n| n.attempt).collect();
        assert_eq!(attempts.iter().filter(|&&a| a == 1).count(), 2);
        assert_eq!(attempts.iter().filter(|&&a| a == 2).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_compose_as_operations() {
        let sink = Arc::new(CollectingSink::new());
        let pipeline = Pipeline::new(
            RetryPolicy::constant(2, Duration::ZERO)
                .handle(Classifier::kind(FailureKind::Timeout))
                .with_sink(sink.clone()),
        );
        let op = TimeoutOperation::new(
            DelayedOperation::new(1u32, Duration::from_secs(5)),
            Duration::from_secs(1),
        );

        let report = pipeline.execute_and_capture(op, &CancellationToken::new()).await;

        assert_eq!(report.result.unwrap_err().kind(), &FailureKind::Timeout);
        assert_eq!(report.elapsed, Duration::from_secs(3));
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrap_reused_inside_two_pipelines() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink: Arc<dyn NotificationSink> = Arc::new(ChannelSink::new(tx));
        let breaker = CircuitBreaker::new(2, BREAK).unwrap().with_sink(sink.clone());
        let core = PolicyWrap::builder()
            .policy(RetryPolicy::forever(|_| RETRY_DELAY).handle(!Classifier::kind(FailureKind::CircuitOpen)))
            .policy(breaker.clone())
            .build()
            .unwrap()
            .named("retry-breaker");

        let cached = Pipeline::builder()
            .policy(FallbackPolicy::with_value("cached".to_string()).with_sink(sink.clone()))
            .policy(core.clone())
            .build()
            .unwrap();
        let strict = Pipeline::new(core);
        let op = Arc::new(ScriptedOperation::<String>::always_failing(Failure::transient("500")));
        let token = CancellationToken::new();

        assert_eq!(cached.execute(op.clone(), &token).await.unwrap(), "cached");
        let err = strict.execute(op.clone(), &token).await.unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(op.call_count(), 2);

        let mut kinds = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            kinds.push(notification.kind);
        }
        assert_eq!(
            kinds,
            vec![NotificationKind::BreakerOpened, NotificationKind::FallbackTriggered]
        );
    }
}
