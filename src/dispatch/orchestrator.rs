//! Dispatch and retry orchestration.
//!
//! # Responsibilities
//! - Pick a backend per attempt (session affinity first, then the selector)
//! - Bound every attempt by a timeout and the request's overall deadline
//! - Feed every attempt outcome to the circuit breaker and stats
//! - Never try the same backend twice within one request
//! - Surface exactly one terminal result to the caller

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::load_balancer::backend::{Backend, BackendConnectionGuard};
use crate::observability::metrics;
use crate::upstream::{DispatchRequest, DispatchResponse};

impl Engine {
    /// Dispatch with the retry policy's default overall deadline.
    pub async fn dispatch(
        &self,
        request: &DispatchRequest,
        session_key: Option<&str>,
    ) -> Result<DispatchResponse, EngineError> {
        self.dispatch_with_deadline(request, session_key, self.retry.overall_deadline())
            .await
    }

    /// Dispatch one logical request, giving up once `deadline` has elapsed.
    pub async fn dispatch_with_deadline(
        &self,
        request: &DispatchRequest,
        session_key: Option<&str>,
        deadline: Duration,
    ) -> Result<DispatchResponse, EngineError> {
        let start = Instant::now();
        let session_key = session_key.filter(|_| self.sessions.is_enabled());

        let result = self.run_attempts(request, session_key, start + deadline).await;

        self.stats.record_request(result.is_ok());
        let outcome = match &result {
            Ok(_) => "success",
            Err(EngineError::AllBackendsDown) => "all_down",
            Err(e) if e.is_timeout() => "timeout",
            Err(_) => "failure",
        };
        metrics::record_request(outcome, start.into_std());

        if let Err(e) = &result {
            tracing::warn!(
                request_id = request.request_id().unwrap_or("unknown"),
                method = %request.method,
                path = %request.path_and_query,
                error = %e,
                "Dispatch failed"
            );
        }
        result
    }

    async fn run_attempts(
        &self,
        request: &DispatchRequest,
        session_key: Option<&str>,
        deadline: Instant,
    ) -> Result<DispatchResponse, EngineError> {
        let mut eligible = self.registry.list_eligible();
        if eligible.is_empty() {
            return Err(EngineError::AllBackendsDown);
        }

        let mut preferred = session_key.and_then(|key| self.sessions.get(key));
        // Backends tried, or skipped because they had no free slot.
        let mut excluded: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;
        let mut last_error: Option<EngineError> = None;

        loop {
            eligible.retain(|b| !excluded.iter().any(|id| id == b.id()));
            let Some(guard) = self.acquire(&mut eligible, preferred.take(), &mut excluded) else {
                break;
            };

            attempts += 1;
            // Counted once per logical request, on its first retry.
            if attempts == 2 {
                self.stats.record_retry();
            }
            excluded.push(guard.id().to_string());

            match self.attempt(guard, request, deadline, attempts).await {
                Ok((response, backend)) => {
                    if let Some(key) = session_key {
                        if self.sessions.get(key).as_deref() != Some(backend.id()) {
                            self.sessions.bind(key, backend.id());
                        }
                    }
                    return Ok(response);
                }
                Err(e) => last_error = Some(e),
            }

            if attempts >= self.retry.max_attempts {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            eligible = self.registry.list_eligible();
            if eligible.iter().all(|b| excluded.iter().any(|id| id == b.id())) {
                break;
            }
            let delay = self.retry.delay(attempts).min(remaining);
            tracing::debug!(attempt = attempts, delay = ?delay, "Backing off before retry");
            time::sleep(delay).await;
            if Instant::now() >= deadline {
                break;
            }

            eligible = self.registry.list_eligible();
        }

        match last_error {
            Some(last) => Err(EngineError::DispatchFailed {
                attempts,
                last: Box::new(last),
            }),
            None => Err(EngineError::NoEligibleBackend),
        }
    }

    /// Claim a slot on the preferred backend or a selected one.
    ///
    /// Candidates without a free slot (connection limit, half-open trial taken)
    /// are dropped from `candidates` and recorded in `excluded` without
    /// counting as an attempt.
    fn acquire(
        &self,
        candidates: &mut Vec<Arc<Backend>>,
        preferred: Option<String>,
        excluded: &mut Vec<String>,
    ) -> Option<BackendConnectionGuard> {
        let mut sticky = preferred.and_then(|id| candidates.iter().find(|b| b.id() == id).cloned());

        loop {
            let backend = match sticky.take() {
                Some(b) => b,
                None => match self.balancer.select(candidates) {
                    Ok(b) => b,
                    Err(_) => return None,
                },
            };

            if let Some(guard) = backend.try_acquire() {
                return Some(guard);
            }
            tracing::debug!(backend = %backend.url, "Backend has no free slot, skipping");
            excluded.push(backend.id().to_string());
            candidates.retain(|b| b.id() != backend.id());
        }
    }

    /// Run one attempt and report its outcome.
    async fn attempt(
        &self,
        mut guard: BackendConnectionGuard,
        request: &DispatchRequest,
        deadline: Instant,
        attempt: u32,
    ) -> Result<(DispatchResponse, Arc<Backend>), EngineError> {
        let backend = guard.backend.clone();
        let timeout = self
            .retry
            .attempt_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        let started = Instant::now();
        let result = time::timeout(timeout, self.upstream.send(&backend, request)).await;
        let latency = started.elapsed();

        let outcome = match result {
            Ok(Ok(response)) if response.status.is_success() => Ok(response),
            Ok(Ok(response)) => Err(EngineError::AttemptFailed {
                backend: backend.id().to_string(),
                status: Some(response.status),
                reason: format!("status {}", response.status),
            }),
            Ok(Err(e)) => Err(EngineError::AttemptFailed {
                backend: backend.id().to_string(),
                status: None,
                reason: e.to_string(),
            }),
            Err(_) => Err(EngineError::AttemptTimeout {
                backend: backend.id().to_string(),
                timeout,
            }),
        };

        let label = match &outcome {
            Ok(_) => "success",
            Err(EngineError::AttemptTimeout { .. }) => "timeout",
            Err(_) => "failure",
        };
        self.stats.record_attempt(latency);
        metrics::record_attempt(backend.id(), label, latency);

        if let Some(transition) = self.registry.record_outcome(&guard, outcome.is_ok(), latency) {
            if transition.is_trip() {
                self.stats.record_trip();
            }
        }
        guard.settle();
        drop(guard);

        match outcome {
            Ok(response) => {
                tracing::debug!(
                    backend = %backend.url,
                    attempt,
                    status = %response.status,
                    latency = ?latency,
                    "Attempt succeeded"
                );
                Ok((response, backend))
            }
            Err(e) => {
                tracing::warn!(backend = %backend.url, attempt, error = %e, "Attempt failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, BackendConfig, EngineConfig};
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::upstream::{Upstream, UpstreamError};
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        Status(u16),
        Refused,
        Hang,
    }

    /// Answers per backend id and records the order of attempts.
    #[derive(Default)]
    struct Scripted {
        behavior: Mutex<HashMap<String, Behavior>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn set(&self, port: u16, behavior: Behavior) {
            self.behavior.lock().unwrap().insert(id(port), behavior);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for Scripted {
        async fn send(&self, backend: &Backend, _: &DispatchRequest) -> Result<DispatchResponse, UpstreamError> {
            self.calls.lock().unwrap().push(backend.id().to_string());
            let behavior = self
                .behavior
                .lock()
                .unwrap()
                .get(backend.id())
                .copied()
                .unwrap_or(Behavior::Ok);
            match behavior {
                Behavior::Ok => Ok(DispatchResponse::new(StatusCode::OK).with_body(backend.id().to_string())),
                Behavior::Status(code) => Ok(DispatchResponse::new(StatusCode::from_u16(code).unwrap())),
                Behavior::Refused => Err(UpstreamError::Connect("connection refused".into())),
                Behavior::Hang => {
                    time::sleep(Duration::from_secs(3600)).await;
                    Ok(DispatchResponse::new(StatusCode::OK))
                }
            }
        }

        async fn probe(&self, _: &Backend, _: &str) -> Result<StatusCode, UpstreamError> {
            Ok(StatusCode::OK)
        }
    }

    fn id(port: u16) -> String {
        format!("http://127.0.0.1:{}/", port)
    }

    fn engine_with(n: u16, tweak: impl FnOnce(&mut EngineConfig)) -> (Engine, Arc<Scripted>) {
        let mut config = EngineConfig::default();
        for i in 0..n {
            config
                .backends
                .push(BackendConfig::new(format!("b{}", i), format!("http://127.0.0.1:{}", 7300 + i)));
        }
        config.retries.base_delay_ms = 1;
        config.retries.max_delay_ms = 5;
        tweak(&mut config);
        let upstream = Arc::new(Scripted::default());
        let engine = Engine::with_upstream(config, upstream.clone()).unwrap();
        (engine, upstream)
    }

    fn get() -> DispatchRequest {
        DispatchRequest::new(Method::GET, "/")
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let (engine, upstream) = engine_with(3, |_| {});
        let response = engine.dispatch(&get(), None).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(upstream.calls().len(), 1);

        let stats = engine.stats_collector().snapshot();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.retried_requests, 0);
    }

    #[tokio::test]
    async fn test_retries_on_different_backend() {
        let (engine, upstream) = engine_with(3, |_| {});
        upstream.set(7300, Behavior::Status(500));

        let response = engine.dispatch(&get(), None).await.unwrap();
        assert_eq!(response.body, id(7301));
        assert_eq!(upstream.calls(), vec![id(7300), id(7301)]);
        assert_eq!(engine.stats_collector().snapshot().retried_requests, 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_counts_one_failure() {
        let (engine, upstream) = engine_with(4, |_| {});
        for port in 7300..7304 {
            upstream.set(port, Behavior::Refused);
        }

        let err = engine.dispatch(&get(), None).await.unwrap_err();
        match &err {
            EngineError::DispatchFailed { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(last.is_retryable());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let calls = upstream.calls();
        assert_eq!(calls.len(), 3);
        let mut unique = calls.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);

        let stats = engine.stats_collector().snapshot();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retried_requests, 1);
    }

    #[tokio::test]
    async fn test_single_backend_single_attempt() {
        let (engine, upstream) = engine_with(1, |_| {});
        upstream.set(7300, Behavior::Status(503));

        let err = engine.dispatch(&get(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::DispatchFailed { attempts: 1, .. }));
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_all_down_without_attempts() {
        let (engine, upstream) = engine_with(2, |_| {});
        for b in engine.registry().snapshot().iter() {
            engine.registry().set_health(b, false);
        }

        let err = engine.dispatch(&get(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::AllBackendsDown));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(upstream.calls().is_empty());
        assert_eq!(engine.stats_collector().snapshot().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_failures_open_circuit() {
        let (engine, upstream) = engine_with(1, |_| {});
        upstream.set(7300, Behavior::Refused);

        for _ in 0..3 {
            let _ = engine.dispatch(&get(), None).await;
        }
        let backend = engine.registry().find(&id(7300)).unwrap();
        assert_eq!(backend.circuit_state(), CircuitState::Open);
        assert_eq!(engine.stats_collector().snapshot().circuit_trips, 1);

        let err = engine.dispatch(&get(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::AllBackendsDown));
        assert_eq!(upstream.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_then_retry() {
        let (engine, upstream) = engine_with(2, |c| c.retries.attempt_timeout_ms = 100);
        upstream.set(7300, Behavior::Hang);

        let response = engine.dispatch(&get(), None).await.unwrap();
        assert_eq!(response.body, id(7301));
        assert_eq!(engine.registry().find(&id(7300)).unwrap().connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline_reports_timeout() {
        let (engine, upstream) = engine_with(3, |c| c.retries.attempt_timeout_ms = 1000);
        for port in 7300..7303 {
            upstream.set(port, Behavior::Hang);
        }

        let err = engine
            .dispatch_with_deadline(&get(), None, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(upstream.calls().len(), 1);
        for b in engine.registry().snapshot().iter() {
            assert_eq!(b.connection_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_session_affinity_sticks_and_rebinds() {
        let (engine, upstream) = engine_with(3, |c| c.session_affinity.enabled = true);

        let first = engine.dispatch(&get(), Some("user-1")).await.unwrap();
        for _ in 0..4 {
            let again = engine.dispatch(&get(), Some("user-1")).await.unwrap();
            assert_eq!(again.body, first.body);
        }

        // The mapped backend goes down; the session moves and is rebound.
        let bound = String::from_utf8(first.body.to_vec()).unwrap();
        let backend = engine.registry().find(&bound).unwrap();
        engine.registry().set_health(&backend, false);

        let moved = engine.dispatch(&get(), Some("user-1")).await.unwrap();
        assert_ne!(moved.body, first.body);
        let rebound = String::from_utf8(moved.body.to_vec()).unwrap();
        assert_eq!(engine.sessions().get("user-1"), Some(rebound));
        assert_eq!(upstream.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_session_ignored_when_disabled() {
        let (engine, _upstream) = engine_with(2, |_| {});
        engine.dispatch(&get(), Some("user-1")).await.unwrap();
        assert!(engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_half_open_allows_one_trial() {
        let (engine, upstream) = engine_with(1, |c| c.algorithm = Algorithm::RoundRobin);
        let backend = engine.registry().snapshot()[0].clone();
        engine.registry().set_health(&backend, false);
        engine.registry().set_health(&backend, true);
        assert_eq!(backend.circuit_state(), CircuitState::HalfOpen);

        // Hold the trial slot: the backend is no longer eligible.
        let trial = backend.try_acquire().unwrap();
        assert!(trial.is_trial());
        let err = engine.dispatch(&get(), None).await.unwrap_err();
        assert!(matches!(err, EngineError::AllBackendsDown));
        drop(trial);

        engine.dispatch(&get(), None).await.unwrap();
        assert_eq!(backend.circuit_state(), CircuitState::Closed);
        assert_eq!(upstream.calls().len(), 1);
    }
}
