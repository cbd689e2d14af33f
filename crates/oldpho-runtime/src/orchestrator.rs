//! Fallback orchestrator.
//!
//! Accepts restoration requests, queues them by priority and runs at most
//! `max_concurrent` of them at a time. Each admitted task walks the
//! available providers in ascending priority order until one succeeds:
//!
//! - a failure is classified, counted against the provider and recorded in
//!   the error history
//! - quota and rate-limit failures also bench the provider for the cooldown
//! - when every provider fails, the task goes back to the front of its
//!   priority band for another pass, up to `max_retries` times
//!
//! Admission is a semaphore plus a `Notify`-driven dispatcher, so nothing
//! polls. A running task is never preempted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use oldpho_core::{
    classify, details_for_code, ErrorCode, ErrorDetails, Locale, ProcessingResult, ProviderInfo,
    ProviderStatsSnapshot, QueueStatus, RestoredImage,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::{AvailableProvider, ProviderError, ProviderRegistry};
use crate::queue::{QueuedTask, RestorationRequest, TaskQueue};
use crate::resilience::{
    ErrorHistory, ErrorReporter, ProviderStatsTracker, RetryConfig, RetryManager,
};

/// Failures a caller of the orchestrator can see.
#[derive(Error, Debug, Clone)]
pub enum OrchestratorError {
    #[error("No restoration providers are available")]
    NoProvidersAvailable,

    #[error("All providers failed after {attempts} passes: {last_error}")]
    AllProvidersFailed {
        attempts: u32,
        last_error: ErrorDetails,
    },

    #[error("Restoration timed out after {0:?}")]
    Timeout(Duration),

    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Classified form of this failure, localized for the caller.
    pub fn details(&self, locale: Locale) -> ErrorDetails {
        match self {
            OrchestratorError::AllProvidersFailed { last_error, .. } => {
                details_for_code(last_error.code, &last_error.message, locale)
            }
            OrchestratorError::NoProvidersAvailable | OrchestratorError::ShuttingDown => {
                details_for_code(ErrorCode::ServiceUnavailable, &self.to_string(), locale)
            }
            OrchestratorError::Timeout(_) => {
                details_for_code(ErrorCode::ProcessingTimeout, &self.to_string(), locale)
            }
        }
    }
}

/// A submitted request. Await [`wait`](Self::wait) for its outcome.
pub struct RestorationHandle {
    id: String,
    receiver: oneshot::Receiver<Result<ProcessingResult, OrchestratorError>>,
    timeout: Duration,
}

impl RestorationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the result, bounded by the request timeout.
    ///
    /// Timing out abandons the request; a provider call already in flight
    /// is not aborted.
    pub async fn wait(self) -> Result<ProcessingResult, OrchestratorError> {
        match tokio::time::timeout(self.timeout, self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(OrchestratorError::ShuttingDown),
            Err(_) => {
                tracing::warn!(request_id = %self.id, timeout = ?self.timeout, "Restoration timed out");
                Err(OrchestratorError::Timeout(self.timeout))
            }
        }
    }
}

struct Shared {
    registry: Arc<ProviderRegistry>,
    stats: Arc<ProviderStatsTracker>,
    history: Arc<ErrorHistory>,
    retry: Option<RetryManager>,

    queue: Mutex<TaskQueue>,
    wakeup: Notify,
    slots: Arc<Semaphore>,
    current: AtomicUsize,
    closed: AtomicBool,

    max_concurrent: usize,
    max_retries: u32,
    request_timeout: Duration,
    locale: Locale,
}

/// Decrements the in-flight counter when a task ends, however it ends.
struct SlotGuard {
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl SlotGuard {
    fn admit(shared: &Arc<Shared>, permit: OwnedSemaphorePermit) -> Self {
        shared.current.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: shared.clone(),
            _permit: permit,
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.shared.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    async fn dispatch(self: Arc<Self>) {
        loop {
            let Ok(permit) = self.slots.clone().acquire_owned().await else {
                break;
            };
            let task = loop {
                if self.closed.load(Ordering::SeqCst) {
                    return;
                }
                let next = self.queue.lock().pop_live();
                if let Some(task) = next {
                    break task;
                }
                self.wakeup.notified().await;
            };

            tracing::debug!(
                request_id = %task.request.id,
                priority = task.request.priority,
                retry = task.request.retry_count,
                "Request admitted"
            );
            let guard = SlotGuard::admit(&self, permit);
            let shared = self.clone();
            tokio::spawn(async move {
                shared.run(task).await;
                drop(guard);
            });
        }
    }

    /// One pass over the providers for `task`.
    async fn run(&self, mut task: QueuedTask) {
        let providers = self.registry.available();
        if providers.is_empty() {
            tracing::warn!(request_id = %task.request.id, "No providers available");
            task.respond(Err(OrchestratorError::NoProvidersAvailable));
            return;
        }

        let mut last_error: Option<ErrorDetails> = None;
        for provider in providers {
            let name = provider.name().to_string();
            // Benched by a concurrent task since the snapshot was taken
            if !self.registry.is_available(&name) {
                continue;
            }
            if task.responder.is_closed() {
                tracing::debug!(request_id = %task.request.id, "Caller gone, abandoning request");
                return;
            }

            task.request.assigned_provider = Some(name.clone());
            tracing::debug!(request_id = %task.request.id, provider = %name, "Trying provider");

            match self
                .attempt(&task.request.id, &provider, &task.request.image)
                .await
            {
                Ok(image) => {
                    let cost = provider.spec.cost_per_request;
                    self.stats.record_success(&name, cost);
                    // Queue wait and earlier passes included
                    let elapsed = Utc::now()
                        .signed_duration_since(task.request.enqueued_at)
                        .to_std()
                        .unwrap_or_default();
                    tracing::info!(
                        request_id = %task.request.id,
                        provider = %name,
                        cost,
                        elapsed = ?elapsed,
                        "Restoration succeeded"
                    );
                    task.respond(Ok(ProcessingResult {
                        success: true,
                        result: Some(image),
                        provider: name,
                        cost,
                        processing_time_millis: elapsed.as_millis() as u64,
                    }));
                    return;
                }
                Err(err) => {
                    let details = classify(&err, self.locale);
                    tracing::warn!(
                        request_id = %task.request.id,
                        provider = %name,
                        error_code = %details.code,
                        "Provider failed, trying next"
                    );
                    last_error = Some(details);
                }
            }
        }

        let Some(last_error) = last_error else {
            task.respond(Err(OrchestratorError::NoProvidersAvailable));
            return;
        };

        if task.request.retry_count < task.request.max_retries {
            task.request.retry_count += 1;
            tracing::info!(
                request_id = %task.request.id,
                retry = task.request.retry_count,
                max_retries = task.request.max_retries,
                "All providers failed, requeueing"
            );
            let requeued = self.queue.lock().push_front(task);
            match requeued {
                Ok(()) => self.wakeup.notify_one(),
                Err(task) => {
                    tracing::debug!(request_id = %task.request.id, "Queue closed, not requeueing");
                    task.respond(Err(OrchestratorError::ShuttingDown));
                }
            }
        } else {
            let attempts = task.request.retry_count + 1;
            tracing::error!(
                request_id = %task.request.id,
                attempts,
                error_code = %last_error.code,
                "All providers failed"
            );
            task.respond(Err(OrchestratorError::AllProvidersFailed {
                attempts,
                last_error,
            }));
        }
    }

    /// Call `provider`, with backoff retries when configured. Every failed
    /// call is recorded, retried ones included.
    async fn attempt(
        &self,
        request_id: &str,
        provider: &AvailableProvider,
        image: &[u8],
    ) -> Result<RestoredImage, ProviderError> {
        let call = move || async move {
            let outcome = provider.backend.restore(image).await;
            if let Err(err) = &outcome {
                self.record_failure(request_id, provider.name(), err);
            }
            outcome
        };
        match &self.retry {
            Some(retry) => retry.retry_with_backoff(Some(provider.name()), call).await,
            None => call().await,
        }
    }

    fn record_failure(&self, request_id: &str, provider: &str, err: &ProviderError) {
        let details = classify(err, self.locale);
        tracing::debug!(
            request_id = %request_id,
            provider = %provider,
            error_code = %details.code,
            "Provider call failed"
        );
        if details.code.trips_provider_circuit() {
            self.registry.trip(provider, details.code);
        }
        self.stats.record_failure(provider);
        self.history.record(details);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = self.queue.lock().close();
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Shutting down, rejecting queued requests");
        }
        for task in pending {
            task.respond(Err(OrchestratorError::ShuttingDown));
        }
        self.wakeup.notify_one();
    }
}

/// Priority-queued, concurrency-bounded restoration with provider fallback.
///
/// Must be created inside a tokio runtime; dropping it stops the dispatcher
/// and rejects queued requests with [`OrchestratorError::ShuttingDown`].
pub struct FallbackOrchestrator {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl FallbackOrchestrator {
    /// Orchestrator over `registry` with `config`'s limits.
    pub fn new(registry: ProviderRegistry, config: RuntimeConfig) -> Result<Self, ConfigError> {
        FallbackOrchestratorBuilder::new()
            .config(config)
            .registry(registry)
            .build()
    }

    pub fn builder() -> FallbackOrchestratorBuilder {
        FallbackOrchestratorBuilder::new()
    }

    /// Enqueue a request and return immediately.
    pub fn submit(&self, image: impl Into<Vec<u8>>, priority: i32) -> RestorationHandle {
        let request = RestorationRequest::new(image.into(), priority, self.shared.max_retries);
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();
        let task = QueuedTask::new(request, tx);

        let queued = self.shared.queue.lock().push(task);
        match queued {
            Ok(()) => {
                tracing::debug!(request_id = %id, priority, "Request queued");
                self.shared.wakeup.notify_one();
            }
            Err(task) => task.respond(Err(OrchestratorError::ShuttingDown)),
        }

        RestorationHandle {
            id,
            receiver: rx,
            timeout: self.shared.request_timeout,
        }
    }

    /// Restore `image`, falling back across providers.
    pub async fn process_with_fallback(
        &self,
        image: impl Into<Vec<u8>>,
        priority: i32,
    ) -> Result<ProcessingResult, OrchestratorError> {
        self.submit(image, priority).wait().await
    }

    pub fn queue_status(&self) -> QueueStatus {
        let current = self.shared.current.load(Ordering::SeqCst);
        QueueStatus {
            queue_length: self.shared.queue.lock().len(),
            current_concurrent: current,
            max_concurrent: self.shared.max_concurrent,
            processing: current > 0,
        }
    }

    pub fn provider_stats(&self) -> BTreeMap<String, ProviderStatsSnapshot> {
        self.shared.stats.snapshot()
    }

    /// Zero every provider counter (operator action).
    pub fn reset_provider_stats(&self) {
        self.shared.stats.reset();
    }

    pub fn get_available_providers(&self) -> Vec<ProviderInfo> {
        self.shared.registry.available_providers()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.shared.registry
    }

    pub fn error_history(&self) -> &ErrorHistory {
        &self.shared.history
    }

    /// Stop admitting work and reject everything still queued.
    pub fn shutdown(&self) {
        self.shared.close();
    }
}

impl Drop for FallbackOrchestrator {
    fn drop(&mut self) {
        self.shared.close();
        self.dispatcher.abort();
    }
}

/// Builder for [`FallbackOrchestrator`].
pub struct FallbackOrchestratorBuilder {
    config: RuntimeConfig,
    registry: Option<Arc<ProviderRegistry>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    provider_retry: Option<RetryConfig>,
}

impl FallbackOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: None,
            reporter: None,
            provider_retry: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Share a registry with other components.
    pub fn shared_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Forward escalated errors to `reporter`.
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Retry each provider call with backoff before falling back.
    pub fn provider_retry(mut self, retry: RetryConfig) -> Self {
        self.provider_retry = Some(retry);
        self
    }

    /// Validate the configuration and start the dispatcher.
    ///
    /// Without an explicit registry the built-in providers are configured
    /// from the environment.
    pub fn build(self) -> Result<FallbackOrchestrator, ConfigError> {
        let config = self.config;
        config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ProviderRegistry::from_config(&config)));

        let stats = Arc::new(ProviderStatsTracker::new());
        for name in registry.names() {
            stats.register(&name);
        }

        let mut history = ErrorHistory::new(config.error_history_capacity);
        if let Some(reporter) = self.reporter {
            history = history.with_reporter(reporter);
        }

        let retry = self
            .provider_retry
            .map(|retry| RetryManager::new(retry).with_locale(config.locale));

        let shared = Arc::new(Shared {
            registry,
            stats,
            history: Arc::new(history),
            retry,
            queue: Mutex::new(TaskQueue::new()),
            wakeup: Notify::new(),
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            current: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            max_concurrent: config.max_concurrent,
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
            locale: config.locale,
        });

        tracing::info!(
            providers = ?shared.registry.names(),
            max_concurrent = config.max_concurrent,
            max_retries = config.max_retries,
            "Fallback orchestrator started"
        );
        let dispatcher = tokio::spawn(shared.clone().dispatch());

        Ok(FallbackOrchestrator { shared, dispatcher })
    }
}

impl Default for FallbackOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CredentialSource, ProviderSpec, RestorationProvider};
    use async_trait::async_trait;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Mock provider that records call order and can be held at a gate.
    struct MockProvider {
        name: &'static str,
        failures_left: AtomicUsize,
        error: fn() -> ProviderError,
        gate: Option<Arc<Semaphore>>,
        calls: AtomicUsize,
        log: Log,
    }

    const ALWAYS: usize = usize::MAX;

    impl MockProvider {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                failures_left: AtomicUsize::new(0),
                error: || ProviderError::Http("connection reset".into()),
                gate: None,
                calls: AtomicUsize::new(0),
                log: log.clone(),
            }
        }

        fn failing(mut self, times: usize, error: fn() -> ProviderError) -> Self {
            self.failures_left = AtomicUsize::new(times);
            self.error = error;
            self
        }

        fn gated(mut self, gate: &Arc<Semaphore>) -> Self {
            self.gate = Some(gate.clone());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RestorationProvider for MockProvider {
        async fn restore(&self, image: &[u8]) -> Result<RestoredImage, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tag = String::from_utf8_lossy(image).into_owned();
            self.log.lock().push(format!("start {}", tag));

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            self.log.lock().push(format!("end {}", tag));

            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                if left != ALWAYS {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                }
                return Err((self.error)());
            }
            Ok(RestoredImage::new(format!("https://{}.example/out.png", self.name)))
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn registry(providers: Vec<(u32, f64, Arc<MockProvider>)>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(Duration::from_secs(60));
        for (priority, cost, provider) in providers {
            let spec = ProviderSpec::new(provider.name, priority).with_cost(cost);
            registry
                .register(spec, provider, Some(CredentialSource::Programmatic))
                .unwrap();
        }
        registry
    }

    fn config(max_concurrent: usize, max_retries: u32) -> RuntimeConfig {
        RuntimeConfig {
            max_concurrent,
            max_retries,
            ..Default::default()
        }
    }

    async fn until(mut condition: impl FnMut() -> bool) {
        for _ in 0..2000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    fn starts(log: &Log) -> Vec<String> {
        log.lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix("start ").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(ALWAYS, || {
            ProviderError::Http("connection refused".into())
        }));
        let b = Arc::new(MockProvider::new("B", &log));
        let orchestrator = FallbackOrchestrator::new(
            registry(vec![(1, 0.0023, a.clone()), (2, 0.04, b.clone())]),
            config(3, 3),
        )
        .unwrap();

        let result = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await.unwrap();
        assert!(result.success);
        assert_eq!(result.provider, "B");
        assert_eq!(result.cost, 0.04);
        assert_eq!(result.result.unwrap().url, "https://B.example/out.png");

        let stats = orchestrator.provider_stats();
        assert_eq!(stats["A"].failure, 1);
        assert_eq!(stats["A"].total_cost, 0.0);
        assert_eq!(stats["B"].success, 1);
        assert_eq!(stats["B"].total_cost, 0.04);
        assert_eq!(stats["B"].success_rate, 1.0);

        let errors = orchestrator.error_history().recent(10);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::NetworkError);
    }

    #[tokio::test]
    async fn test_non_retryable_provider_error_still_falls_back() {
        let log = Log::default();
        let a = Arc::new(
            MockProvider::new("A", &log).failing(ALWAYS, || ProviderError::Auth),
        );
        let b = Arc::new(MockProvider::new("B", &log));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a), (2, 0.0, b)]), config(3, 3))
                .unwrap();

        let result = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await.unwrap();
        assert_eq!(result.provider, "B");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_failure_benches_provider_for_cooldown() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(ALWAYS, || {
            ProviderError::QuotaExceeded("monthly spend limit reached".into())
        }));
        let b = Arc::new(MockProvider::new("B", &log));
        let orchestrator = FallbackOrchestrator::new(
            registry(vec![(1, 0.0, a.clone()), (2, 0.0, b.clone())]),
            config(3, 3),
        )
        .unwrap();

        let result = orchestrator.process_with_fallback(b"one".to_vec(), 0).await.unwrap();
        assert_eq!(result.provider, "B");

        let names = |o: &FallbackOrchestrator| -> Vec<String> {
            o.get_available_providers().into_iter().map(|p| p.name).collect()
        };
        assert_eq!(names(&orchestrator), vec!["B"]);

        // Benched provider is skipped entirely
        orchestrator.process_with_fallback(b"two".to_vec(), 0).await.unwrap();
        assert_eq!(a.calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(names(&orchestrator), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(MockProvider::new("A", &log).gated(&gate));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a)]), config(1, 3)).unwrap();

        let first = orchestrator.submit(b"job1".to_vec(), 0);
        let second = orchestrator.submit(b"job2".to_vec(), 0);

        until(|| starts(&log) == vec!["job1"]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(starts(&log), vec!["job1"]);

        let status = orchestrator.queue_status();
        assert_eq!(status.current_concurrent, 1);
        assert_eq!(status.max_concurrent, 1);
        assert_eq!(status.queue_length, 1);
        assert!(status.processing);

        gate.add_permits(2);
        first.wait().await.unwrap();
        second.wait().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["start job1", "end job1", "start job2", "end job2"]
        );
        until(|| !orchestrator.queue_status().processing).await;
    }

    #[tokio::test]
    async fn test_higher_priority_dispatched_first() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(MockProvider::new("A", &log).gated(&gate));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a)]), config(1, 3)).unwrap();

        let blocker = orchestrator.submit(b"blocker".to_vec(), 10);
        until(|| starts(&log) == vec!["blocker"]).await;

        let low = orchestrator.submit(b"p1".to_vec(), 1);
        let high = orchestrator.submit(b"p5".to_vec(), 5);
        gate.add_permits(3);

        for handle in [blocker, low, high] {
            handle.wait().await.unwrap();
        }
        assert_eq!(starts(&log), vec!["blocker", "p5", "p1"]);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(ALWAYS, || {
            ProviderError::PredictionFailed("CUDA out of memory".into())
        }));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a.clone())]), config(3, 2)).unwrap();

        let err = orchestrator
            .process_with_fallback(b"photo".to_vec(), 0)
            .await
            .unwrap_err();
        match err {
            OrchestratorError::AllProvidersFailed { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error.code, ErrorCode::ProcessingFailed);
                assert!(!last_error.user_message.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.calls(), 3);
        assert_eq!(orchestrator.provider_stats()["A"].failure, 3);
    }

    #[tokio::test]
    async fn test_task_retry_recovers() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(1, || {
            ProviderError::Http("socket hang up".into())
        }));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a.clone())]), config(3, 3)).unwrap();

        let result = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await.unwrap();
        assert_eq!(result.provider, "A");
        assert_eq!(a.calls(), 2);

        let stats = orchestrator.provider_stats();
        assert_eq!(stats["A"].success, 1);
        assert_eq!(stats["A"].failure, 1);
        assert_eq!(stats["A"].success_rate, 0.5);
    }

    #[tokio::test]
    async fn test_provider_retry_before_fallback() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(1, || {
            ProviderError::Http("connection reset".into())
        }));
        let b = Arc::new(MockProvider::new("B", &log));
        let orchestrator = FallbackOrchestrator::builder()
            .registry(registry(vec![(1, 0.0, a.clone()), (2, 0.0, b.clone())]))
            .provider_retry(RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            })
            .build()
            .unwrap();

        let result = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await.unwrap();
        assert_eq!(result.provider, "A");
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 0);

        let stats = orchestrator.provider_stats();
        assert_eq!(stats["A"].failure, 1);
        assert_eq!(stats["A"].success, 1);
        assert_eq!(orchestrator.error_history().len(), 1);
    }

    #[tokio::test]
    async fn test_every_retried_failure_is_counted() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log).failing(ALWAYS, || {
            ProviderError::Http("connection reset".into())
        }));
        let b = Arc::new(MockProvider::new("B", &log));
        let orchestrator = FallbackOrchestrator::builder()
            .registry(registry(vec![(1, 0.0, a.clone()), (2, 0.0, b.clone())]))
            .provider_retry(RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            })
            .build()
            .unwrap();

        let result = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await.unwrap();
        assert_eq!(result.provider, "B");
        assert_eq!(a.calls(), 3);

        let stats = orchestrator.provider_stats();
        assert_eq!(stats["A"].failure, a.calls() as u64);
        assert_eq!(stats["B"].success, 1);
        assert_eq!(orchestrator.error_history().len(), 3);
    }

    #[tokio::test]
    async fn test_processing_time_includes_queue_wait() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(MockProvider::new("A", &log).gated(&gate));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a)]), config(1, 3)).unwrap();

        let handle = orchestrator.submit(b"photo".to_vec(), 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        gate.add_permits(1);

        let result = handle.wait().await.unwrap();
        assert!(result.processing_time_millis >= 40);
    }

    #[tokio::test]
    async fn test_no_providers_fails_immediately() {
        let orchestrator =
            FallbackOrchestrator::new(ProviderRegistry::default(), config(3, 3)).unwrap();
        let err = orchestrator
            .process_with_fallback(b"photo".to_vec(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoProvidersAvailable));
        assert_eq!(err.details(Locale::En).code, ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_uncredentialed_provider_not_called() {
        let log = Log::default();
        let a = Arc::new(MockProvider::new("A", &log));
        let mut registry = ProviderRegistry::default();
        registry
            .register(ProviderSpec::new("A", 1), a.clone(), None)
            .unwrap();
        let orchestrator = FallbackOrchestrator::new(registry, config(3, 3)).unwrap();

        let err = orchestrator.process_with_fallback(b"photo".to_vec(), 0).await;
        assert!(matches!(err, Err(OrchestratorError::NoProvidersAvailable)));
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(MockProvider::new("A", &log).gated(&gate));
        let orchestrator = FallbackOrchestrator::new(
            registry(vec![(1, 0.0, a)]),
            RuntimeConfig {
                request_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .unwrap();

        let err = orchestrator
            .process_with_fallback(b"photo".to_vec(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout(_)));
        assert_eq!(err.details(Locale::En).code, ErrorCode::ProcessingTimeout);
        gate.add_permits(1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_requests() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(MockProvider::new("A", &log).gated(&gate));
        let orchestrator =
            FallbackOrchestrator::new(registry(vec![(1, 0.0, a)]), config(1, 3)).unwrap();

        let running = orchestrator.submit(b"running".to_vec(), 0);
        until(|| starts(&log) == vec!["running"]).await;
        let queued = orchestrator.submit(b"queued".to_vec(), 0);

        drop(orchestrator);
        assert!(matches!(queued.wait().await, Err(OrchestratorError::ShuttingDown)));

        // Admitted work still completes
        gate.add_permits(1);
        assert!(running.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_during_failing_pass_answers_caller() {
        let log = Log::default();
        let gate = Arc::new(Semaphore::new(0));
        let a = Arc::new(
            MockProvider::new("A", &log)
                .gated(&gate)
                .failing(ALWAYS, || ProviderError::Http("connection reset".into())),
        );
        let orchestrator = FallbackOrchestrator::new(
            registry(vec![(1, 0.0, a.clone())]),
            RuntimeConfig {
                max_concurrent: 1,
                request_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        )
        .unwrap();

        let handle = orchestrator.submit(b"photo".to_vec(), 0);
        until(|| starts(&log) == vec!["photo"]).await;
        orchestrator.shutdown();
        gate.add_permits(1);

        let outcome = handle.wait().await;
        assert!(matches!(outcome, Err(OrchestratorError::ShuttingDown)));
        assert_eq!(orchestrator.queue_status().queue_length, 0);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let orchestrator =
            FallbackOrchestrator::new(ProviderRegistry::default(), config(1, 3)).unwrap();
        orchestrator.shutdown();
        let handle = orchestrator.submit(b"late".to_vec(), 0);
        assert!(matches!(handle.wait().await, Err(OrchestratorError::ShuttingDown)));
    }

    #[test]
    fn test_all_failed_details_relocalize() {
        let last_error = details_for_code(ErrorCode::ReplicateQuotaExceeded, "quota", Locale::En);
        let err = OrchestratorError::AllProvidersFailed {
            attempts: 4,
            last_error,
        };
        let vi = err.details(Locale::Vi);
        assert_eq!(vi.code, ErrorCode::ReplicateQuotaExceeded);
        assert_eq!(vi.message, "quota");
        assert!(err.to_string().contains("4 passes"));
    }
}
