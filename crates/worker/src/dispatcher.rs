//! Generation job dispatcher.
//!
//! Routes one job to the persistent pod when it is configured and ready,
//! and to the serverless pool otherwise. Every outcome is a terminal
//! [`JobStatusRecord`]; the only error a caller ever sees is a
//! [`ConfigError`] raised before any network I/O.
//!
//! Fallback rules:
//!
//! - pod not configured, `force_elastic`, or failed readiness probe:
//!   serverless.
//! - pod generate failed at the transport level: serverless.
//! - pod generate completed, or the pod rejected the job: returned as-is.
//!   A rejected job is not replayed on serverless, since generations are
//!   not idempotent.
//! - pod returned a non-terminal record: reported as a normalization
//!   failure.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use gendispatch_cloud::{
    poll_until_terminal, PodBackend, PodClient, ServerlessBackend, ServerlessClient,
};
use gendispatch_core::config::{ConfigResolver, ConfigSource, Configuration};
use gendispatch_core::error::ConfigError;
use gendispatch_core::error::NormalizationError;
use gendispatch_core::job::{
    Backend, JobFailure, JobHandle, JobPayload, JobState, JobStatusRecord,
};
use tracing::Instrument;

/// Per-call routing overrides.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Skip the pod entirely.
    pub force_elastic: bool,
    /// Pod base URL for this call, in place of the configured one.
    pub pod_base_url: Option<String>,
    /// Submit to serverless without the synchronous window and go
    /// straight to polling.
    pub prefer_async: bool,
}

impl DispatchOptions {
    /// Skip the pod and go straight to serverless.
    pub fn force_elastic(mut self) -> Self {
        self.force_elastic = true;
        self
    }

    /// Use `url` as the pod base URL for this call.
    pub fn with_pod_base_url(mut self, url: impl Into<String>) -> Self {
        self.pod_base_url = Some(url.into());
        self
    }

    /// Skip the synchronous serverless window.
    pub fn prefer_async(mut self) -> Self {
        self.prefer_async = true;
        self
    }
}

/// Routes jobs across the two backends.
///
/// Holds no per-job state; one instance can serve concurrent dispatches.
pub struct Dispatcher {
    config: Arc<Configuration>,
    pod: Arc<dyn PodBackend>,
    serverless: Arc<dyn ServerlessBackend>,
}

impl Dispatcher {
    /// Create a dispatcher backed by the HTTP clients.
    pub fn new(config: Configuration) -> Self {
        let http = reqwest::Client::new();
        let pod = Arc::new(PodClient::with_client(http.clone(), &config));
        let serverless = Arc::new(ServerlessClient::with_client(http, &config));
        Self::with_backends(Arc::new(config), pod, serverless)
    }

    /// Resolve configuration and create a dispatcher, failing fast when
    /// required settings are missing.
    pub fn from_resolver<S: ConfigSource>(
        resolver: &ConfigResolver<S>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(resolver.resolve()?))
    }

    /// Create a dispatcher over arbitrary backend implementations.
    pub fn with_backends(
        config: Arc<Configuration>,
        pod: Arc<dyn PodBackend>,
        serverless: Arc<dyn ServerlessBackend>,
    ) -> Self {
        Self {
            config,
            pod,
            serverless,
        }
    }

    /// The resolved configuration this dispatcher runs with.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Run one job to a terminal status.
    ///
    /// Never returns `IN_QUEUE`/`IN_PROGRESS`. Transport, backend, and
    /// timeout conditions are reported through the record.
    pub async fn dispatch(
        &self,
        mode: &str,
        payload: &JobPayload,
        options: &DispatchOptions,
    ) -> Result<JobStatusRecord, ConfigError> {
        self.config.validate()?;

        let correlation_id = payload
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = tracing::info_span!("dispatch", mode, correlation_id = %correlation_id);

        let record = self.route(mode, payload, options).instrument(span).await;
        Ok(record)
    }

    /// Dispatch many jobs with at most `concurrency` in flight.
    ///
    /// Results come back in input order.
    pub async fn dispatch_all(
        &self,
        jobs: Vec<(String, JobPayload)>,
        options: &DispatchOptions,
        concurrency: usize,
    ) -> Result<Vec<JobStatusRecord>, ConfigError> {
        self.config.validate()?;

        stream::iter(jobs)
            .map(|(mode, payload)| async move {
                self.dispatch(&mode, &payload, options).await
            })
            .buffered(concurrency.max(1))
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    // ---- private helpers ----

    async fn route(
        &self,
        mode: &str,
        payload: &JobPayload,
        options: &DispatchOptions,
    ) -> JobStatusRecord {
        let record = match self.try_pod(payload, options).await {
            Some(record) => record,
            None => self.run_serverless(mode, payload, options).await,
        };

        tracing::info!(
            job_id = %record.id,
            backend = %record.backend,
            status = %record.status(),
            "Dispatch finished",
        );
        record
    }

    /// Pod path. `None` means "use serverless instead".
    async fn try_pod(
        &self,
        payload: &JobPayload,
        options: &DispatchOptions,
    ) -> Option<JobStatusRecord> {
        if options.force_elastic {
            tracing::debug!("Pod skipped: serverless forced");
            return None;
        }

        let base_url = options
            .pod_base_url
            .as_deref()
            .or(self.config.persistent_base_url.as_deref())?
            .trim_end_matches('/');

        if !self.pod.health_check(base_url).await {
            tracing::info!(base_url, "Pod not ready, using serverless");
            return None;
        }

        let record = self.pod.generate(base_url, &payload.body).await;
        match record.failure() {
            Some(failure) if failure.kind.is_transport() => {
                tracing::warn!(
                    base_url,
                    error = %failure.message,
                    "Pod unreachable during generate, falling back to serverless",
                );
                None
            }
            _ if !record.is_terminal() => {
                tracing::error!(
                    job_id = %record.id,
                    status = %record.status(),
                    "Pod returned a pending job",
                );
                let failure = NormalizationError(format!(
                    "pod returned non-terminal status {}",
                    record.status()
                ));
                Some(JobStatusRecord::failed(record.id, Backend::Pod, failure.into()))
            }
            _ => Some(record),
        }
    }

    async fn run_serverless(
        &self,
        mode: &str,
        payload: &JobPayload,
        options: &DispatchOptions,
    ) -> JobStatusRecord {
        let Some(endpoint_id) = self.config.endpoint_for(mode) else {
            tracing::warn!(mode, "No serverless endpoint configured for mode");
            return JobStatusRecord::failed(
                local_id(),
                Backend::Serverless,
                JobFailure::config(format!(
                    "no serverless endpoint configured for mode {mode:?}"
                )),
            );
        };

        let submitted = if options.prefer_async {
            match self.serverless.submit_async(endpoint_id, &payload.body).await {
                Ok(handle) => {
                    JobStatusRecord::new(handle.as_str(), Backend::Serverless, JobState::InQueue)
                }
                Err(e) => {
                    tracing::warn!(endpoint_id, error = %e, "Submit failed");
                    return JobStatusRecord::failed(
                        local_id(),
                        Backend::Serverless,
                        e.into_failure(),
                    );
                }
            }
        } else {
            self.serverless.submit_sync(endpoint_id, &payload.body).await
        };

        if submitted.is_terminal() {
            return submitted;
        }

        tracing::info!(
            endpoint_id,
            job_id = %submitted.id,
            status = %submitted.status(),
            "Job still pending, polling",
        );
        let handle = JobHandle::new(submitted.id);
        poll_until_terminal(
            self.serverless.as_ref(),
            endpoint_id,
            &handle,
            self.config.poll_budget(),
        )
        .await
    }
}

/// Id for records that never reached a backend.
fn local_id() -> String {
    format!("dispatch-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use gendispatch_cloud::ClientError;
    use gendispatch_core::config::{
        ApiKey, MapSource, ELASTIC_API_KEY, MAX_POLL_ATTEMPTS, MAX_POLL_DURATION_SECS,
        MODE_ENDPOINTS, PERSISTENT_BASE_URL, POLL_INTERVAL_SECS,
    };
    use gendispatch_core::job::{
        CancelReason, FailureKind, GeneratedImage, JobOutput, JobStatus,
    };
    use serde_json::{json, Map, Value};

    use super::*;

    // -----------------------------------------------------------------------
    // Fakes
    // -----------------------------------------------------------------------

    fn completed(id: &str, backend: Backend, images: &[&str]) -> JobStatusRecord {
        let images = images.iter().map(|d| GeneratedImage::base64(*d)).collect();
        JobStatusRecord::completed(id, backend, JobOutput::new(images, Map::new()).unwrap())
    }

    fn pending(id: &str, state: JobState) -> JobStatusRecord {
        JobStatusRecord::new(id, Backend::Serverless, state)
    }

    struct FakePod {
        healthy: bool,
        outcome: JobStatusRecord,
        health_calls: AtomicUsize,
        generate_calls: AtomicUsize,
        last_base_url: Mutex<Option<String>>,
    }

    impl FakePod {
        fn new(healthy: bool, outcome: JobStatusRecord) -> Self {
            Self {
                healthy,
                outcome,
                health_calls: AtomicUsize::new(0),
                generate_calls: AtomicUsize::new(0),
                last_base_url: Mutex::new(None),
            }
        }

        fn healthy_completing() -> Self {
            Self::new(true, completed("pod-1", Backend::Pod, &["cG9k"]))
        }

        fn health_calls(&self) -> usize {
            self.health_calls.load(Ordering::SeqCst)
        }

        fn generate_calls(&self) -> usize {
            self.generate_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PodBackend for FakePod {
        async fn health_check(&self, base_url: &str) -> bool {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_base_url.lock().unwrap() = Some(base_url.to_string());
            self.healthy
        }

        async fn generate(&self, _: &str, _: &Value) -> JobStatusRecord {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct FakeServerless {
        sync_outcome: JobStatusRecord,
        async_handle: Option<&'static str>,
        polls: Mutex<VecDeque<JobStatusRecord>>,
        sync_calls: AtomicUsize,
        async_calls: AtomicUsize,
        poll_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
    }

    impl FakeServerless {
        fn new(sync_outcome: JobStatusRecord, polls: Vec<JobStatusRecord>) -> Self {
            Self {
                sync_outcome,
                async_handle: Some("async-1"),
                polls: Mutex::new(polls.into()),
                sync_calls: AtomicUsize::new(0),
                async_calls: AtomicUsize::new(0),
                poll_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
            }
        }

        fn completing() -> Self {
            Self::new(completed("sls-1", Backend::Serverless, &["aW1nQQ=="]), Vec::new())
        }

        fn calls(&self) -> (usize, usize, usize, usize) {
            (
                self.sync_calls.load(Ordering::SeqCst),
                self.async_calls.load(Ordering::SeqCst),
                self.poll_calls.load(Ordering::SeqCst),
                self.cancel_calls.load(Ordering::SeqCst),
            )
        }

        fn touched(&self) -> bool {
            self.calls() != (0, 0, 0, 0)
        }
    }

    #[async_trait]
    impl ServerlessBackend for FakeServerless {
        async fn submit_sync(&self, _: &str, _: &Value) -> JobStatusRecord {
            self.sync_calls.fetch_add(1, Ordering::SeqCst);
            self.sync_outcome.clone()
        }

        async fn submit_async(&self, _: &str, _: &Value) -> Result<JobHandle, ClientError> {
            self.async_calls.fetch_add(1, Ordering::SeqCst);
            self.async_handle
                .map(JobHandle::new)
                .ok_or(ClientError::Unavailable { status: 503 })
        }

        async fn poll_status(
            &self,
            _: &str,
            handle: &JobHandle,
        ) -> Result<JobStatusRecord, ClientError> {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.polls.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| pending(handle.as_str(), JobState::InProgress)))
        }

        async fn cancel(&self, _: &str, _: &JobHandle) -> Result<(), ClientError> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn source() -> MapSource {
        MapSource::new()
            .with(ELASTIC_API_KEY, "rp_key")
            .with(MODE_ENDPOINTS, "wizard=ep-wiz,fast=ep-fast")
            .with(POLL_INTERVAL_SECS, "1")
    }

    fn config_from(source: MapSource) -> Arc<Configuration> {
        Arc::new(ConfigResolver::new(source).resolve().unwrap())
    }

    fn with_pod(source: MapSource) -> MapSource {
        source.with(PERSISTENT_BASE_URL, "http://pod:8000")
    }

    fn dispatcher(
        config: Arc<Configuration>,
        pod: &Arc<FakePod>,
        serverless: &Arc<FakeServerless>,
    ) -> Dispatcher {
        Dispatcher::with_backends(config, pod.clone(), serverless.clone())
    }

    fn payload() -> JobPayload {
        JobPayload::new(json!({ "prompt": "a lighthouse at dusk" })).with_correlation_id("req-42")
    }

    // -----------------------------------------------------------------------
    // Serverless path
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn sync_completion_needs_no_polling() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(source()), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.status(), JobStatus::Completed);
        assert_eq!(record.images().map(<[_]>::len), Some(1));
        assert_eq!(sls.calls(), (1, 0, 0, 0));
        assert_eq!(pod.health_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_job_is_polled_to_completion() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::new(
            pending("job-7", JobState::InQueue),
            vec![
                pending("job-7", JobState::InProgress),
                completed("job-7", Backend::Serverless, &["aW1nQg==", "aW1nQw=="]),
            ],
        ));
        let d = dispatcher(config_from(source()), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.id, "job-7");
        let images = record.images().unwrap();
        assert_eq!(images[0].data, "aW1nQg==");
        assert_eq!(images[1].data, "aW1nQw==");
        assert_eq!(sls.calls(), (1, 0, 2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_is_cancelled_after_attempt_budget() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::new(pending("job-8", JobState::InProgress), Vec::new()));
        let d = dispatcher(config_from(source().with(MAX_POLL_ATTEMPTS, "3")), &pod, &sls);

        let record = d
            .dispatch("fast", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.status(), JobStatus::Cancelled);
        assert_eq!(record.cancel_reason(), Some(CancelReason::Timeout));
        assert_eq!(sls.calls(), (1, 0, 3, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_returns_within_duration_budget() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::new(pending("job-9", JobState::InQueue), Vec::new()));
        let config = config_from(
            source()
                .with(MAX_POLL_DURATION_SECS, "10")
                .with(POLL_INTERVAL_SECS, "3"),
        );
        let d = dispatcher(config, &pod, &sls);
        let started = tokio::time::Instant::now();

        let record = d
            .dispatch("fast", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.error_message().as_deref(), Some("timeout"));
        assert!(started.elapsed() <= Duration::from_secs(10 + 3));
        assert_eq!(sls.calls().3, 1);
    }

    #[tokio::test]
    async fn unconfigured_mode_is_config_failure_not_error() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(source()), &pod, &sls);

        let record = d
            .dispatch("poster", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        let failure = record.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Config);
        assert!(failure.message.contains("poster"));
        assert!(!sls.touched());
    }

    #[tokio::test(start_paused = true)]
    async fn prefer_async_skips_runsync() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::new(
            completed("unused", Backend::Serverless, &["eA=="]),
            vec![completed("async-1", Backend::Serverless, &["YXN5bmM="])],
        ));
        let d = dispatcher(config_from(source()), &pod, &sls);

        let options = DispatchOptions::default().prefer_async();
        let record = d
            .dispatch("wizard", &payload(), &options)
            .await
            .unwrap();

        assert_eq!(record.id, "async-1");
        assert_eq!(sls.calls(), (0, 1, 1, 0));
    }

    #[tokio::test]
    async fn failed_async_submit_is_failed_record() {
        let pod = Arc::new(FakePod::healthy_completing());
        let mut fake = FakeServerless::completing();
        fake.async_handle = None;
        let sls = Arc::new(fake);
        let d = dispatcher(config_from(source()), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default().prefer_async())
            .await
            .unwrap();

        assert_eq!(record.failure().unwrap().kind, FailureKind::Transport);
        assert_eq!(sls.calls(), (0, 1, 0, 0));
    }

    // -----------------------------------------------------------------------
    // Pod path and fallback
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn healthy_pod_serves_the_job() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.backend, Backend::Pod);
        assert_eq!(pod.generate_calls(), 1);
        assert!(!sls.touched());
    }

    #[tokio::test]
    async fn unhealthy_pod_is_never_asked_to_generate() {
        let pod = Arc::new(FakePod::new(false, completed("pod-x", Backend::Pod, &["eA=="])));
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.backend, Backend::Serverless);
        assert_eq!(record.status(), JobStatus::Completed);
        assert_eq!(pod.health_calls(), 1);
        assert_eq!(pod.generate_calls(), 0);
        assert_eq!(sls.calls().0, 1);
    }

    #[tokio::test]
    async fn pod_transport_failure_falls_back() {
        let pod = Arc::new(FakePod::new(
            true,
            JobStatusRecord::failed(
                "pod-t",
                Backend::Pod,
                JobFailure::transport("connection reset"),
            ),
        ));
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.backend, Backend::Serverless);
        assert_eq!(record.status(), JobStatus::Completed);
        assert_eq!(pod.generate_calls(), 1);
    }

    #[tokio::test]
    async fn pod_rejection_is_final() {
        let pod = Arc::new(FakePod::new(
            true,
            JobStatusRecord::failed("pod-r", Backend::Pod, JobFailure::backend("invalid workflow")),
        ));
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.id, "pod-r");
        assert_eq!(record.failure().unwrap().kind, FailureKind::Backend);
        assert!(!sls.touched());
    }

    #[tokio::test]
    async fn pod_unrecognized_response_is_final() {
        let pod = Arc::new(FakePod::new(
            true,
            JobStatusRecord::failed(
                "pod-n",
                Backend::Pod,
                gendispatch_core::error::NormalizationError("no image list".into()).into(),
            ),
        ));
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert_eq!(record.failure().unwrap().kind, FailureKind::Normalization);
        assert!(!sls.touched());
    }

    #[tokio::test]
    async fn pending_pod_record_becomes_terminal_failure() {
        let pod = Arc::new(FakePod::new(
            true,
            JobStatusRecord::new("pod-q", Backend::Pod, JobState::InQueue),
        ));
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default())
            .await
            .unwrap();

        assert!(record.is_terminal());
        assert_eq!(record.id, "pod-q");
        assert_eq!(record.backend, Backend::Pod);
        let failure = record.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Normalization);
        assert!(failure.message.contains("IN_QUEUE"), "{}", failure.message);
        assert!(!sls.touched());
    }

    #[tokio::test]
    async fn force_elastic_skips_pod() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(with_pod(source())), &pod, &sls);

        let record = d
            .dispatch("wizard", &payload(), &DispatchOptions::default().force_elastic())
            .await
            .unwrap();

        assert_eq!(record.backend, Backend::Serverless);
        assert_eq!(pod.health_calls(), 0);
    }

    #[tokio::test]
    async fn option_base_url_enables_pod_for_one_call() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(source()), &pod, &sls);

        let options = DispatchOptions::default().with_pod_base_url("http://other-pod:9000/");
        let record = d
            .dispatch("wizard", &payload(), &options)
            .await
            .unwrap();

        assert_eq!(record.backend, Backend::Pod);
        assert_eq!(
            pod.last_base_url.lock().unwrap().as_deref(),
            Some("http://other-pod:9000")
        );
    }

    // -----------------------------------------------------------------------
    // Configuration gate
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn missing_credential_fails_before_any_io() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let mut config = ConfigResolver::new(with_pod(source())).resolve().unwrap();
        config.elastic_api_key = ApiKey::new("");
        let d = dispatcher(Arc::new(config), &pod, &sls);

        let result = d.dispatch("wizard", &payload(), &DispatchOptions::default()).await;

        assert_matches!(result, Err(ConfigError::MissingCredential(ELASTIC_API_KEY)));
        assert_eq!(pod.health_calls(), 0);
        assert!(!sls.touched());
    }

    #[test]
    fn from_resolver_requires_credential() {
        let resolver = ConfigResolver::new(MapSource::new().with(MODE_ENDPOINTS, "wizard=ep"));
        assert_matches!(
            Dispatcher::from_resolver(&resolver).err(),
            Some(ConfigError::MissingCredential(_))
        );
    }

    // -----------------------------------------------------------------------
    // Bulk dispatch
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn dispatch_all_keeps_input_order() {
        let pod = Arc::new(FakePod::healthy_completing());
        let sls = Arc::new(FakeServerless::completing());
        let d = dispatcher(config_from(source()), &pod, &sls);

        let jobs = vec![
            ("wizard".to_string(), payload()),
            ("poster".to_string(), payload()),
            ("fast".to_string(), payload()),
        ];
        let records = d.dispatch_all(jobs, &DispatchOptions::default(), 2).await.unwrap();

        let statuses: Vec<_> = records.iter().map(JobStatusRecord::status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Completed]
        );
        assert!(records.iter().all(JobStatusRecord::is_terminal));
    }
}
