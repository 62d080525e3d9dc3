//! HTTP client for the persistent ("pod") worker.
//!
//! The pod is assumed warm. `GET {base}/ready` is the readiness probe and
//! `POST {base}/generate` runs a job synchronously: the response already
//! holds the final images or an error.

use std::time::Duration;

use async_trait::async_trait;
use gendispatch_core::config::{ApiKey, Configuration};
use gendispatch_core::job::{Backend, JobFailure, JobOutput, JobStatusRecord};
use gendispatch_core::normalize;
use serde_json::Value;

use crate::backend::PodBackend;
use crate::error::{self, ClientError};

/// Readiness probe path.
pub const READY_PATH: &str = "/ready";
/// Generation path.
pub const GENERATE_PATH: &str = "/generate";
/// Fixed timeout for the readiness probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a persistent worker.
pub struct PodClient {
    client: reqwest::Client,
    api_key: Option<ApiKey>,
    timeout: Duration,
}

impl PodClient {
    /// Create a client using the pod credential and timeout from `config`.
    pub fn new(config: &Configuration) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &Configuration) -> Self {
        Self {
            client,
            api_key: config.persistent_api_key.clone(),
            timeout: config.pod_timeout,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose()),
            None => builder,
        }
    }

    async fn post_generate(&self, base_url: &str, payload: &Value) -> Result<Value, ClientError> {
        let response = self
            .request(self.client.post(format!("{base_url}{GENERATE_PATH}")))
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;
        error::read_json(response).await
    }
}

#[async_trait]
impl PodBackend for PodClient {
    async fn health_check(&self, base_url: &str) -> bool {
        let result = self
            .request(self.client.get(format!("{base_url}{READY_PATH}")))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(base_url, status = response.status().as_u16(), "Pod not ready");
                false
            }
            Err(e) => {
                tracing::debug!(base_url, error = %e, "Pod readiness probe failed");
                false
            }
        }
    }

    async fn generate(&self, base_url: &str, payload: &Value) -> JobStatusRecord {
        let id = format!("pod-{}", uuid::Uuid::new_v4());
        let started = std::time::Instant::now();

        let record = match self.post_generate(base_url, payload).await {
            Ok(body) => record_from_body(&id, &body),
            Err(e) => JobStatusRecord::failed(&id, Backend::Pod, e.into_failure()),
        };

        tracing::info!(
            job_id = %id,
            status = %record.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pod generation finished",
        );
        record
    }
}

/// Normalize a pod response body into a terminal record.
///
/// Images win over an `error` field; a body with neither is an
/// unrecognized shape.
pub fn record_from_body(id: &str, body: &Value) -> JobStatusRecord {
    let extracted = normalize::extract_images(body)
        .and_then(|(_, images)| JobOutput::new(images, normalize::residual_metadata(body)));

    match extracted {
        Ok(output) => JobStatusRecord::completed(id, Backend::Pod, output),
        Err(e) => {
            let failure = match normalize::error_message(body) {
                Some(message) => JobFailure::backend(message),
                None => e.into(),
            };
            JobStatusRecord::failed(id, Backend::Pod, failure)
        }
    }
}
