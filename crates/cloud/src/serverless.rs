//! HTTP client for the serverless (queue-backed) worker pool.
//!
//! Every endpoint lives at `{base_url}/{endpoint_id}` and exposes:
//!
//! | Call                  | Path                 | Timeout              |
//! |-----------------------|----------------------|----------------------|
//! | synchronous run       | `POST /runsync`      | elastic sync timeout |
//! | asynchronous submit   | `POST /run`          | [`REQUEST_TIMEOUT`]  |
//! | status                | `GET /status/{id}`   | [`REQUEST_TIMEOUT`]  |
//! | cancel                | `POST /cancel/{id}`  | [`REQUEST_TIMEOUT`]  |
//!
//! Requests carry the payload as `{"input": <payload>}` and the credential
//! as a bearer token. Responses share the envelope
//! `{"id", "status", "output"?, "error"?, "delayTime"?, "executionTime"?}`.

use std::time::Duration;

use async_trait::async_trait;
use gendispatch_core::config::{ApiKey, Configuration};
use gendispatch_core::error::NormalizationError;
use gendispatch_core::job::{
    Backend, CancelReason, JobFailure, JobHandle, JobOutput, JobState, JobStatusRecord,
};
use gendispatch_core::normalize;
use serde_json::{json, Value};

use crate::backend::ServerlessBackend;
use crate::error::{self, ClientError};

/// Timeout for submit, status, and cancel calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope fields copied into the metadata of a completed record.
const METADATA_KEYS: [&str; 3] = ["delayTime", "executionTime", "workerId"];

/// HTTP client for serverless endpoints.
pub struct ServerlessClient {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
    sync_timeout: Duration,
}

impl ServerlessClient {
    /// Create a client using the credential, API root, and sync timeout
    /// from `config`.
    pub fn new(config: &Configuration) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &Configuration) -> Self {
        Self {
            client,
            base_url: config.elastic_base_url.clone(),
            api_key: config.elastic_api_key.clone(),
            sync_timeout: config.elastic_sync_timeout,
        }
    }

    fn url(&self, endpoint_id: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, endpoint_id, path)
    }

    async fn post_input(
        &self,
        endpoint_id: &str,
        path: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let response = self
            .client
            .post(self.url(endpoint_id, path))
            .bearer_auth(self.api_key.expose())
            .timeout(timeout)
            .json(&json!({ "input": payload }))
            .send()
            .await?;
        error::read_json(response).await
    }
}

#[async_trait]
impl ServerlessBackend for ServerlessClient {
    async fn submit_sync(&self, endpoint_id: &str, payload: &Value) -> JobStatusRecord {
        let result = self
            .post_input(endpoint_id, "runsync", payload, self.sync_timeout)
            .await
            .and_then(|body| record_from_envelope(&body));

        match result {
            Ok(record) => {
                tracing::info!(
                    endpoint_id,
                    job_id = %record.id,
                    status = %record.status(),
                    "Synchronous run returned",
                );
                record
            }
            Err(e) => {
                tracing::warn!(endpoint_id, error = %e, "Synchronous run failed");
                JobStatusRecord::failed(local_id(), Backend::Serverless, e.into_failure())
            }
        }
    }

    async fn submit_async(
        &self,
        endpoint_id: &str,
        payload: &Value,
    ) -> Result<JobHandle, ClientError> {
        let body = self
            .post_input(endpoint_id, "run", payload, REQUEST_TIMEOUT)
            .await?;
        let handle = JobHandle::new(job_id(&body)?);
        tracing::info!(endpoint_id, job_id = %handle, "Job submitted");
        Ok(handle)
    }

    async fn poll_status(
        &self,
        endpoint_id: &str,
        handle: &JobHandle,
    ) -> Result<JobStatusRecord, ClientError> {
        let response = self
            .client
            .get(self.url(endpoint_id, &format!("status/{handle}")))
            .bearer_auth(self.api_key.expose())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let body = error::read_json(response).await?;
        record_from_envelope(&body)
    }

    async fn cancel(&self, endpoint_id: &str, handle: &JobHandle) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(endpoint_id, &format!("cancel/{handle}")))
            .bearer_auth(self.api_key.expose())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        error::ensure_success(response).await?;
        Ok(())
    }
}

/// Normalize a job envelope into a record.
///
/// Fails only when the envelope has no job id; every other oddity becomes
/// a FAILED record so the caller can stop polling.
pub fn record_from_envelope(body: &Value) -> Result<JobStatusRecord, ClientError> {
    let id = job_id(body)?;
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();

    let state = match status {
        "IN_QUEUE" => JobState::InQueue,
        "IN_PROGRESS" => JobState::InProgress,
        "COMPLETED" => completed_state(body),
        "FAILED" => JobState::Failed(JobFailure::backend(
            normalize::error_message(body).unwrap_or_else(|| "job failed".to_string()),
        )),
        "CANCELLED" => JobState::Cancelled {
            reason: CancelReason::Requested,
        },
        "TIMED_OUT" => JobState::Cancelled {
            reason: CancelReason::Timeout,
        },
        other => JobState::Failed(
            NormalizationError(format!("unknown job status {other:?}")).into(),
        ),
    };

    Ok(JobStatusRecord::new(id, Backend::Serverless, state))
}

fn completed_state(body: &Value) -> JobState {
    let output = body.get("output").unwrap_or(&Value::Null);
    let extracted = normalize::extract_images(output).and_then(|(_, images)| {
        JobOutput::new(images, normalize::pick_metadata(body, &METADATA_KEYS))
    });

    match extracted {
        Ok(output) => JobState::Completed(output),
        // Workers report some failures as a completed job with an error output.
        Err(e) => match normalize::error_message(output) {
            Some(message) => JobState::Failed(JobFailure::backend(message)),
            None => JobState::Failed(e.into()),
        },
    }
}

fn job_id(body: &Value) -> Result<String, ClientError> {
    body.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| NormalizationError("response has no job id".into()).into())
}

/// Id for records produced before the provider assigned one.
fn local_id() -> String {
    format!("serverless-{}", uuid::Uuid::new_v4())
}
