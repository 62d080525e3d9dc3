//! Backend client traits.
//!
//! The dispatcher only sees these traits; [`crate::PodClient`] and
//! [`crate::ServerlessClient`] are the HTTP implementations.

use async_trait::async_trait;
use gendispatch_core::job::{JobHandle, JobStatusRecord};
use serde_json::Value;

use crate::error::ClientError;

/// A single pre-warmed worker with a synchronous generate call.
#[async_trait]
pub trait PodBackend: Send + Sync {
    /// Cheap readiness probe. Never fails: any error reads as `false`.
    async fn health_check(&self, base_url: &str) -> bool;

    /// Run one generation to completion.
    ///
    /// Unreachable pods come back as a FAILED record with a transport
    /// failure rather than an error.
    async fn generate(&self, base_url: &str, payload: &Value) -> JobStatusRecord;
}

/// A queue-backed worker pool addressed by endpoint id.
#[async_trait]
pub trait ServerlessBackend: Send + Sync {
    /// Submit and wait up to the sync timeout.
    ///
    /// The record may be non-terminal when the job is still queued or
    /// running; its id is then the handle to poll.
    async fn submit_sync(&self, endpoint_id: &str, payload: &Value) -> JobStatusRecord;

    /// Submit without waiting.
    async fn submit_async(&self, endpoint_id: &str, payload: &Value)
        -> Result<JobHandle, ClientError>;

    /// Current state of a submitted job.
    async fn poll_status(
        &self,
        endpoint_id: &str,
        handle: &JobHandle,
    ) -> Result<JobStatusRecord, ClientError>;

    /// Ask the provider to stop a job. Best effort.
    async fn cancel(&self, endpoint_id: &str, handle: &JobHandle) -> Result<(), ClientError>;
}
