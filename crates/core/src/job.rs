//! Normalized job model shared by both execution backends.
//!
//! A [`JobStatusRecord`] is produced by every layer (pod client,
//! serverless client, dispatcher). Transport, backend, and timeout
//! conditions are folded into its [`JobState`] instead of being raised.
//! The completed variant can only be built through [`JobOutput::new`],
//! which rejects an empty image list.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::NormalizationError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status as reported by the backends.
///
/// `InQueue` and `InProgress` are only observed mid-poll; the dispatcher
/// never hands them back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Wire name, e.g. `IN_QUEUE`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InQueue => "IN_QUEUE",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// `true` for statuses after which no further polling occurs.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which backend produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pre-warmed persistent worker.
    Pod,
    /// Autoscaled queue-backed worker pool.
    Serverless,
}

impl Backend {
    /// Lower-case backend tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Serverless => "serverless",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload / handle
// ---------------------------------------------------------------------------

/// A caller-built generation request, forwarded verbatim to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPayload {
    /// Opaque request body (workflow graph, prompt, LoRA stack, ...).
    pub body: Value,
    /// Caller-supplied id used only to correlate log lines.
    pub correlation_id: Option<String>,
}

impl JobPayload {
    /// Payload without a correlation id.
    pub fn new(body: Value) -> Self {
        Self {
            body,
            correlation_id: None,
        }
    }

    /// Attach a caller-supplied correlation id for logging.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Identifier the serverless backend assigns on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap a provider-assigned job id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The provider-assigned job id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// How the bytes of a [`GeneratedImage`] are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Inline base64-encoded image data.
    Base64,
    /// A URL (usually a pre-signed bucket URL) the image can be fetched from.
    Url,
}

impl ImageKind {
    /// Lower-case kind tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Url => "url",
        }
    }
}

/// One generated image blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    /// File name reported by the worker, if any.
    pub filename: Option<String>,
    pub kind: ImageKind,
    /// Base64 payload or URL, depending on `kind`.
    pub data: String,
}

impl GeneratedImage {
    /// Image carried inline as base64.
    pub fn base64(data: impl Into<String>) -> Self {
        Self {
            filename: None,
            kind: ImageKind::Base64,
            data: data.into(),
        }
    }

    /// Image stored remotely and referenced by URL.
    pub fn url(data: impl Into<String>) -> Self {
        Self {
            filename: None,
            kind: ImageKind::Url,
            data: data.into(),
        }
    }

    /// Attach the file name reported by the worker.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Output of a completed job: a non-empty ordered image list plus
/// arbitrary provider metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutput {
    images: Vec<GeneratedImage>,
    metadata: Map<String, Value>,
}

impl JobOutput {
    /// Build an output, rejecting an empty image list.
    pub fn new(
        images: Vec<GeneratedImage>,
        metadata: Map<String, Value>,
    ) -> Result<Self, NormalizationError> {
        if images.is_empty() {
            return Err(NormalizationError(
                "completed job returned no images".into(),
            ));
        }
        Ok(Self { images, metadata })
    }

    /// Images in the order the worker returned them.
    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    /// Provider metadata such as execution time.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Take the images, dropping the metadata.
    pub fn into_images(self) -> Vec<GeneratedImage> {
        self.images
    }
}

// ---------------------------------------------------------------------------
// Failure / cancellation
// ---------------------------------------------------------------------------

/// Classification of a FAILED record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A mode had no configured endpoint.
    Config,
    /// Connection refused, DNS failure, timeout, or an unreachable-upstream
    /// gateway response.
    Transport,
    /// The reachable service rejected the job or reported a failure.
    Backend,
    /// The response body matched no recognized shape.
    Normalization,
    /// A freshly issued job handle kept resolving to "not found".
    JobVanished,
}

impl FailureKind {
    /// Transport failures mean the job most likely never ran, so another
    /// backend may be tried.
    pub fn is_transport(self) -> bool {
        matches!(self, Self::Transport)
    }
}

/// Error description carried by a FAILED record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    /// Failure of an explicit kind.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// No endpoint configured for the requested mode.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Config, message)
    }

    /// The service could not be reached.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    /// The service rejected the job or reported a failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Backend, message)
    }

    /// A job handle that kept resolving to "not found".
    pub fn vanished() -> Self {
        Self::new(FailureKind::JobVanished, "job vanished")
    }
}

impl From<NormalizationError> for JobFailure {
    fn from(err: NormalizationError) -> Self {
        Self::new(FailureKind::Normalization, err.to_string())
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Why a job ended CANCELLED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The local poll budget ran out, or the provider timed the job out.
    Timeout,
    /// Someone cancelled the job explicitly.
    Requested,
}

impl CancelReason {
    /// Reason text reported to callers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Requested => "requested",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Status plus the output that status allows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "output", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    InQueue,
    InProgress,
    Completed(JobOutput),
    Failed(JobFailure),
    Cancelled { reason: CancelReason },
}

impl JobState {
    /// Status implied by this state.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::InQueue => JobStatus::InQueue,
            Self::InProgress => JobStatus::InProgress,
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
            Self::Cancelled { .. } => JobStatus::Cancelled,
        }
    }
}

/// The normalized result of one job, regardless of which backend ran it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusRecord {
    /// Backend job handle, or a locally synthesized id for pod calls.
    pub id: String,
    pub backend: Backend,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobStatusRecord {
    /// Record in an arbitrary state.
    pub fn new(id: impl Into<String>, backend: Backend, state: JobState) -> Self {
        Self {
            id: id.into(),
            backend,
            state,
        }
    }

    /// COMPLETED record.
    pub fn completed(id: impl Into<String>, backend: Backend, output: JobOutput) -> Self {
        Self::new(id, backend, JobState::Completed(output))
    }

    /// FAILED record.
    pub fn failed(id: impl Into<String>, backend: Backend, failure: JobFailure) -> Self {
        Self::new(id, backend, JobState::Failed(failure))
    }

    /// CANCELLED record.
    pub fn cancelled(id: impl Into<String>, backend: Backend, reason: CancelReason) -> Self {
        Self::new(id, backend, JobState::Cancelled { reason })
    }

    /// Status of the record.
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// True for COMPLETED, FAILED and CANCELLED.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Images of a COMPLETED record; `None` for every other status.
    pub fn images(&self) -> Option<&[GeneratedImage]> {
        match &self.state {
            JobState::Completed(output) => Some(output.images()),
            _ => None,
        }
    }

    /// Failure of a FAILED record; `None` otherwise.
    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Reason of a CANCELLED record; `None` otherwise.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match &self.state {
            JobState::Cancelled { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Human-readable error for FAILED and CANCELLED records.
    pub fn error_message(&self) -> Option<String> {
        match &self.state {
            JobState::Failed(failure) => Some(failure.message.clone()),
            JobState::Cancelled { reason } => Some(reason.to_string()),
            _ => None,
        }
    }
}
