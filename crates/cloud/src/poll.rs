//! Bounded polling of a submitted serverless job.
//!
//! Sleeps `interval`, polls, and repeats until the job reaches a terminal
//! status or the budget runs out (duration or attempt count, whichever
//! comes first). On exhaustion the remote job is cancelled so it does not
//! keep running, and a CANCELLED record with reason `timeout` is
//! returned whether or not the cancel call succeeded.
//!
//! A status call still in flight at the duration deadline is abandoned.
//! The cancel request that follows is bounded separately by
//! [`CANCEL_GRACE`], so the loop returns within
//! `max_duration + interval + CANCEL_GRACE` even against a stalled
//! provider.

use gendispatch_core::config::PollBudget;
use gendispatch_core::job::{Backend, CancelReason, JobFailure, JobHandle, JobStatusRecord};
use std::time::Duration;

use tokio::time::Instant;

use crate::backend::ServerlessBackend;
use crate::error::ClientError;

/// Consecutive "not found" answers tolerated for a fresh handle. The
/// provider may not have indexed the job yet.
pub const MAX_CONSECUTIVE_NOT_FOUND: u32 = 3;

/// Longest wait for a best-effort cancel request.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Poll `handle` until it is terminal or `budget` is exhausted.
pub async fn poll_until_terminal<B>(
    backend: &B,
    endpoint_id: &str,
    handle: &JobHandle,
    budget: PollBudget,
) -> JobStatusRecord
where
    B: ServerlessBackend + ?Sized,
{
    let started = Instant::now();
    let deadline = started + budget.max_duration;
    let mut attempts = 0u32;
    let mut not_found = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(budget.interval.min(remaining)).await;
        attempts += 1;

        let polled =
            tokio::time::timeout_at(deadline, backend.poll_status(endpoint_id, handle)).await;
        let Ok(polled) = polled else {
            tracing::warn!(
                endpoint_id,
                job_id = %handle,
                attempts,
                "Status call outlived poll budget",
            );
            return time_out(backend, endpoint_id, handle).await;
        };

        match polled {
            Ok(record) if record.is_terminal() => {
                tracing::info!(
                    endpoint_id,
                    job_id = %handle,
                    attempts,
                    status = %record.status(),
                    "Job reached terminal status",
                );
                return record;
            }
            Ok(record) => {
                not_found = 0;
                tracing::debug!(
                    job_id = %handle,
                    attempts,
                    status = %record.status(),
                    "Job still running",
                );
            }
            Err(ClientError::NotFound) => {
                not_found += 1;
                if not_found > MAX_CONSECUTIVE_NOT_FOUND {
                    tracing::error!(job_id = %handle, not_found, "Job vanished");
                    cancel_quietly(backend, endpoint_id, handle).await;
                    return JobStatusRecord::failed(
                        handle.as_str(),
                        Backend::Serverless,
                        JobFailure::vanished(),
                    );
                }
                tracing::debug!(job_id = %handle, not_found, "Job not indexed yet");
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(job_id = %handle, attempts, error = %e, "Transient poll failure");
            }
            Err(e) => {
                tracing::error!(job_id = %handle, error = %e, "Poll rejected");
                cancel_quietly(backend, endpoint_id, handle).await;
                return JobStatusRecord::failed(
                    handle.as_str(),
                    Backend::Serverless,
                    e.into_failure(),
                );
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= budget.max_duration || attempts >= budget.max_attempts {
            tracing::warn!(
                endpoint_id,
                job_id = %handle,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Poll budget exhausted, cancelling job",
            );
            return time_out(backend, endpoint_id, handle).await;
        }
    }
}

/// Cancel the job and report it as timed out.
async fn time_out<B>(backend: &B, endpoint_id: &str, handle: &JobHandle) -> JobStatusRecord
where
    B: ServerlessBackend + ?Sized,
{
    cancel_quietly(backend, endpoint_id, handle).await;
    JobStatusRecord::cancelled(handle.as_str(), Backend::Serverless, CancelReason::Timeout)
}

/// Request cancellation, waiting at most [`CANCEL_GRACE`]. A failure is
/// logged and never replaces the caller's outcome.
async fn cancel_quietly<B>(backend: &B, endpoint_id: &str, handle: &JobHandle)
where
    B: ServerlessBackend + ?Sized,
{
    match tokio::time::timeout(CANCEL_GRACE, backend.cancel(endpoint_id, handle)).await {
        Ok(Ok(())) => tracing::info!(endpoint_id, job_id = %handle, "Cancel requested"),
        Ok(Err(e)) => {
            tracing::warn!(endpoint_id, job_id = %handle, error = %e, "Cancel request failed")
        }
        Err(_) => tracing::warn!(endpoint_id, job_id = %handle, "Cancel request timed out"),
    }
}
