use crate::domain::entities::{Job, JobStatus, NewJob};
use crate::domain::errors::QueueResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable storage for queued jobs.
///
/// Every `mark_*` method is a conditional update: it only applies when the job
/// is currently in a state the transition is allowed from, and reports whether
/// a row was changed. Callers treat `false` as "someone else owns this job".
/// The claim (`mark_processing`) returns the claimed row instead.
///
/// Transitions after a claim carry the `attempts` value the claim produced.
/// Each claim bumps the counter, so it identifies one execution: a late
/// report from an execution that was reclaimed and claimed again no longer
/// matches and is ignored.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: NewJob) -> QueueResult<Job>;

    /// Pending or retrying jobs whose `run_at` has passed, oldest first.
    async fn find_claimable(&self, batch_size: u32, now: DateTime<Utc>) -> QueueResult<Vec<Job>>;

    /// Atomically claim a job for execution and bump its attempt counter.
    ///
    /// Returns the job as it is after the claim, or `None` if it was no longer
    /// claimable (another executor got there first, or it is out of attempts).
    async fn mark_processing(&self, id: &str, now: DateTime<Utc>) -> QueueResult<Option<Job>>;

    async fn mark_completed(&self, id: &str, attempts: i32, now: DateTime<Utc>)
        -> QueueResult<bool>;

    async fn mark_retrying(
        &self,
        id: &str,
        attempts: i32,
        error: &str,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QueueResult<bool>;

    /// Fail a processing job, or a pending/retrying one that can never run.
    async fn mark_failed(
        &self,
        id: &str,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool>;

    async fn get_by_id(&self, id: &str) -> QueueResult<Option<Job>>;

    async fn delete_completed_older_than(&self, cutoff: DateTime<Utc>) -> QueueResult<u64>;

    async fn find_stale_processing(
        &self,
        started_before: DateTime<Utc>,
        limit: u32,
    ) -> QueueResult<Vec<Job>>;

    /// Move a processing job back to retrying, but only if it is still the same
    /// execution (`started_at` unchanged).
    async fn reclaim_stale(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool>;

    /// Same guard as `reclaim_stale`, for jobs with no attempts left.
    async fn fail_stale(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool>;

    async fn count_by_status(&self) -> QueueResult<Vec<(JobStatus, i64)>>;
}
