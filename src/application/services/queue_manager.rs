use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::application::services::handler_registry::HandlerRegistry;
use crate::application::services::retry_policy::RetryPolicy;
use crate::domain::entities::{Job, JobStatus, NewJob, DEFAULT_MAX_ATTEMPTS};
use crate::domain::errors::{QueueError, QueueResult};
use crate::domain::ports::job_handler::JobFailureListener;
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::ports::time_service::TimeService;

pub const DEFAULT_BATCH_SIZE: u32 = 10;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const STALE_JOB_ERROR: &str = "Job timed out while processing";

const STALE_RECLAIM_LIMIT: u32 = 100;

/// Drives jobs through their lifecycle.
///
/// Holds no job state of its own: every transition is a conditional write to
/// the repository, so several managers (or overlapping drain cycles) can share
/// one store. Jobs within a batch run one at a time, in fetch order.
pub struct QueueManager {
    repo: Arc<dyn JobRepository>,
    registry: Arc<HandlerRegistry>,
    time_service: Arc<dyn TimeService>,
    retry_policy: RetryPolicy,
    failure_listeners: Vec<Arc<dyn JobFailureListener>>,
}

impl QueueManager {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        registry: Arc<HandlerRegistry>,
        time_service: Arc<dyn TimeService>,
    ) -> Self {
        Self {
            repo,
            registry,
            time_service,
            retry_policy: RetryPolicy::default(),
            failure_listeners: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_failure_listener(mut self, listener: Arc<dyn JobFailureListener>) -> Self {
        self.failure_listeners.push(listener);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Queue a job and return its id. `max_attempts` defaults to 3.
    ///
    /// The payload is stored as given; checking its shape is the producer's job.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        max_attempts: Option<i32>,
    ) -> QueueResult<String> {
        let max_attempts = max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts < 1 {
            return Err(QueueError::InvalidArgument(format!(
                "max_attempts must be at least 1, got {}",
                max_attempts
            )));
        }

        let job = self
            .repo
            .create(NewJob::new(job_type, payload).with_max_attempts(max_attempts))
            .await?;

        metrics::counter!("queue_jobs_enqueued_total", "job_type" => job.job_type.clone())
            .increment(1);
        debug!("Enqueued job {} (type: {})", job.id, job.job_type);

        Ok(job.id)
    }

    /// One drain cycle: claim and run up to `batch_size` jobs, oldest first.
    ///
    /// Returns how many jobs this cycle acted on, whatever their outcome. Jobs
    /// that another executor claimed between the fetch and the claim are
    /// skipped and not counted. Handler failures are recorded on the job and
    /// never returned; only storage errors are.
    #[tracing::instrument(skip(self))]
    pub async fn process_jobs(&self, batch_size: u32) -> QueueResult<usize> {
        let jobs = self
            .repo
            .find_claimable(batch_size, self.time_service.now())
            .await?;

        let mut processed = 0;
        for job in jobs {
            if self.process_job(job).await? {
                processed += 1;
            }
        }

        if processed > 0 {
            info!("Drain cycle processed {} job(s)", processed);
        }

        Ok(processed)
    }

    async fn process_job(&self, job: Job) -> QueueResult<bool> {
        debug_assert!(job.status.is_claimable(), "fetched job {} is {}", job.id, job.status);

        let handler = match self.registry.resolve(&job.job_type) {
            Some(handler) => handler,
            None => {
                // Fails without a claim; attempts stay untouched
                let message = format!("No handler registered for job type: {}", job.job_type);
                error!(job_id = %job.id, "{}", message);
                debug_assert!(job.status.can_transition_to(JobStatus::Failed));
                let failed = self
                    .repo
                    .mark_failed(&job.id, job.attempts, &message, self.time_service.now())
                    .await?;
                if failed {
                    metrics::counter!("queue_jobs_failed_total", "job_type" => job.job_type.clone(), "reason" => "unregistered")
                        .increment(1);
                    self.notify_failed(&job, &message).await;
                }
                return Ok(failed);
            }
        };

        let job = match self
            .repo
            .mark_processing(&job.id, self.time_service.now())
            .await?
        {
            Some(claimed) => claimed,
            None => {
                debug!("Job {} was claimed by another executor, skipping", job.id);
                return Ok(false);
            }
        };

        info!(
            "Processing job {} (type: {}, attempt {}/{})",
            job.id, job.job_type, job.attempts, job.max_attempts
        );

        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.handle(&job.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "Job handler panicked: {}",
                    panic_message(panic.as_ref())
                ))
            });
        metrics::histogram!("queue_job_duration_seconds", "job_type" => job.job_type.clone())
            .record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                let now = self.time_service.now();
                debug_assert!(job.status.can_transition_to(JobStatus::Completed));
                if self.repo.mark_completed(&job.id, job.attempts, now).await? {
                    metrics::counter!("queue_jobs_completed_total", "job_type" => job.job_type.clone())
                        .increment(1);
                    info!("Job {} completed successfully", job.id);
                } else {
                    warn!("Job {} finished but was no longer processing", job.id);
                }
            }
            Err(err) => {
                let message = err.to_string();
                error!(job_id = %job.id, attempts = job.attempts, "Job {} failed: {:#}", job.id, err);
                self.record_failure(&job, &message).await?;
            }
        }

        Ok(true)
    }

    async fn record_failure(&self, job: &Job, message: &str) -> QueueResult<()> {
        debug_assert!(job.status.can_transition_to(JobStatus::Retrying));
        let now = self.time_service.now();

        if job.attempts_remaining() > 0 {
            let run_at = self.retry_policy.next_run_at(now, job.attempts);
            if self
                .repo
                .mark_retrying(&job.id, job.attempts, message, run_at, now)
                .await?
            {
                metrics::counter!("queue_jobs_retried_total", "job_type" => job.job_type.clone())
                    .increment(1);
                info!(
                    "Job {} will be retried ({} attempt(s) left, eligible at {})",
                    job.id,
                    job.attempts_remaining(),
                    run_at
                );
            }
        } else if self
            .repo
            .mark_failed(&job.id, job.attempts, message, now)
            .await?
        {
            metrics::counter!("queue_jobs_failed_total", "job_type" => job.job_type.clone(), "reason" => "exhausted")
                .increment(1);
            warn!(
                "Job {} failed permanently after {} attempt(s)",
                job.id, job.attempts
            );
            self.notify_failed(job, message).await;
        }

        Ok(())
    }

    async fn notify_failed(&self, job: &Job, message: &str) {
        for listener in &self.failure_listeners {
            if let Err(e) = listener.on_job_failed(job, message).await {
                error!("Failure listener errored for job {}: {:#}", job.id, e);
            }
        }
    }

    /// Current state of a job, or `None` for ids that do not exist (anymore).
    pub async fn get_job_status(&self, job_id: &str) -> QueueResult<Option<Job>> {
        self.repo.get_by_id(job_id).await
    }

    /// Delete completed jobs older than the retention window. Failed jobs are kept.
    pub async fn cleanup_completed_jobs(&self, retention_days: u32) -> QueueResult<u64> {
        let cutoff = chrono::Duration::try_days(retention_days as i64)
            .and_then(|window| self.time_service.now().checked_sub_signed(window))
            .ok_or_else(|| {
                QueueError::InvalidArgument(format!(
                    "retention of {} days is out of range",
                    retention_days
                ))
            })?;
        let deleted = self.repo.delete_completed_older_than(cutoff).await?;

        if deleted > 0 {
            metrics::counter!("queue_jobs_cleaned_total").increment(deleted);
            info!("Cleaned up {} completed job(s) older than {} days", deleted, retention_days);
        }

        Ok(deleted)
    }

    /// Recover jobs stuck in `processing` because their executor died.
    ///
    /// A job whose `started_at` is older than `timeout` goes back to `retrying`
    /// if it has attempts left, otherwise to `failed`. The write is guarded on
    /// `started_at`, so an executor that finishes in the meantime wins.
    pub async fn reclaim_stale_jobs(&self, timeout: Duration) -> QueueResult<usize> {
        let now = self.time_service.now();
        let started_before = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .ok_or_else(|| {
                QueueError::InvalidArgument(format!("stale timeout {:?} is out of range", timeout))
            })?;

        let stale = self
            .repo
            .find_stale_processing(started_before, STALE_RECLAIM_LIMIT)
            .await?;

        let mut reclaimed = 0;
        for job in stale {
            let Some(started_at) = job.started_at else {
                continue;
            };

            if job.attempts_remaining() > 0 {
                if self
                    .repo
                    .reclaim_stale(&job.id, started_at, STALE_JOB_ERROR, now)
                    .await?
                {
                    warn!("Reclaimed stale job {} (started at {})", job.id, started_at);
                    reclaimed += 1;
                }
            } else if self
                .repo
                .fail_stale(&job.id, started_at, STALE_JOB_ERROR, now)
                .await?
            {
                warn!(
                    "Stale job {} failed permanently after {} attempt(s)",
                    job.id, job.attempts
                );
                metrics::counter!("queue_jobs_failed_total", "job_type" => job.job_type.clone(), "reason" => "stale")
                    .increment(1);
                self.notify_failed(&job, STALE_JOB_ERROR).await;
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            metrics::counter!("queue_jobs_reclaimed_total").increment(reclaimed as u64);
        }

        Ok(reclaimed)
    }

    /// Job counts per status; statuses with no jobs are reported as zero.
    pub async fn queue_depth(&self) -> QueueResult<Vec<(JobStatus, i64)>> {
        let counts = self.repo.count_by_status().await?;

        let depth: Vec<(JobStatus, i64)> = JobStatus::ALL
            .iter()
            .map(|status| {
                let total = counts
                    .iter()
                    .find(|(s, _)| s == status)
                    .map(|(_, total)| *total)
                    .unwrap_or(0);
                (*status, total)
            })
            .collect();

        for (status, total) in &depth {
            metrics::gauge!("queue_jobs_depth", "status" => status.as_str()).set(*total as f64);
        }

        Ok(depth)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
