use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::entities::{format_timestamp, parse_timestamp, Job, JobStatus, NewJob};
use crate::domain::errors::QueueResult;
use crate::domain::ports::job_repository::JobRepository;
use crate::infrastructure::persistence::Database;

const JOB_COLUMNS: &str = "id, job_type, payload, status, attempts, max_attempts, error, \
     run_at, created_at, updated_at, started_at, completed_at";

/// SQLite implementation of the JobRepository
#[derive(Clone)]
pub struct SqliteJobRepository {
    db: Database,
}

impl SqliteJobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

// The Any driver reports a NULL cell as an incompatible type, so nullable
// columns are read as "absent on any decode failure".
fn optional_text(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column).ok().flatten()
}

fn parse_optional_timestamp(value: Option<String>) -> QueueResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn row_to_job(row: &AnyRow) -> QueueResult<Job> {
    let status: String = row.try_get("status")?;
    let payload: String = row.try_get("payload")?;
    let attempts: i64 = row.try_get("attempts")?;
    let max_attempts: i64 = row.try_get("max_attempts")?;
    let run_at: String = row.try_get("run_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        payload: serde_json::from_str::<Value>(&payload)?,
        status: status.parse()?,
        attempts: attempts as i32,
        max_attempts: max_attempts as i32,
        error: optional_text(row, "error"),
        run_at: parse_timestamp(&run_at)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        started_at: parse_optional_timestamp(optional_text(row, "started_at"))?,
        completed_at: parse_optional_timestamp(optional_text(row, "completed_at"))?,
    })
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, new_job: NewJob) -> QueueResult<Job> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let now_str = format_timestamp(now);
        let payload_str = serde_json::to_string(&new_job.payload)?;

        sqlx::query(
            "INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts,
                               run_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new_job.job_type)
        .bind(&payload_str)
        .bind(JobStatus::Pending.as_str())
        .bind(new_job.max_attempts)
        .bind(&now_str)
        .bind(&now_str)
        .bind(&now_str)
        .execute(self.db.pool())
        .await?;

        Ok(Job {
            id,
            job_type: new_job.job_type,
            payload: new_job.payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: new_job.max_attempts,
            error: None,
            run_at: now,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        })
    }

    async fn find_claimable(&self, batch_size: u32, now: DateTime<Utc>) -> QueueResult<Vec<Job>> {
        // rowid breaks ties between jobs created within the same microsecond
        let query = format!(
            "SELECT {} FROM jobs
             WHERE status IN ('pending', 'retrying') AND run_at <= ?
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?",
            JOB_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(format_timestamp(now))
            .bind(batch_size as i64)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn mark_processing(&self, id: &str, now: DateTime<Utc>) -> QueueResult<Option<Job>> {
        // Single conditional update: if another worker claimed this job first,
        // the WHERE clause no longer matches and nothing is returned.
        let now_str = format_timestamp(now);
        let query = format!(
            "UPDATE jobs
             SET status = 'processing', attempts = attempts + 1,
                 started_at = ?, updated_at = ?
             WHERE id = ? AND status IN ('pending', 'retrying') AND attempts < max_attempts
             RETURNING {}",
            JOB_COLUMNS
        );

        // Drain the statement so the write is finished before the claim is
        // reported; a half-read RETURNING cursor keeps it open.
        let rows = sqlx::query(&query)
            .bind(&now_str)
            .bind(&now_str)
            .bind(id)
            .fetch_all(self.db.pool())
            .await?;

        rows.first().map(row_to_job).transpose()
    }

    async fn mark_completed(
        &self,
        id: &str,
        attempts: i32,
        now: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let now_str = format_timestamp(now);
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'completed', completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing' AND attempts = ?",
        )
        .bind(&now_str)
        .bind(&now_str)
        .bind(id)
        .bind(attempts)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_retrying(
        &self,
        id: &str,
        attempts: i32,
        error: &str,
        run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'retrying', error = ?, run_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing' AND attempts = ?
               AND attempts < max_attempts",
        )
        .bind(error)
        .bind(format_timestamp(run_at))
        .bind(format_timestamp(now))
        .bind(id)
        .bind(attempts)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        id: &str,
        attempts: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'failed', error = ?, updated_at = ?
             WHERE id = ? AND attempts = ?
               AND status IN ('pending', 'retrying', 'processing')",
        )
        .bind(error)
        .bind(format_timestamp(now))
        .bind(id)
        .bind(attempts)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_id(&self, id: &str) -> QueueResult<Option<Job>> {
        let query = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn delete_completed_older_than(&self, cutoff: DateTime<Utc>) -> QueueResult<u64> {
        let result = sqlx::query(
            "DELETE FROM jobs
             WHERE status = 'completed' AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(format_timestamp(cutoff))
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_stale_processing(
        &self,
        started_before: DateTime<Utc>,
        limit: u32,
    ) -> QueueResult<Vec<Job>> {
        let query = format!(
            "SELECT {} FROM jobs
             WHERE status = 'processing' AND started_at < ?
             ORDER BY started_at ASC
             LIMIT ?",
            JOB_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(format_timestamp(started_before))
            .bind(limit as i64)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(row_to_job).collect()
    }

    async fn reclaim_stale(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let now_str = format_timestamp(now);
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'retrying', error = ?, run_at = ?, updated_at = ?
             WHERE id = ? AND status = 'processing' AND started_at = ?
               AND attempts < max_attempts",
        )
        .bind(error)
        .bind(&now_str)
        .bind(&now_str)
        .bind(id)
        .bind(format_timestamp(started_at))
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_stale(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'failed', error = ?, updated_at = ?
             WHERE id = ? AND status = 'processing' AND started_at = ?",
        )
        .bind(error)
        .bind(format_timestamp(now))
        .bind(id)
        .bind(format_timestamp(started_at))
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_status(&self) -> QueueResult<Vec<(JobStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM jobs GROUP BY status")
            .fetch_all(self.db.pool())
            .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            counts.push((status.parse()?, total));
        }

        Ok(counts)
    }
}
