use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wedding_queue::domain::entities::format_timestamp;
use wedding_queue::domain::ports::job_repository::JobRepository;
use wedding_queue::domain::ports::time_service::TimeService;
use wedding_queue::infrastructure::persistence::{Database, SqliteJobRepository};
use wedding_queue::infrastructure::runtime::TokioTimeService;
use wedding_queue::{HandlerRegistry, QueueManager};

pub fn job_repo(db: &Database) -> Arc<dyn JobRepository> {
    Arc::new(SqliteJobRepository::new(db.clone()))
}

pub fn time_service() -> Arc<dyn TimeService> {
    Arc::new(TokioTimeService::new())
}

pub fn queue_manager(db: &Database, registry: HandlerRegistry) -> QueueManager {
    QueueManager::new(job_repo(db), Arc::new(registry), time_service())
}

/// Handler that records every payload it sees and fails its first `failures` calls.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub calls: Arc<AtomicUsize>,
    pub payloads: Arc<Mutex<Vec<Value>>>,
    failures: usize,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl wedding_queue::domain::ports::job_handler::JobHandler for RecordingHandler {
    async fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());

        if call < self.failures {
            anyhow::bail!("generation API unavailable (call {})", call + 1);
        }
        Ok(())
    }
}

pub async fn set_completed_at(db: &Database, job_id: &str, completed_at: DateTime<Utc>) {
    sqlx::query("UPDATE jobs SET completed_at = ? WHERE id = ?")
        .bind(format_timestamp(completed_at))
        .bind(job_id)
        .execute(db.pool())
        .await
        .unwrap();
}

pub async fn set_status(db: &Database, job_id: &str, status: &str) {
    sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
        .bind(status)
        .bind(job_id)
        .execute(db.pool())
        .await
        .unwrap();
}
