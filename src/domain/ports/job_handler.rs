use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::domain::entities::Job;

/// Performs the work for one job type.
///
/// Returning `Err` hands the retry decision back to the queue.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, payload: &Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> JobHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        (self)(payload.clone()).await
    }
}

/// Notified once a job has reached the terminal `failed` state.
#[async_trait]
pub trait JobFailureListener: Send + Sync {
    async fn on_job_failed(&self, job: &Job, error: &str) -> anyhow::Result<()>;
}
