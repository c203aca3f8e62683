use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::application::services::queue_manager::{
    QueueManager, DEFAULT_BATCH_SIZE, DEFAULT_RETENTION_DAYS,
};
use crate::domain::ports::time_service::TimeService;

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub reclaim_interval: Duration,
    pub stale_timeout: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(5),
            reclaim_interval: Duration::from_secs(60),
            stale_timeout: Duration::from_secs(15 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

/// When the periodic maintenance tasks are next due.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceSchedule {
    next_reclaim_at: Option<DateTime<Utc>>,
    next_cleanup_at: Option<DateTime<Utc>>,
}

/// Periodic trigger for the queue manager.
///
/// Each tick runs one drain cycle and, when due, the stale-job reclaim and the
/// retention sweep. A full batch means more work is waiting, so the next tick
/// follows immediately; otherwise the worker sleeps for `poll_interval`.
pub struct QueueWorker {
    queue: Arc<QueueManager>,
    time_service: Arc<dyn TimeService>,
    settings: WorkerSettings,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<QueueManager>,
        time_service: Arc<dyn TimeService>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            time_service,
            settings,
        }
    }

    /// Run until `shutdown` resolves. Shutdown is only observed between ticks,
    /// so a job that has started always reaches a recorded outcome.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Starting QueueWorker (batch size {}, poll interval {:?}, handlers: {:?})",
            self.settings.batch_size,
            self.settings.poll_interval,
            self.queue.registry().registered_types()
        );

        tokio::pin!(shutdown);
        let mut schedule = MaintenanceSchedule::default();

        loop {
            let delay = self.tick(&mut schedule).await;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("QueueWorker shutting down");
                    break;
                }
                _ = self.time_service.sleep(delay) => {}
            }
        }
    }

    /// One iteration of the worker loop; returns how long to wait before the next.
    pub async fn tick(&self, schedule: &mut MaintenanceSchedule) -> Duration {
        let now = self.time_service.now();

        if schedule.next_reclaim_at.map_or(true, |at| at <= now) {
            match self
                .queue
                .reclaim_stale_jobs(self.settings.stale_timeout)
                .await
            {
                Ok(count) if count > 0 => info!("Reclaimed {} stale job(s)", count),
                Ok(_) => {}
                Err(e) => error!("Error reclaiming stale jobs: {}", e),
            }
            schedule.next_reclaim_at = Some(next_due(now, self.settings.reclaim_interval));
        }

        if schedule.next_cleanup_at.map_or(true, |at| at <= now) {
            if let Err(e) = self
                .queue
                .cleanup_completed_jobs(self.settings.retention_days)
                .await
            {
                error!("Error cleaning up completed jobs: {}", e);
            }
            match self.queue.queue_depth().await {
                Ok(depth) => debug!("Queue depth: {:?}", depth),
                Err(e) => error!("Error reading queue depth: {}", e),
            }
            schedule.next_cleanup_at = Some(next_due(now, self.settings.cleanup_interval));
        }

        match self.queue.process_jobs(self.settings.batch_size).await {
            Ok(processed) if processed > 0 && processed as u32 >= self.settings.batch_size => {
                Duration::ZERO
            }
            Ok(_) => self.settings.poll_interval,
            Err(e) => {
                error!("Error processing jobs: {}", e);
                ERROR_BACKOFF.max(self.settings.poll_interval)
            }
        }
    }
}

fn next_due(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|interval| now.checked_add_signed(interval))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
