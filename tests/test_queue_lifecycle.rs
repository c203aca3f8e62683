mod helpers;

use async_trait::async_trait;
use helpers::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wedding_queue::domain::entities::Job;
use wedding_queue::domain::ports::job_handler::JobFailureListener;
use wedding_queue::{HandlerRegistry, JobStatus, QueueError, RetryPolicy};

#[tokio::test]
async fn test_enqueue_creates_pending_job() {
    let test_db = setup_test_db().await;
    let queue = queue_manager(&test_db.db(), HandlerRegistry::new());

    let payload = json!({"image_id": "img-1", "style": "classic"});
    let job_id = queue.enqueue("generate-image", payload.clone(), None).await.unwrap();

    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.job_type, "generate-image");
    assert_eq!(job.payload, payload);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 3);
    assert!(job.error.is_none());
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn test_enqueue_rejects_zero_max_attempts() {
    let test_db = setup_test_db().await;
    let queue = queue_manager(&test_db.db(), HandlerRegistry::new());

    let result = queue.enqueue("generate-image", Value::Null, Some(0)).await;
    assert!(matches!(result, Err(QueueError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_unknown_job_id_returns_none() {
    let test_db = setup_test_db().await;
    let queue = queue_manager(&test_db.db(), HandlerRegistry::new());

    assert!(queue.get_job_status("nonexistent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_successful_job_completes() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    let job_id = queue
        .enqueue("generate-image", json!({"image_id": "img-1"}), None)
        .await
        .unwrap();

    assert_eq!(queue.process_jobs(10).await.unwrap(), 1);

    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(handler.seen_payloads(), vec![json!({"image_id": "img-1"})]);
}

#[tokio::test]
async fn test_drain_cycle_is_fifo() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    for name in ["A", "B", "C"] {
        queue
            .enqueue("generate-image", json!({ "name": name }), None)
            .await
            .unwrap();
    }

    assert_eq!(queue.process_jobs(3).await.unwrap(), 3);
    assert_eq!(
        handler.seen_payloads(),
        vec![json!({"name": "A"}), json!({"name": "B"}), json!({"name": "C"})]
    );
}

#[tokio::test]
async fn test_batch_size_limits_cycle() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    for i in 0..5 {
        queue
            .enqueue("generate-image", json!({ "n": i }), None)
            .await
            .unwrap();
    }

    assert_eq!(queue.process_jobs(2).await.unwrap(), 2);
    assert_eq!(queue.process_jobs(2).await.unwrap(), 2);
    assert_eq!(queue.process_jobs(2).await.unwrap(), 1);
    assert_eq!(queue.process_jobs(2).await.unwrap(), 0);
    assert_eq!(handler.call_count(), 5);
}

#[tokio::test]
async fn test_retry_then_success() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::failing_first(2);
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    let job_id = queue
        .enqueue("generate-image", json!({"image_id": "img-1"}), Some(3))
        .await
        .unwrap();

    // First failure: retrying with the error recorded
    assert_eq!(queue.process_jobs(1).await.unwrap(), 1);
    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.attempts, 1);
    assert_eq!(
        job.error.as_deref(),
        Some("generation API unavailable (call 1)")
    );

    assert_eq!(queue.process_jobs(1).await.unwrap(), 1);
    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.attempts, 2);
    assert_eq!(
        job.error.as_deref(),
        Some("generation API unavailable (call 2)")
    );

    assert_eq!(queue.process_jobs(1).await.unwrap(), 1);
    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 3);
    assert_eq!(handler.call_count(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_permanently() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::always_failing();
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    let job_id = queue
        .enqueue("generate-image", json!({}), Some(2))
        .await
        .unwrap();

    queue.process_jobs(10).await.unwrap();
    queue.process_jobs(10).await.unwrap();

    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, job.max_attempts);
    assert_eq!(
        job.error.as_deref(),
        Some("generation API unavailable (call 2)")
    );

    // Nothing left to claim
    assert_eq!(queue.process_jobs(10).await.unwrap(), 0);
    assert_eq!(handler.call_count(), 2);
}

#[tokio::test]
async fn test_terminal_states_are_not_touched_again() {
    let test_db = setup_test_db().await;
    let ok_handler = RecordingHandler::new();
    let failing_handler = RecordingHandler::always_failing();
    let mut registry = HandlerRegistry::new();
    registry.register("ok", ok_handler.clone());
    registry.register("broken", failing_handler.clone());
    let queue = queue_manager(&test_db.db(), registry);

    let completed_id = queue.enqueue("ok", json!({}), None).await.unwrap();
    let failed_id = queue.enqueue("broken", json!({}), Some(1)).await.unwrap();

    queue.process_jobs(10).await.unwrap();
    let completed = queue.get_job_status(&completed_id).await.unwrap().unwrap();
    let failed = queue.get_job_status(&failed_id).await.unwrap().unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(failed.status, JobStatus::Failed);

    for _ in 0..3 {
        assert_eq!(queue.process_jobs(10).await.unwrap(), 0);
    }

    let completed_after = queue.get_job_status(&completed_id).await.unwrap().unwrap();
    let failed_after = queue.get_job_status(&failed_id).await.unwrap().unwrap();
    assert_eq!(completed_after.status, JobStatus::Completed);
    assert_eq!(completed_after.completed_at, completed.completed_at);
    assert_eq!(completed_after.attempts, 1);
    assert_eq!(failed_after.status, JobStatus::Failed);
    assert_eq!(failed_after.error, failed.error);
    assert_eq!(failed_after.attempts, 1);
    assert_eq!(ok_handler.call_count(), 1);
    assert_eq!(failing_handler.call_count(), 1);
}

#[tokio::test]
async fn test_unregistered_type_fails_without_retry() {
    let test_db = setup_test_db().await;
    let queue = queue_manager(&test_db.db(), HandlerRegistry::new());

    let job_id = queue
        .enqueue("resize-thumbnail", json!({}), Some(5))
        .await
        .unwrap();

    assert_eq!(queue.process_jobs(10).await.unwrap(), 1);

    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 0);
    assert_eq!(
        job.error.as_deref(),
        Some("No handler registered for job type: resize-thumbnail")
    );

    assert_eq!(queue.process_jobs(10).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failing_job_does_not_abort_batch() {
    let test_db = setup_test_db().await;
    let ok_handler = RecordingHandler::new();
    let mut registry = HandlerRegistry::new();
    registry.register("ok", ok_handler.clone());
    registry.register("broken", RecordingHandler::always_failing());
    let queue = queue_manager(&test_db.db(), registry);

    queue.enqueue("broken", json!({}), None).await.unwrap();
    queue.enqueue("unknown", json!({}), None).await.unwrap();
    let last = queue.enqueue("ok", json!({}), None).await.unwrap();

    assert_eq!(queue.process_jobs(10).await.unwrap(), 3);
    let job = queue.get_job_status(&last).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_panicking_handler_is_recorded_as_failure() {
    let test_db = setup_test_db().await;
    let mut registry = HandlerRegistry::new();
    registry.register("explode", |_payload: Value| async move {
        if true {
            panic!("decoder blew up");
        }
        anyhow::Ok(())
    });
    let queue = queue_manager(&test_db.db(), registry);

    let job_id = queue.enqueue("explode", json!({}), Some(1)).await.unwrap();
    assert_eq!(queue.process_jobs(10).await.unwrap(), 1);

    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.as_deref(),
        Some("Job handler panicked: decoder blew up")
    );
}

#[tokio::test]
async fn test_backoff_delays_next_attempt() {
    let test_db = setup_test_db().await;
    let handler = RecordingHandler::failing_first(1);
    let mut registry = HandlerRegistry::new();
    registry.register("generate-image", handler.clone());
    let queue = queue_manager(&test_db.db(), registry).with_retry_policy(
        RetryPolicy::exponential(Duration::from_secs(3600), Duration::from_secs(7200)),
    );

    let job_id = queue
        .enqueue("generate-image", json!({}), None)
        .await
        .unwrap();

    queue.process_jobs(10).await.unwrap();
    let job = queue.get_job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Retrying);
    assert!(job.run_at > job.started_at.unwrap() + chrono::Duration::minutes(59));

    // Not yet eligible
    assert_eq!(queue.process_jobs(10).await.unwrap(), 0);
    assert_eq!(handler.call_count(), 1);
}

#[derive(Default)]
struct CapturingListener {
    failed: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl JobFailureListener for CapturingListener {
    async fn on_job_failed(&self, job: &Job, error: &str) -> anyhow::Result<()> {
        self.failed
            .lock()
            .unwrap()
            .push((job.id.clone(), error.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_failure_listener_sees_terminal_failures_only() {
    let test_db = setup_test_db().await;
    let listener = Arc::new(CapturingListener::default());
    let mut registry = HandlerRegistry::new();
    registry.register("broken", RecordingHandler::always_failing());
    let queue = queue_manager(&test_db.db(), registry).with_failure_listener(listener.clone());

    let retried = queue.enqueue("broken", json!({}), Some(2)).await.unwrap();
    let unknown = queue.enqueue("unknown", json!({}), None).await.unwrap();

    queue.process_jobs(10).await.unwrap();
    {
        let failed = listener.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, unknown);
    }

    queue.process_jobs(10).await.unwrap();
    let failed = listener.failed.lock().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[1].0, retried);
    assert_eq!(failed[1].1, "generation API unavailable (call 2)");
}

#[tokio::test]
async fn test_queue_depth_reports_every_status() {
    let test_db = setup_test_db().await;
    let mut registry = HandlerRegistry::new();
    registry.register("ok", RecordingHandler::new());
    let queue = queue_manager(&test_db.db(), registry);

    queue.enqueue("ok", json!({}), None).await.unwrap();
    queue.process_jobs(10).await.unwrap();
    queue.enqueue("ok", json!({}), None).await.unwrap();

    let depth = queue.queue_depth().await.unwrap();
    assert_eq!(depth.len(), 5);
    assert!(depth.contains(&(JobStatus::Completed, 1)));
    assert!(depth.contains(&(JobStatus::Pending, 1)));
    assert!(depth.contains(&(JobStatus::Failed, 0)));
}
