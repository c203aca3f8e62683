use std::sync::Arc;

use crate::application::handlers::generate_image::{
    GenerateImageHandler, MarkImageFailedListener, GENERATE_IMAGE_JOB,
};
use crate::application::services::{HandlerRegistry, QueueManager};
use crate::config::Config;
use crate::domain::ports::generated_image_repository::GeneratedImageRepository;
use crate::domain::ports::image_generation::{ImageGenerator, ImageUploader};
use crate::domain::ports::job_repository::JobRepository;
use crate::domain::ports::time_service::TimeService;
use crate::infrastructure::persistence::{
    Database, SqliteGeneratedImageRepository, SqliteJobRepository,
};
use crate::infrastructure::providers::{HttpImageGenerator, HttpImageUploader};
use crate::infrastructure::runtime::TokioTimeService;
use crate::infrastructure::workers::QueueWorker;

/// Everything the worker binary needs, wired together.
pub struct QueueRuntime {
    pub queue: Arc<QueueManager>,
    pub worker: QueueWorker,
}

/// Register every job type this service knows how to run.
pub fn build_registry(
    generator: Arc<dyn ImageGenerator>,
    uploader: Arc<dyn ImageUploader>,
    images: Arc<dyn GeneratedImageRepository>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(
        GENERATE_IMAGE_JOB,
        GenerateImageHandler::new(generator, uploader, images),
    );
    registry
}

pub fn build_runtime(db: Database, config: &Config) -> anyhow::Result<QueueRuntime> {
    let (generation_url, generation_key) = config.generation_api()?;
    let (upload_url, upload_key) = config.upload_api()?;

    let generator: Arc<dyn ImageGenerator> =
        Arc::new(HttpImageGenerator::new(generation_url, generation_key)?);
    let uploader: Arc<dyn ImageUploader> =
        Arc::new(HttpImageUploader::new(upload_url, upload_key)?);
    let images: Arc<dyn GeneratedImageRepository> =
        Arc::new(SqliteGeneratedImageRepository::new(db.clone()));
    tracing::info!("Image providers initialized");

    let registry = Arc::new(build_registry(generator, uploader, images.clone()));

    let job_repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(db));
    let time_service: Arc<dyn TimeService> = Arc::new(TokioTimeService::new());

    let queue = Arc::new(
        QueueManager::new(job_repo, registry, time_service.clone())
            .with_retry_policy(config.retry_policy())
            .with_failure_listener(Arc::new(MarkImageFailedListener::new(images))),
    );
    tracing::info!("Queue manager initialized");

    let worker = QueueWorker::new(queue.clone(), time_service, config.worker_settings());

    Ok(QueueRuntime { queue, worker })
}
