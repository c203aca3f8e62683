use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::entities::Job;
use crate::domain::ports::generated_image_repository::GeneratedImageRepository;
use crate::domain::ports::image_generation::{GenerationRequest, ImageGenerator, ImageUploader};
use crate::domain::ports::job_handler::{JobFailureListener, JobHandler};

pub const GENERATE_IMAGE_JOB: &str = "generate-image";
pub const GENERATED_FOLDER: &str = "wedding-ai/generated";

/// Payload of a `generate-image` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateImagePayload {
    pub image_id: String,
    pub original_url: String,
    pub style: String,
    pub prompt: String,
}

impl GenerateImagePayload {
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Generates the stylized photo, uploads it and fills in the display record.
pub struct GenerateImageHandler {
    generator: Arc<dyn ImageGenerator>,
    uploader: Arc<dyn ImageUploader>,
    images: Arc<dyn GeneratedImageRepository>,
}

impl GenerateImageHandler {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        uploader: Arc<dyn ImageUploader>,
        images: Arc<dyn GeneratedImageRepository>,
    ) -> Self {
        Self {
            generator,
            uploader,
            images,
        }
    }
}

#[async_trait]
impl JobHandler for GenerateImageHandler {
    async fn handle(&self, payload: &Value) -> anyhow::Result<()> {
        let payload: GenerateImagePayload = serde_json::from_value(payload.clone())
            .context("Invalid generate-image payload")?;

        let request = GenerationRequest {
            source_url: payload.original_url.clone(),
            style: payload.style.clone(),
            prompt: format!(
                "{}, wedding photography style: {}",
                payload.prompt, payload.style
            ),
        };

        let image = self
            .generator
            .generate(&request)
            .await
            .context("Image generation failed")?;

        if image.bytes.is_empty() {
            anyhow::bail!("Image generation returned no image data");
        }

        let public_id = format!("generated_{}", payload.image_id);
        let url = self
            .uploader
            .upload(&image, GENERATED_FOLDER, &public_id)
            .await
            .context("Uploading generated image failed")?;

        if !self.images.mark_completed(&payload.image_id, &url).await? {
            warn!(
                "Generated image {} has no display record to update",
                payload.image_id
            );
        }

        info!("Generated image {} stored at {}", payload.image_id, url);
        Ok(())
    }
}

/// Marks the display record failed once its job can no longer succeed.
pub struct MarkImageFailedListener {
    images: Arc<dyn GeneratedImageRepository>,
}

impl MarkImageFailedListener {
    pub fn new(images: Arc<dyn GeneratedImageRepository>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl JobFailureListener for MarkImageFailedListener {
    async fn on_job_failed(&self, job: &Job, error: &str) -> anyhow::Result<()> {
        if job.job_type != GENERATE_IMAGE_JOB {
            return Ok(());
        }

        let Some(image_id) = job.payload.get("image_id").and_then(Value::as_str) else {
            warn!("Failed job {} carries no image_id", job.id);
            return Ok(());
        };

        if self.images.mark_failed(image_id).await? {
            info!(
                "Marked generated image {} as failed (job {}: {})",
                image_id, job.id, error
            );
        }

        Ok(())
    }
}
