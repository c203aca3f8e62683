use crate::domain::entities::GeneratedImage;
use crate::domain::errors::QueueResult;
use async_trait::async_trait;

#[async_trait]
pub trait GeneratedImageRepository: Send + Sync {
    async fn create(&self, image: &GeneratedImage) -> QueueResult<()>;

    async fn get_by_id(&self, id: &str) -> QueueResult<Option<GeneratedImage>>;

    async fn mark_completed(&self, id: &str, generated_url: &str) -> QueueResult<bool>;

    async fn mark_failed(&self, id: &str) -> QueueResult<bool>;
}
