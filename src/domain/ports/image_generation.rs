use async_trait::async_trait;

/// Raw image bytes returned by the generation service.
#[derive(Debug, Clone)]
pub struct GeneratedImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub source_url: String,
    pub style: String,
    pub prompt: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedImageData>;
}

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Store the image and return its public URL.
    async fn upload(&self, image: &GeneratedImageData, folder: &str, public_id: &str)
        -> anyhow::Result<String>;
}
