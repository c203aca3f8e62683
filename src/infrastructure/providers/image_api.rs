//! HTTP clients for the image generation service and the image store.
//!
//! Both services authenticate with a bearer key and answer in JSON.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ports::image_generation::{
    GeneratedImageData, GenerationRequest, ImageGenerator, ImageUploader,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn build_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    source_url: &'a str,
    style: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    image_base64: Option<String>,
    image_url: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpImageGenerator {
    pub fn new(endpoint: String, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint,
            api_key,
        })
    }

    async fn download(&self, url: &str) -> anyhow::Result<GeneratedImageData> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?.to_vec();

        Ok(GeneratedImageData { bytes, mime_type })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<GeneratedImageData> {
        let body = GenerateBody {
            source_url: &request.source_url,
            style: &request.style,
            prompt: &request.prompt,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Generation API returned HTTP {}: {}", status, text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Generation API returned malformed JSON")?;

        if let Some(encoded) = parsed.image_base64.filter(|s| !s.is_empty()) {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .context("Generation API returned invalid base64 image data")?;
            return Ok(GeneratedImageData {
                bytes,
                mime_type: parsed.mime_type.unwrap_or_else(|| "image/png".to_string()),
            });
        }

        match parsed.image_url {
            Some(url) => self.download(&url).await,
            None => Err(anyhow!("Generation API response contained no image")),
        }
    }
}

pub struct HttpImageUploader {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpImageUploader {
    pub fn new(endpoint: String, api_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client()?,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl ImageUploader for HttpImageUploader {
    async fn upload(
        &self,
        image: &GeneratedImageData,
        folder: &str,
        public_id: &str,
    ) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .query(&[("folder", folder), ("public_id", public_id)])
            .header(reqwest::header::CONTENT_TYPE, image.mime_type.as_str())
            .body(image.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Upload API returned HTTP {}: {}", status, text));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .context("Upload API returned malformed JSON")?;

        Ok(parsed.url)
    }
}
