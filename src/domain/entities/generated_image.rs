use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Processing,
    Completed,
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Processing => "processing",
            ImageStatus::Completed => "completed",
            ImageStatus::Failed => "failed",
        }
    }
}

impl From<String> for ImageStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => ImageStatus::Completed,
            "failed" => ImageStatus::Failed,
            _ => ImageStatus::Processing,
        }
    }
}

/// The user-facing record a generate-image job fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub user_id: String,
    pub original_url: String,
    pub generated_url: Option<String>,
    pub prompt: String,
    pub style: String,
    pub status: ImageStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl GeneratedImage {
    pub fn new(user_id: String, original_url: String, prompt: String, style: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            original_url,
            generated_url: None,
            prompt,
            style,
            status: ImageStatus::Processing,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
