use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use crate::domain::entities::{GeneratedImage, ImageStatus};
use crate::domain::errors::QueueResult;
use crate::domain::ports::generated_image_repository::GeneratedImageRepository;
use crate::infrastructure::persistence::Database;

#[derive(Clone)]
pub struct SqliteGeneratedImageRepository {
    db: Database,
}

impl SqliteGeneratedImageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GeneratedImageRepository for SqliteGeneratedImageRepository {
    async fn create(&self, image: &GeneratedImage) -> QueueResult<()> {
        sqlx::query(
            "INSERT INTO generated_images (id, user_id, original_url, prompt, style, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&image.id)
        .bind(&image.user_id)
        .bind(&image.original_url)
        .bind(&image.prompt)
        .bind(&image.style)
        .bind(image.status.as_str())
        .bind(&image.created_at)
        .bind(&image.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> QueueResult<Option<GeneratedImage>> {
        let row = sqlx::query(
            "SELECT id, user_id, original_url, generated_url, prompt, style, status, created_at, updated_at
             FROM generated_images WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status")?;
                Ok(Some(GeneratedImage {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    original_url: row.try_get("original_url")?,
                    generated_url: row
                        .try_get::<Option<String>, _>("generated_url")
                        .ok()
                        .flatten(),
                    prompt: row.try_get("prompt")?,
                    style: row.try_get("style")?,
                    status: ImageStatus::from(status),
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn mark_completed(&self, id: &str, generated_url: &str) -> QueueResult<bool> {
        let result = sqlx::query(
            "UPDATE generated_images
             SET generated_url = ?, status = 'completed', updated_at = ?
             WHERE id = ?",
        )
        .bind(generated_url)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: &str) -> QueueResult<bool> {
        // A record that already completed keeps its result
        let result = sqlx::query(
            "UPDATE generated_images
             SET status = 'failed', updated_at = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
