use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt job record: {0}")]
    CorruptRecord(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type QueueResult<T> = Result<T, QueueError>;
