pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::services::{HandlerRegistry, QueueManager, RetryPolicy};
pub use config::*;
pub use domain::entities::{Job, JobStatus};
pub use domain::errors::{QueueError, QueueResult};
