pub mod handler_registry;
pub mod queue_manager;
pub mod retry_policy;

pub use handler_registry::HandlerRegistry;
pub use queue_manager::QueueManager;
pub use retry_policy::RetryPolicy;
