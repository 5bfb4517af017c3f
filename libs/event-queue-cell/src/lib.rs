pub mod error;
pub mod models;
pub mod services;

pub use error::QueueError;
pub use models::*;
pub use services::queue::RedisQueueService;
pub use services::worker::WorkerPool;
