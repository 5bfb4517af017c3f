pub mod error;
pub mod models;
pub mod services;

pub use error::ConversationError;
pub use models::*;
pub use services::cache::FieldCache;
pub use services::delivery::ChannelDeliveryClient;
pub use services::engine::ConversationEngine;
