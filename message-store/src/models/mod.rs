mod message;
mod message_stats;

pub use message::{Message, MessageStatus, MessageType};
pub use message_stats::MessageStats;
