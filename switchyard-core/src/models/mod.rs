pub mod id;
pub mod message;
pub mod message_id;
