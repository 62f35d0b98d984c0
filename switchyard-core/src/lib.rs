pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod serializer;

pub use config::{Config, LoggingConfig, MessagingConfig};
pub use error::{Error, Result};
pub use models::id::{Handle, PartyId, Topic};
pub use models::message::{Message, MessageDraft, Seq};
pub use models::message_id::MessageId;
pub use serializer::{type_topic, JsonSerializer, PayloadSerializer};
