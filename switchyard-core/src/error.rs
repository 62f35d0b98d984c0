//! Error types shared across the workspace

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(String),

    /// Every known node is unreachable. Distinct from a transient store
    /// failure, which callers handle by failing over to another node.
    #[error("No reachable store node")]
    NoReachableNode,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Deserialization error: {context}")]
    Deserialization { context: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conversation has ended")]
    ConversationEnded,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
