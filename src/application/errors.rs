//! Application layer errors

use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("WhatsApp not connected")]
    NotConnected,

    /// Send failure reported by the messaging service, surfaced verbatim.
    #[error("{0}")]
    Send(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(String),
}
