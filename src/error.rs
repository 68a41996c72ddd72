//! Error types shared by perception, decision and input.
//!
//! There is no unknown-action variant: the dispatcher reports unknown
//! action names as `false`. Inference failures exist as a variant but never
//! leave the decision engine, which converts them into a safe default.

/// Errors surfaced by the gameplay agent.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// Screen or region capture failed. Not retried.
    #[error("capture error: {0}")]
    Capture(String),

    /// Unknown ability slot, unknown attack chain, or malformed argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network, auth or reply-decoding failure from the inference endpoint.
    #[error("inference failure: {0}")]
    Inference(String),

    /// Missing or malformed configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// The input device rejected a key event.
    #[error("input device error: {0}")]
    Input(String),

    /// Image encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;
