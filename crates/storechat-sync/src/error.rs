use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
