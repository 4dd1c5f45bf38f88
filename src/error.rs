use thiserror::Error;

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("pong timeout")]
    PongTimeout,

    #[error("stale connection: {0}ms since last message")]
    StaleConnection(u64),

    #[error("already started")]
    AlreadyStarted,

    #[error("not started")]
    NotStarted,

    #[error("invalid tick size: {0} (expected 0.01, 0.1 or 1)")]
    InvalidTickSize(String),

    #[error("unknown source: {0} (expected live or synthetic)")]
    InvalidSource(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for LadderError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        LadderError::WebSocket(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, LadderError>;
