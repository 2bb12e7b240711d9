use crate::api::ApiError;

/// Shared error type used across all panel client crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Api(Box<ApiError>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("request body cannot be replayed for a retry")]
    BodyNotReplayable,

    #[error("websocket connection is closed")]
    ConnectionClosed,

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("config: {0}")]
    Config(String),

    #[error("url: {0}")]
    Url(String),
}

impl Error {
    /// `true` for the cancellation condition, so callers can tell a
    /// deliberate stop apart from a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The structured API error, if this is one.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Error::Api(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
