use thiserror::Error;
use weir_protocol::ErrorCode;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Frame(#[from] weir_protocol::FrameError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("{code}: {message}")]
    Rpc { code: ErrorCode, message: String },
}

impl Error {
    pub fn rpc(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Rpc { code, .. } => code.is_retryable(),
            Error::Connection(_) | Error::Frame(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
