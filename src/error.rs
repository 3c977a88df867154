//! Error type shared by the client, the query builder and the transfer loop / 错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriveError {
    /// Network-level failure (connect, timeout, broken body) / 网络错误
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),

    /// Request could not be built (bad URL, header) / 请求构造失败
    #[error("Invalid request: {0}")]
    Request(reqwest::Error),

    /// Local I/O failure while reading or writing file content / 本地IO错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Drive answered with a non-success HTTP status / 服务端错误
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DriveError>;

impl DriveError {
    /// Whether a resumable transfer may retry after this error.
    /// Transport and I/O errors always are; server errors only from 500 up.
    pub fn is_retryable(&self) -> bool {
        match self {
            DriveError::Transport(_) | DriveError::Io(_) => true,
            DriveError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by a server error
    pub fn status(&self) -> Option<u16> {
        match self {
            DriveError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::FileNotFound(_)) || self.status() == Some(404)
    }
}

impl From<reqwest::Error> for DriveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            DriveError::Request(err)
        } else if err.is_decode() {
            DriveError::InvalidResponse(err.to_string())
        } else {
            DriveError::Transport(err)
        }
    }
}

impl From<serde_json::Error> for DriveError {
    fn from(err: serde_json::Error) -> Self {
        DriveError::InvalidResponse(err.to_string())
    }
}
