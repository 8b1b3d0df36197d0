//! Error types
use std::{fmt, io, result};

use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection timeout")]
    Timeout,
    #[error("Socket error: {0}")]
    IO(io::Error),
    #[error("JSON decode error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Truncated response: {0} bytes received")]
    Truncated(usize),
    #[error("Could not parse {0} from response")]
    MissingField(&'static str),
    #[error("Response data error: {0}")]
    TPLink(SectionError),
    #[error("Discovery failed: {0}")]
    Discovery(io::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`], reported alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Connection,
    Decode,
    MissingField,
    Device,
    Discovery,
    NotFound,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Timeout => ErrorKind::Timeout,
            Error::IO(_) => ErrorKind::Connection,
            Error::Serde(_) | Error::Truncated(_) => ErrorKind::Decode,
            Error::MissingField(_) => ErrorKind::MissingField,
            Error::TPLink(_) => ErrorKind::Device,
            Error::Discovery(_) => ErrorKind::Discovery,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// The error as the JSON mapping callers print: `{"error": .., "kind": ..}`.
    pub fn to_response(&self) -> Value {
        json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::IO(error),
        }
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<SectionError> for Error {
    fn from(error: SectionError) -> Self {
        Error::TPLink(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Error body a device returns in place of a section it does not support.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SectionError {
    pub err_code: i16,
    pub err_msg: String,
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}) {}", self.err_code, self.err_msg)
    }
}

impl std::error::Error for SectionError {}
