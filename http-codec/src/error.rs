use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty message")]
    EmptyMessage,
    #[error("message head is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid start line: {0}")]
    InvalidStartLine(String),
    #[error("invalid status code: {0}")]
    InvalidStatus(String),
    #[error("invalid header line: {0}")]
    InvalidHeader(String),
}
