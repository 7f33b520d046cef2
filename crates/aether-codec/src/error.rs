use thiserror::Error;

use crate::MessageId;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer ends before field does")]
    Truncated,
    #[error("unknown message id {0}")]
    UnknownMessage(MessageId),
    #[error("length {0} exceeds the packed-size range")]
    LengthOverflow(usize),
    #[error("invalid value for field")]
    BadValue,
}

/// Error half of a request/response pair, as carried by a `SendError`
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub error_type: u8,
    pub error_code: u32,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "api error type {} code {}", self.error_type, self.error_code)
    }
}

impl std::error::Error for ApiError {}
