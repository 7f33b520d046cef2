use aether_codec::CodecError;
use thiserror::Error;

/// Stream-level failure taxonomy shared by every layer of the pipeline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("payload of {size} bytes exceeds the {max} byte element limit")]
    WriteTooLarge { size: usize, max: usize },
    #[error("stream has no downstream link")]
    NotLinked,
    #[error(transparent)]
    Parse(#[from] CodecError),
    #[error("decrypt failed, datagram dropped")]
    DecryptFailure,
    #[error("retransmission budget exhausted without acknowledgement")]
    MaxRepeatExceeded,
    #[error("connection lost")]
    ConnectionLost,
    #[error("peer reset the session")]
    SessionReset,
    #[error("operation canceled")]
    Canceled,
}
