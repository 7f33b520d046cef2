mod error;
mod packable;
mod packed_size;
mod packer;
mod parser;
mod promise;
mod protocol_context;
mod request_id;
mod return_result;
mod unpacker;

pub use aether_codec_derive::Packable;
pub use error::{ApiError, CodecError};
pub use packable::Packable;
pub use packed_size::{packed_size_len, read_packed_size, write_packed_size};
pub use packer::Packer;
pub use parser::{ApiHandler, ApiParser, Handled};
pub use promise::{PromiseBehavior, PromisePtr};
pub use protocol_context::ProtocolContext;
pub use request_id::RequestId;
pub use return_result::{ReturnResultApi, SEND_ERROR, SEND_RESULT};
pub use unpacker::Unpacker;

/// Message code inside a packet.
pub type MessageId = u8;
