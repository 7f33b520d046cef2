mod config;
mod receiver;
mod receiving_chunks;
mod ring_index;
mod safe_stream;
mod send_buffer;
mod sender;
mod sending_chunks;
mod types;
mod wire;

pub use config::SafeStreamConfig;
pub use receiver::ReceiverHalf;
pub use ring_index::SsRingIndex;
pub use safe_stream::SafeStream;
pub use send_buffer::{SendDataBuffer, SendingDataBehavior, SendingDataPtr};
pub use sender::{SenderHalf, SenderState};
pub use types::{DataChunk, DataMessage, OffsetRange, SafeStreamInit};
pub use wire::{
    CONFIRM, INIT, INIT_ACK, Outbox, REPEAT, REQUEST_REPEAT, SEND, SafeStreamApi,
    SafeStreamEvents, SafeStreamWire,
};
