use aether_codec::{
    ApiHandler, ApiParser, CodecError, Handled, MessageId, Packable, Packer, RequestId,
};

use crate::{
    ring_index::SsRingIndex,
    types::{DataMessage, SafeStreamInit},
};

pub const INIT: MessageId = 3;
pub const INIT_ACK: MessageId = 4;
pub const CONFIRM: MessageId = 6;
pub const REQUEST_REPEAT: MessageId = 7;
pub const SEND: MessageId = 8;
pub const REPEAT: MessageId = 9;

/// Encoders for the six Safe Stream messages.
///
/// `Send` and `Repeat` share the [`DataMessage`] body; a repeat is the same
/// message under its own code with a non-zero repeat count, so lossy-link
/// tooling can tell retransmissions apart.
pub struct SafeStreamWire;

impl SafeStreamWire {
    pub fn init(
        packer: &mut Packer,
        request_id: RequestId,
        repeat_count: u16,
        init: SafeStreamInit,
    ) {
        packer.write_message_id(INIT);
        request_id.pack(packer);
        packer.write_u16(repeat_count);
        init.pack(packer);
    }

    pub fn init_ack(packer: &mut Packer, request_id: RequestId, init: SafeStreamInit) {
        packer.write_message_id(INIT_ACK);
        request_id.pack(packer);
        init.pack(packer);
    }

    pub fn confirm(packer: &mut Packer, offset: SsRingIndex) {
        packer.write_message_id(CONFIRM);
        offset.pack(packer);
    }

    pub fn request_repeat(packer: &mut Packer, offset: SsRingIndex) {
        packer.write_message_id(REQUEST_REPEAT);
        offset.pack(packer);
    }

    pub fn data(packer: &mut Packer, message: &DataMessage) {
        packer.write_message_id(if message.repeat_count == 0 { SEND } else { REPEAT });
        message.pack(packer);
    }

    /// Per-payload wire cost of a data message: code, control byte, offset
    /// and the worst-case length prefix.
    pub fn data_overhead(payload_len: usize) -> usize {
        1 + 1 + 2 + aether_codec::packed_size_len(payload_len)
    }
}

/// Queue of encoded packets the two halves hand to the downstream link.
///
/// Each message goes out as its own datagram.
#[derive(Debug, Default)]
pub struct Outbox {
    packets: Vec<bytes::Bytes>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init(&mut self, request_id: RequestId, repeat_count: u16, init: SafeStreamInit) {
        let mut packer = Packer::new();
        SafeStreamWire::init(&mut packer, request_id, repeat_count, init);
        self.packets.push(packer.into_bytes());
    }

    pub fn init_ack(&mut self, request_id: RequestId, init: SafeStreamInit) {
        let mut packer = Packer::new();
        SafeStreamWire::init_ack(&mut packer, request_id, init);
        self.packets.push(packer.into_bytes());
    }

    pub fn confirm(&mut self, offset: SsRingIndex) {
        let mut packer = Packer::new();
        SafeStreamWire::confirm(&mut packer, offset);
        self.packets.push(packer.into_bytes());
    }

    pub fn request_repeat(&mut self, offset: SsRingIndex) {
        let mut packer = Packer::new();
        SafeStreamWire::request_repeat(&mut packer, offset);
        self.packets.push(packer.into_bytes());
    }

    pub fn data(&mut self, message: &DataMessage) {
        let mut packer = Packer::new();
        SafeStreamWire::data(&mut packer, message);
        self.packets.push(packer.into_bytes());
    }

    pub fn take(&mut self) -> Vec<bytes::Bytes> {
        std::mem::take(&mut self.packets)
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

/// Parse-side events of the Safe Stream sub-API.
pub trait SafeStreamEvents {
    fn on_init(&mut self, request_id: RequestId, repeat_count: u16, init: SafeStreamInit);
    fn on_init_ack(&mut self, request_id: RequestId, init: SafeStreamInit);
    fn on_confirm(&mut self, offset: SsRingIndex);
    fn on_request_repeat(&mut self, offset: SsRingIndex);
    fn on_data(&mut self, message: DataMessage);
}

/// Adapter turning the message stream into [`SafeStreamEvents`] calls.
pub struct SafeStreamApi<'a, E: SafeStreamEvents> {
    pub events: &'a mut E,
}

impl<E: SafeStreamEvents> ApiHandler for SafeStreamApi<'_, E> {
    fn handle(&mut self, id: MessageId, parser: &mut ApiParser<'_>) -> Result<Handled, CodecError> {
        let unpacker = parser.unpacker();
        match id {
            INIT => {
                let request_id = RequestId::unpack(unpacker)?;
                let repeat_count = unpacker.read_u16()?;
                let init = SafeStreamInit::unpack(unpacker)?;
                self.events.on_init(request_id, repeat_count, init);
            }
            INIT_ACK => {
                let request_id = RequestId::unpack(unpacker)?;
                let init = SafeStreamInit::unpack(unpacker)?;
                self.events.on_init_ack(request_id, init);
            }
            CONFIRM => {
                let offset = SsRingIndex::unpack(unpacker)?;
                self.events.on_confirm(offset);
            }
            REQUEST_REPEAT => {
                let offset = SsRingIndex::unpack(unpacker)?;
                self.events.on_request_repeat(offset);
            }
            SEND | REPEAT => {
                let message = DataMessage::unpack(unpacker)?;
                self.events.on_data(message);
            }
            _ => return Ok(Handled::No),
        }
        Ok(Handled::Yes)
    }
}
