use aether_codec::{CodecError, Packable, Packer, Unpacker};
use bytes::Bytes;

use crate::ring_index::SsRingIndex;

/// Inclusive, wrap-aware span of ring offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub left: SsRingIndex,
    pub right: SsRingIndex,
}

impl OffsetRange {
    pub fn new(left: SsRingIndex, right: SsRingIndex) -> Self {
        Self { left, right }
    }

    /// Span covering `len` bytes starting at `left`. `len` must be nonzero.
    pub fn with_len(left: SsRingIndex, len: u16) -> Self {
        debug_assert!(len > 0);
        Self { left, right: left + (len - 1) }
    }

    pub fn in_range(&self, offset: SsRingIndex) -> bool {
        (self.left == offset || self.left.is_before(offset))
            && (self.right == offset || self.right.is_after(offset))
    }

    /// Whole range lies before `offset`.
    pub fn is_before(&self, offset: SsRingIndex) -> bool {
        self.right.is_before(offset)
    }

    /// Whole range lies after `offset`.
    pub fn is_after(&self, offset: SsRingIndex) -> bool {
        self.left.is_after(offset)
    }

    pub fn distance(&self) -> u16 {
        self.left.distance_to(self.right)
    }

    /// Number of offsets covered; a range is never empty.
    pub fn len(&self) -> usize {
        self.distance() as usize + 1
    }
}

/// Session parameters carried by `Init` and `InitAck`.
#[derive(Packable, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeStreamInit {
    pub offset: u16,
    pub window_size: u16,
    pub max_packet_size: u16,
}

const REPEAT_COUNT_MASK: u8 = 0x1F;
const RESET_FLAG: u8 = 0x20;

/// One data-bearing datagram: control bits, ring offset and payload.
///
/// Control byte layout: `repeat_count:5 ∥ reset:1 ∥ reserved:2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub repeat_count: u8,
    pub reset: bool,
    pub offset: SsRingIndex,
    pub data: Bytes,
}

impl DataMessage {
    pub fn range(&self) -> OffsetRange {
        OffsetRange::with_len(self.offset, self.data.len() as u16)
    }
}

impl Packable for DataMessage {
    fn pack(&self, packer: &mut Packer) {
        let control = (self.repeat_count & REPEAT_COUNT_MASK) | if self.reset { RESET_FLAG } else { 0 };
        packer.write_u8(control);
        self.offset.pack(packer);
        packer.write_buffer(&self.data);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let control = unpacker.read_u8()?;
        let offset = SsRingIndex::unpack(unpacker)?;
        let data = unpacker.read_buffer()?;
        Ok(Self {
            repeat_count: control & REPEAT_COUNT_MASK,
            reset: control & RESET_FLAG != 0,
            offset,
            data,
        })
    }
}

/// Slice of buffered send data handed to the wire.
#[derive(Debug, Clone)]
pub struct DataChunk {
    pub offset: SsRingIndex,
    pub data: Bytes,
}
