use bytes::Bytes;

use crate::{CodecError, MessageId, packed_size::write_packed_size};

/// Append-only wire buffer for one packet.
///
/// Multi-byte integers are little-endian; buffers and nested packets carry a
/// packed-size prefix.
#[derive(Debug, Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_message_id(&mut self, id: MessageId) {
        self.buf.push(id);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Raw bytes, no length prefix. For fixed-width fields.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bare packed-size value, used for element counts.
    pub fn write_packed_size(&mut self, value: usize) {
        write_packed_size(&mut self.buf, value)
            .unwrap_or_else(|_| unreachable!("count {value} exceeds wire limit"));
    }

    /// Length-prefixed byte buffer.
    pub fn write_buffer(&mut self, data: &[u8]) {
        // lengths are bounded by transport element sizes, far below the
        // packed-size ceiling
        write_packed_size(&mut self.buf, data.len()).unwrap_or_else(|_| {
            unreachable!("buffer length {} exceeds wire limit", data.len())
        });
        self.buf.extend_from_slice(data);
    }

    /// Build a nested packet and append it length-prefixed.
    pub fn write_nested(&mut self, build: impl FnOnce(&mut Packer)) {
        let mut child = Packer::new();
        build(&mut child);
        self.write_buffer(child.as_slice());
    }

    pub fn try_write_buffer(&mut self, data: &[u8]) -> Result<(), CodecError> {
        write_packed_size(&mut self.buf, data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }
}
