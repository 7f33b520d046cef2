use bytes::Bytes;

use crate::{CodecError, MessageId, packed_size::read_packed_size};

/// Cursor over one received packet.
#[derive(Debug)]
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Abandon the rest of the packet. Used when a parse cannot continue but
    /// the stream itself stays usable.
    pub fn cancel(&mut self) {
        self.pos = self.data.len();
    }

    pub fn read_message_id(&mut self) -> Result<MessageId, CodecError> {
        self.read_u8()
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let value = *self.data.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array::<2>()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let slice = self.data.get(self.pos..self.pos + N).ok_or(CodecError::Truncated)?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Bare packed-size value, used for element counts.
    pub fn read_packed_size(&mut self) -> Result<usize, CodecError> {
        read_packed_size(self.data, &mut self.pos)
    }

    /// Length-prefixed byte buffer, copied out of the packet.
    pub fn read_buffer(&mut self) -> Result<Bytes, CodecError> {
        let len = read_packed_size(self.data, &mut self.pos)?;
        let slice = self.data.get(self.pos..self.pos + len).ok_or(CodecError::Truncated)?;
        self.pos += len;
        Ok(Bytes::copy_from_slice(slice))
    }

    /// Length-prefixed slice borrowed from the packet, for nested parsing.
    pub fn read_slice(&mut self) -> Result<&'a [u8], CodecError> {
        let len = read_packed_size(self.data, &mut self.pos)?;
        let slice = self.data.get(self.pos..self.pos + len).ok_or(CodecError::Truncated)?;
        self.pos += len;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Packer;

    #[test]
    fn integers_little_endian() {
        let mut packer = Packer::new();
        packer.write_u16(0x1234);
        packer.write_u32(0xDEAD_BEEF);
        assert_eq!(packer.as_slice()[..2], [0x34, 0x12]);

        let bytes = packer.into_bytes();
        let mut unpacker = Unpacker::new(&bytes);
        assert_eq!(unpacker.read_u16().unwrap(), 0x1234);
        assert_eq!(unpacker.read_u32().unwrap(), 0xDEAD_BEEF);
        assert!(unpacker.is_empty());
    }

    #[test]
    fn buffer_round_trip() {
        let mut packer = Packer::new();
        packer.write_buffer(b"hello");
        let bytes = packer.into_bytes();

        let mut unpacker = Unpacker::new(&bytes);
        assert_eq!(unpacker.read_buffer().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn truncated_read_fails() {
        let mut unpacker = Unpacker::new(&[0x01]);
        assert_eq!(unpacker.read_u32(), Err(CodecError::Truncated));
    }

    #[test]
    fn cancel_consumes_rest() {
        let mut unpacker = Unpacker::new(&[1, 2, 3]);
        unpacker.read_u8().unwrap();
        unpacker.cancel();
        assert!(unpacker.is_empty());
    }
}
