use bytes::Bytes;

use crate::{CodecError, Packer, Unpacker};

/// Field-ordered wire encoding.
///
/// Derivable for structs via `#[derive(Packable)]`; the generated code packs
/// and unpacks fields in declaration order, which *is* the wire layout.
pub trait Packable: Sized {
    fn pack(&self, packer: &mut Packer);
    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError>;
}

impl Packable for () {
    fn pack(&self, _packer: &mut Packer) {}

    fn unpack(_unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        Ok(())
    }
}

impl Packable for u8 {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u8(*self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u8()
    }
}

impl Packable for u16 {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u16(*self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u16()
    }
}

impl Packable for u32 {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u32(*self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u32()
    }
}

impl Packable for u64 {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u64(*self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u64()
    }
}

impl Packable for bool {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u8(u8::from(*self));
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        match unpacker.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CodecError::BadValue),
        }
    }
}

impl<const N: usize> Packable for [u8; N] {
    fn pack(&self, packer: &mut Packer) {
        packer.write_raw(self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_array::<N>()
    }
}

impl Packable for Bytes {
    fn pack(&self, packer: &mut Packer) {
        packer.write_buffer(self);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_buffer()
    }
}

impl Packable for String {
    fn pack(&self, packer: &mut Packer) {
        packer.write_buffer(self.as_bytes());
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let raw = unpacker.read_buffer()?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::BadValue)
    }
}

impl<T: Packable> Packable for Vec<T> {
    fn pack(&self, packer: &mut Packer) {
        // element count shares the packed-size format
        packer.write_packed_size(self.len());
        for item in self {
            item.pack(packer);
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        let count = unpacker.read_packed_size()?;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            out.push(T::unpack(unpacker)?);
        }
        Ok(out)
    }
}
