use crate::CodecError;

/// Variable-width length prefix used for every buffer, string and nested
/// packet on the wire.
///
/// Leading-byte tags:
///   - `0xxxxxxx`                    1 byte, values 0..=127
///   - `10xxxxxx xxxxxxxx`           2 bytes, values up to 16383
///   - `11xxxxxx` + 3 bytes          4 bytes, values up to 2^30 - 1
///
/// The payload bits are big-endian within the prefix so the tag stays in the
/// first byte; all other wire integers are little-endian.
const ONE_BYTE_MAX: usize = 0x7F;
const TWO_BYTE_MAX: usize = 0x3FFF;
const FOUR_BYTE_MAX: usize = 0x3FFF_FFFF;

pub fn write_packed_size(out: &mut Vec<u8>, value: usize) -> Result<(), CodecError> {
    if value <= ONE_BYTE_MAX {
        out.push(value as u8);
    } else if value <= TWO_BYTE_MAX {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else if value <= FOUR_BYTE_MAX {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else {
        return Err(CodecError::LengthOverflow(value));
    }
    Ok(())
}

pub fn read_packed_size(data: &[u8], pos: &mut usize) -> Result<usize, CodecError> {
    let first = *data.get(*pos).ok_or(CodecError::Truncated)?;
    *pos += 1;

    if first & 0x80 == 0 {
        return Ok(first as usize);
    }

    if first & 0x40 == 0 {
        let second = *data.get(*pos).ok_or(CodecError::Truncated)?;
        *pos += 1;
        return Ok(((first as usize & 0x3F) << 8) | second as usize);
    }

    let rest = data.get(*pos..*pos + 3).ok_or(CodecError::Truncated)?;
    *pos += 3;
    Ok(((first as usize & 0x3F) << 24)
        | ((rest[0] as usize) << 16)
        | ((rest[1] as usize) << 8)
        | rest[2] as usize)
}

/// Encoded width of a packed size, for overhead accounting.
pub fn packed_size_len(value: usize) -> usize {
    if value <= ONE_BYTE_MAX {
        1
    } else if value <= TWO_BYTE_MAX {
        2
    } else {
        4
    }
}
