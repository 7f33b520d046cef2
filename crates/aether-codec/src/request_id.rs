use std::sync::atomic::{AtomicU16, Ordering};

use crate::{CodecError, Packable, Packer, Unpacker};

static NEXT_REQUEST_ID: AtomicU16 = AtomicU16::new(1);

/// Correlation id tying a request to its `SendResult`/`SendError` response.
///
/// Ids are allocated from one process-wide counter so they stay unique
/// across every connection in a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u16);

impl RequestId {
    pub fn generate() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl From<u16> for RequestId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Packable for RequestId {
    fn pack(&self, packer: &mut Packer) {
        packer.write_u16(self.0);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, CodecError> {
        unpacker.read_u16().map(Self)
    }
}
