use aether_streams::{Gate, StreamError};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::provider::{DecryptProvider, EncryptProvider};

/// Encrypts outbound buffers and decrypts inbound ones.
///
/// A failed decrypt swallows the buffer so the reliability layer above
/// treats it as packet loss and retransmission recovers.
pub struct CryptoGate {
    encrypt: Box<dyn EncryptProvider>,
    decrypt: Box<dyn DecryptProvider>,
}

impl CryptoGate {
    pub fn new(encrypt: Box<dyn EncryptProvider>, decrypt: Box<dyn DecryptProvider>) -> Self {
        Self { encrypt, decrypt }
    }
}

impl Gate for CryptoGate {
    fn write_in(&mut self, data: Bytes) -> Result<Bytes, StreamError> {
        self.encrypt.encrypt(&data).map_err(|err| {
            warn!(?err, "encrypt failed");
            StreamError::DecryptFailure
        })
    }

    fn write_out(&mut self, data: Bytes) -> Option<Bytes> {
        match self.decrypt.decrypt(&data) {
            Ok(plain) => Some(plain),
            Err(err) => {
                debug!(?err, len = data.len(), "dropping undecryptable datagram");
                None
            }
        }
    }

    fn overhead(&self) -> usize {
        self.encrypt.overhead()
    }
}
