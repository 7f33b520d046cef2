use bytes::Bytes;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, KeyInit, Nonce,
    aead::Aead,
};

use crate::provider::{CryptoError, DecryptProvider, EncryptProvider};

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Symmetric provider over a per-connection shared secret.
///
/// Each buffer is sealed with a fresh counter nonce; the nonce travels in
/// front of the ciphertext so loss or reordering on the wire never desyncs
/// the receiver.
///
/// Wire layout: `nonce (12) ∥ ciphertext ∥ tag (16)`.
pub struct SharedKeyEncryptProvider {
    cipher: ChaCha20Poly1305,
    nonce_counter: u64,
}

impl SharedKeyEncryptProvider {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: ChaCha20Poly1305::new(Key::from_slice(key)), nonce_counter: 0 }
    }

    fn next_nonce(&mut self) -> [u8; NONCE_SIZE] {
        self.nonce_counter += 1;
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..8].copy_from_slice(&self.nonce_counter.to_le_bytes());
        nonce
    }
}

impl EncryptProvider for SharedKeyEncryptProvider {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, CryptoError> {
        let nonce = self.next_nonce();
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::SealFailed)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(Bytes::from(out))
    }

    fn overhead(&self) -> usize {
        NONCE_SIZE + TAG_SIZE
    }
}

pub struct SharedKeyDecryptProvider {
    cipher: ChaCha20Poly1305,
}

impl SharedKeyDecryptProvider {
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: ChaCha20Poly1305::new(Key::from_slice(key)) }
    }
}

impl DecryptProvider for SharedKeyDecryptProvider {
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, CryptoError> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Malformed);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map(Bytes::from)
            .map_err(|_| CryptoError::MacMismatch)
    }
}
