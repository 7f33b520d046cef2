use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ciphertext failed authentication")]
    MacMismatch,
    #[error("ciphertext shorter than its header")]
    Malformed,
    #[error("cipher rejected the payload")]
    SealFailed,
}

/// Outbound half of a crypto gate.
///
/// The provider owns its key material; callers never see plaintext keys.
pub trait EncryptProvider {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, CryptoError>;

    /// Bytes added per buffer, reported upstream as gate overhead.
    fn overhead(&self) -> usize;
}

/// Inbound half of a crypto gate.
pub trait DecryptProvider {
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, CryptoError>;
}
