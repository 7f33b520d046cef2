use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::provider::{CryptoError, DecryptProvider, EncryptProvider};

const PUBLIC_KEY_SIZE: usize = 32;
const MESSAGE_ID_SIZE: usize = 8;
const TAG_SIZE: usize = 16;
const KDF_INFO: &[u8] = b"aethernet sealed message";

// process-wide so two connections to the same peer never reuse an id
static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Public-key provider sealing each buffer to a peer's long-term key.
///
/// Every `encrypt` derives a one-off session key from an ephemeral X25519
/// exchange and binds the message id as associated data.
///
/// Wire layout:
/// `ephemeral public key (32) ∥ message id (8, LE) ∥ ciphertext ∥ tag (16)`.
pub struct SealedEncryptProvider {
    peer_public: PublicKey,
}

impl SealedEncryptProvider {
    pub fn new(peer_public: [u8; 32]) -> Self {
        Self { peer_public: PublicKey::from(peer_public) }
    }
}

fn derive_key(shared: &[u8; 32], ephemeral_public: &PublicKey) -> ChaCha20Poly1305 {
    let kdf = Hkdf::<Sha256>::new(Some(ephemeral_public.as_bytes()), shared);
    let mut key = [0u8; 32];
    // expand cannot fail for a 32-byte output with SHA-256
    kdf.expand(KDF_INFO, &mut key).unwrap_or_else(|_| unreachable!("hkdf output too long"));
    ChaCha20Poly1305::new(Key::from_slice(&key))
}

fn message_nonce(message_id: u64) -> Nonce {
    let mut nonce = [0u8; 12];
    nonce[..MESSAGE_ID_SIZE].copy_from_slice(&message_id.to_le_bytes());
    Nonce::from(nonce)
}

impl EncryptProvider for SealedEncryptProvider {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Bytes, CryptoError> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.peer_public);
        let cipher = derive_key(shared.as_bytes(), &ephemeral_public);

        let message_id = NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed);
        let id_bytes = message_id.to_le_bytes();

        let sealed = cipher
            .encrypt(&message_nonce(message_id), Payload { msg: plaintext, aad: &id_bytes })
            .map_err(|_| CryptoError::SealFailed)?;

        let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + MESSAGE_ID_SIZE + sealed.len());
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&id_bytes);
        out.extend_from_slice(&sealed);
        Ok(Bytes::from(out))
    }

    fn overhead(&self) -> usize {
        PUBLIC_KEY_SIZE + MESSAGE_ID_SIZE + TAG_SIZE
    }
}

/// Receiving side of [`SealedEncryptProvider`], holding the long-term
/// keypair's secret half.
pub struct SealedDecryptProvider {
    secret: StaticSecret,
}

impl SealedDecryptProvider {
    pub fn new(secret: StaticSecret) -> Self {
        Self { secret }
    }
}

impl DecryptProvider for SealedDecryptProvider {
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Bytes, CryptoError> {
        if ciphertext.len() < PUBLIC_KEY_SIZE + MESSAGE_ID_SIZE + TAG_SIZE {
            return Err(CryptoError::Malformed);
        }
        let (ephemeral_raw, rest) = ciphertext.split_at(PUBLIC_KEY_SIZE);
        let (id_bytes, sealed) = rest.split_at(MESSAGE_ID_SIZE);

        let mut ephemeral_key = [0u8; PUBLIC_KEY_SIZE];
        ephemeral_key.copy_from_slice(ephemeral_raw);
        let ephemeral_public = PublicKey::from(ephemeral_key);

        let shared = self.secret.diffie_hellman(&ephemeral_public);
        let cipher = derive_key(shared.as_bytes(), &ephemeral_public);

        let mut id_raw = [0u8; MESSAGE_ID_SIZE];
        id_raw.copy_from_slice(id_bytes);
        let message_id = u64::from_le_bytes(id_raw);

        cipher
            .decrypt(&message_nonce(message_id), Payload { msg: sealed, aad: id_bytes })
            .map(Bytes::from)
            .map_err(|_| CryptoError::MacMismatch)
    }
}

/// Fresh long-term X25519 keypair: `(secret, public)`.
pub fn generate_keypair() -> (StaticSecret, [u8; 32]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (secret, *public.as_bytes())
}
