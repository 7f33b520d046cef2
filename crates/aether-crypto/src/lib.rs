mod gate;
mod provider;
mod sealed;
mod sync;

pub use gate::CryptoGate;
pub use provider::{CryptoError, DecryptProvider, EncryptProvider};
pub use sealed::{SealedDecryptProvider, SealedEncryptProvider, generate_keypair};
pub use sync::{SharedKeyDecryptProvider, SharedKeyEncryptProvider};
