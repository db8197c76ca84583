//! Ephemeral proof keys for asymmetric negotiation.

use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

use super::error::NegotiationError;

/// Seed size handed to an [`EphemeralKeyGenerator`].
pub const EPHEMERAL_SEED_SIZE: usize = 32;

/// Ephemeral keypair bound to an asymmetric context.
pub struct EphemeralKeyPair {
    /// Public component, sent to the issuer
    pub public_key: Vec<u8>,
    /// Private component, becomes the context key
    pub private_key: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

/// Produces ephemeral keypairs from caller-supplied randomness.
///
/// The seed comes from the negotiation's environment, so simulated runs
/// produce the same keys.
pub trait EphemeralKeyGenerator: Send + Sync {
    /// Generate a keypair from `seed`.
    ///
    /// # Errors
    ///
    /// - `KeyGeneration` if the primitive rejects the seed
    fn generate(
        &self,
        seed: &[u8; EPHEMERAL_SEED_SIZE],
    ) -> Result<EphemeralKeyPair, NegotiationError>;
}

/// Ed25519 keypairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519KeyGenerator;

impl EphemeralKeyGenerator for Ed25519KeyGenerator {
    fn generate(
        &self,
        seed: &[u8; EPHEMERAL_SEED_SIZE],
    ) -> Result<EphemeralKeyPair, NegotiationError> {
        let signing_key = SigningKey::from_bytes(seed);
        Ok(EphemeralKeyPair {
            public_key: signing_key.verifying_key().to_bytes().to_vec(),
            private_key: Zeroizing::new(signing_key.to_bytes().to_vec()),
        })
    }
}
