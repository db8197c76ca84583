//! Context cookies.
//!
//! A cookie is a complete [`SecurityContext`] serialized into canonical bytes
//! (see [`format`]) and protected by a [`CookieProtector`]. The issuer hands
//! the blob to the client instead of keeping state; the client presents it
//! with every request and the issuer rebuilds the context from it.
//!
//! Decoding either yields a fully validated context or an error. Nothing
//! partially parsed is ever returned.

pub mod format;

mod error;
mod protector;

use std::sync::Arc;

pub use self::{
    error::{CookieError, InvalidCookieReason},
    format::COOKIE_FORMAT_VERSION,
    protector::{CookieProtector, XChaChaCookieProtector},
};
use crate::context::{ContextId, KeyGeneration, ProofKey, SecurityContext};

/// Upper bound on accepted cookie blobs.
pub const MAX_COOKIE_SIZE: usize = 64 * 1024;

/// Identity a decoded cookie must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieExpectation {
    /// Context id the caller presented
    pub context_id: ContextId,
    /// Key generation the caller presented
    pub key_generation: Option<KeyGeneration>,
    /// Local id the cookie must carry; not checked when `None`
    pub local_id: Option<String>,
}

/// Encodes contexts into cookies and decodes them back.
#[derive(Clone)]
pub struct ContextCookieCodec {
    protector: Arc<dyn CookieProtector>,
}

impl std::fmt::Debug for ContextCookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCookieCodec").finish_non_exhaustive()
    }
}

impl ContextCookieCodec {
    /// Create a codec around a protector.
    pub fn new(protector: Arc<dyn CookieProtector>) -> Self {
        Self { protector }
    }

    /// Serialize and protect `context`.
    ///
    /// # Errors
    ///
    /// - `Encode` if the key cannot be resolved, claims fail to serialize or
    ///   the protector fails
    pub fn encode(&self, context: &SecurityContext) -> Result<Vec<u8>, CookieError> {
        let plaintext = format::encode_fields(context)?;
        let blob = self.protector.protect(&plaintext)?;
        if blob.len() > MAX_COOKIE_SIZE {
            return Err(CookieError::Encode(format!(
                "cookie of {} bytes exceeds limit of {MAX_COOKIE_SIZE}",
                blob.len()
            )));
        }
        Ok(blob)
    }

    /// Unprotect and parse `blob`, checking it against `expected`.
    ///
    /// The returned context is in cookie mode and carries `blob`.
    ///
    /// # Errors
    ///
    /// - `InvalidCookie` if the blob fails integrity, parsing, identity
    ///   checks or context validation
    /// - `UnsupportedVersion` if the format version is unknown
    pub fn decode(
        &self,
        blob: &[u8],
        expected: &CookieExpectation,
    ) -> Result<SecurityContext, CookieError> {
        let result = self.decode_inner(blob, expected);
        if let Err(err) = &result {
            tracing::warn!(context_id = %expected.context_id, error = %err, "cookie rejected");
        }
        result
    }

    fn decode_inner(
        &self,
        blob: &[u8],
        expected: &CookieExpectation,
    ) -> Result<SecurityContext, CookieError> {
        if blob.len() > MAX_COOKIE_SIZE {
            return Err(InvalidCookieReason::TooLarge { len: blob.len(), max: MAX_COOKIE_SIZE }
                .into());
        }

        let plaintext = self.protector.unprotect(blob)?;
        let fields = format::decode_fields(&plaintext)?;

        if fields.context_id != expected.context_id {
            return Err(InvalidCookieReason::ContextIdMismatch.into());
        }
        if let Some(local_id) = &expected.local_id
            && fields.local_id.as_ref() != Some(local_id)
        {
            return Err(InvalidCookieReason::LocalIdMismatch.into());
        }
        if fields.key_generation != expected.key_generation {
            return Err(InvalidCookieReason::KeyGenerationMismatch.into());
        }

        let mut builder = SecurityContext::builder(
            fields.context_id,
            fields.key_kind,
            ProofKey::Eager(fields.key),
            fields.token_valid_from,
            fields.token_valid_to,
        )
        .key_window(fields.key_valid_from, fields.key_valid_to)
        .claims(fields.claims)
        .cookie_blob(blob.to_vec());

        if let Some(local_id) = fields.local_id {
            builder = builder.local_id(local_id);
        }
        if let Some(generation) = fields.key_generation {
            builder = builder.key_generation(generation);
        }

        builder.build().map_err(|err| InvalidCookieReason::InvalidContext(err).into())
    }
}
