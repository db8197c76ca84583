//! Security contexts.
//!
//! A [`SecurityContext`] is the outcome of a successful negotiation: an
//! identifier, a proof key, two nested validity windows and the claims the
//! issuer attached. Contexts are immutable values. Renewal produces a new
//! value with the same identifier and a new key generation; the old value
//! stays valid for whoever still holds it.
//!
//! # Lifetimes
//!
//! ```text
//! token_valid_from            key_valid_from      key_valid_to            token_valid_to
//!        │─────────────────────────│═══════════════════│──────────────────────────│
//!                                  └── key usable ─────┘
//! ```
//!
//! The key window always nests inside the token window. It defaults to the
//! token window when not given.

mod claims;
mod error;
mod id;
mod key;

use std::sync::Arc;

use sessionframe_crypto::{DerivedKey, DerivedKeyParams, Zeroizing};

pub use self::{
    claims::{Claim, ClaimSet},
    error::{CacheError, ContextError},
    id::{ContextId, ContextKey, KeyGeneration},
    key::{KeyKind, KeyProvider, LazyKey, ProofKey, SYMMETRIC_KEY_SIZES},
};
use crate::time::Timestamp;

/// Negotiated security context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    context_id: ContextId,
    local_id: Option<String>,
    key_generation: Option<KeyGeneration>,
    key_kind: KeyKind,
    key: ProofKey,
    token_valid_from: Timestamp,
    token_valid_to: Timestamp,
    key_valid_from: Timestamp,
    key_valid_to: Timestamp,
    claims: Arc<[ClaimSet]>,
    cookie_blob: Option<Arc<[u8]>>,
}

/// Builder for [`SecurityContext`]; invariants are checked in
/// [`SecurityContextBuilder::build`].
#[derive(Debug, Clone)]
pub struct SecurityContextBuilder {
    context_id: ContextId,
    local_id: Option<String>,
    key_generation: Option<KeyGeneration>,
    key_kind: KeyKind,
    key: ProofKey,
    token_valid_from: Timestamp,
    token_valid_to: Timestamp,
    key_window: Option<(Timestamp, Timestamp)>,
    claims: Arc<[ClaimSet]>,
    cookie_blob: Option<Arc<[u8]>>,
}

impl SecurityContextBuilder {
    /// Local identifier of the context at the issuing endpoint.
    #[must_use]
    pub fn local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Key generation. Absent means no generation scheme.
    #[must_use]
    pub fn key_generation(mut self, generation: KeyGeneration) -> Self {
        self.key_generation = Some(generation);
        self
    }

    /// Key validity window. Defaults to the token window.
    #[must_use]
    pub fn key_window(mut self, valid_from: Timestamp, valid_to: Timestamp) -> Self {
        self.key_window = Some((valid_from, valid_to));
        self
    }

    /// Claims attached by the issuer.
    #[must_use]
    pub fn claims(mut self, claims: impl Into<Arc<[ClaimSet]>>) -> Self {
        self.claims = claims.into();
        self
    }

    /// Mark the context as carried by a cookie.
    #[must_use]
    pub fn cookie_blob(mut self, blob: impl Into<Arc<[u8]>>) -> Self {
        self.cookie_blob = Some(blob.into());
        self
    }

    /// Validate and produce the context.
    ///
    /// # Errors
    ///
    /// - `InvalidLifetime` if the windows are not nested
    /// - `InvalidKeyLength` if an eager key does not fit the key kind
    pub fn build(self) -> Result<SecurityContext, ContextError> {
        let (key_valid_from, key_valid_to) =
            self.key_window.unwrap_or((self.token_valid_from, self.token_valid_to));

        if self.token_valid_from > self.token_valid_to {
            return Err(ContextError::InvalidLifetime {
                reason: "token window ends before it starts",
            });
        }
        if key_valid_from > key_valid_to {
            return Err(ContextError::InvalidLifetime { reason: "key window ends before it starts" });
        }
        if key_valid_from < self.token_valid_from {
            return Err(ContextError::InvalidLifetime {
                reason: "key becomes effective before the token",
            });
        }
        if key_valid_to > self.token_valid_to {
            return Err(ContextError::InvalidLifetime { reason: "key expires after the token" });
        }

        if let ProofKey::Eager(bytes) = &self.key {
            self.key_kind.check_len(bytes.len())?;
        }

        Ok(SecurityContext {
            context_id: self.context_id,
            local_id: self.local_id,
            key_generation: self.key_generation,
            key_kind: self.key_kind,
            key: self.key,
            token_valid_from: self.token_valid_from,
            token_valid_to: self.token_valid_to,
            key_valid_from,
            key_valid_to,
            claims: self.claims,
            cookie_blob: self.cookie_blob,
        })
    }
}

impl SecurityContext {
    /// Start building a context with the required fields.
    pub fn builder(
        context_id: ContextId,
        key_kind: KeyKind,
        key: ProofKey,
        token_valid_from: Timestamp,
        token_valid_to: Timestamp,
    ) -> SecurityContextBuilder {
        SecurityContextBuilder {
            context_id,
            local_id: None,
            key_generation: None,
            key_kind,
            key,
            token_valid_from,
            token_valid_to,
            key_window: None,
            claims: Arc::from(Vec::<ClaimSet>::new()),
            cookie_blob: None,
        }
    }

    /// Stable identifier, unchanged across renewals.
    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Identifier at the issuing endpoint, if any.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Key generation, if the context uses one.
    pub fn key_generation(&self) -> Option<&KeyGeneration> {
        self.key_generation.as_ref()
    }

    /// Kind of proof key.
    pub fn key_kind(&self) -> KeyKind {
        self.key_kind
    }

    /// Proof key handle (bytes are not exposed through this).
    pub fn proof_key(&self) -> &ProofKey {
        &self.key
    }

    /// Copy of the key bytes, resolving a lazy key on first use.
    ///
    /// # Errors
    ///
    /// - `KeyResolution` or `InvalidKeyLength` if a lazy key fails to resolve
    pub fn key(&self) -> Result<Zeroizing<Vec<u8>>, ContextError> {
        self.key.resolve(self.key_kind)
    }

    /// Start of the token window.
    pub fn token_valid_from(&self) -> Timestamp {
        self.token_valid_from
    }

    /// End of the token window.
    pub fn token_valid_to(&self) -> Timestamp {
        self.token_valid_to
    }

    /// Start of the key window.
    pub fn key_valid_from(&self) -> Timestamp {
        self.key_valid_from
    }

    /// End of the key window.
    pub fn key_valid_to(&self) -> Timestamp {
        self.key_valid_to
    }

    /// Claims attached at negotiation time.
    pub fn claims(&self) -> &Arc<[ClaimSet]> {
        &self.claims
    }

    /// True when the context travels as a cookie instead of server state.
    pub fn is_cookie_mode(&self) -> bool {
        self.cookie_blob.is_some()
    }

    /// Encoded cookie, present only in cookie mode.
    pub fn cookie_blob(&self) -> Option<&[u8]> {
        self.cookie_blob.as_deref()
    }

    /// Cache index for this context.
    pub fn cache_key(&self) -> ContextKey {
        ContextKey {
            context_id: self.context_id.clone(),
            key_generation: self.key_generation.clone(),
        }
    }

    /// True once `now` is past the token window.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.token_valid_to
    }

    /// Derive a per-purpose key from this context's key.
    ///
    /// # Errors
    ///
    /// - `Derivation` if the request does not fit the key
    /// - `KeyResolution` if a lazy key fails to resolve
    pub fn derive_key(&self, params: DerivedKeyParams) -> Result<DerivedKey, ContextError> {
        let key = self.key()?;
        Ok(DerivedKey::derive(&key, params)?)
    }

    /// New context value for the next key generation.
    ///
    /// Identifier, local id, token window and claims carry over. The result
    /// is never in cookie mode; callers re-encode if they need one.
    ///
    /// # Errors
    ///
    /// - `InvalidLifetime` if the new key window does not nest in the token
    ///   window
    /// - `InvalidKeyLength` if the new key does not fit the key kind
    pub fn renew(
        &self,
        key: ProofKey,
        key_generation: KeyGeneration,
        key_valid_from: Timestamp,
        key_valid_to: Timestamp,
    ) -> Result<Self, ContextError> {
        let mut builder = Self::builder(
            self.context_id.clone(),
            self.key_kind,
            key,
            self.token_valid_from,
            self.token_valid_to,
        )
        .key_generation(key_generation)
        .key_window(key_valid_from, key_valid_to)
        .claims(Arc::clone(&self.claims));

        if let Some(local_id) = &self.local_id {
            builder = builder.local_id(local_id.clone());
        }
        builder.build()
    }

    /// Same context with `key_valid_to` moved to `expiry`, clamped to stay
    /// within `[key_valid_from, token_valid_to]`. Key material is shared.
    #[must_use]
    pub fn with_key_expiry(&self, expiry: Timestamp) -> Self {
        let mut updated = self.clone();
        updated.key_valid_to = expiry.clamp(self.key_valid_from, self.token_valid_to);
        updated
    }
}

/// What a caller presents to have a context authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextReference {
    /// Context identifier
    pub context_id: ContextId,
    /// Key generation, if any
    pub key_generation: Option<KeyGeneration>,
    /// Local identifier the cookie must carry, if any
    pub local_id: Option<String>,
    /// Cookie blob; when present the cache is bypassed
    pub cookie: Option<Vec<u8>>,
}

impl ContextReference {
    /// Reference to `context`, carrying its cookie when it has one.
    pub fn for_context(context: &SecurityContext) -> Self {
        Self {
            context_id: context.context_id.clone(),
            key_generation: context.key_generation.clone(),
            local_id: context.local_id.clone(),
            cookie: context.cookie_blob().map(<[u8]>::to_vec),
        }
    }
}
