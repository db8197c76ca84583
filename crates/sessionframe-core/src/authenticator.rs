//! Per-request context authentication.
//!
//! Resolves a presented [`ContextReference`] to a [`SecurityContext`] (from
//! its cookie, or from the cache) and checks that the context is usable at
//! `now`. On success the context's claims are handed back unchanged for the
//! caller to merge into its authorization state.
//!
//! Every rejection is logged at `warn` with details. Callers must only show
//! [`AuthenticationError::public_message`] to the remote party.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    cache::ContextCache,
    context::{ClaimSet, ContextId, ContextReference, KeyGeneration, SecurityContext},
    cookie::{ContextCookieCodec, CookieError, CookieExpectation},
    time::Timestamp,
};

/// Message shown to remote parties for every authentication failure.
pub const PUBLIC_FAILURE_MESSAGE: &str = "authentication failed";

/// Why a context was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Context is outside its validity window
    #[error("context {context_id} (generation {key_generation:?}) is not valid now")]
    ContextExpired {
        /// Context identifier
        context_id: ContextId,
        /// Key generation
        key_generation: Option<KeyGeneration>,
    },

    /// No cached context matches the reference
    #[error("unknown context {context_id} (generation {key_generation:?})")]
    UnknownContext {
        /// Context identifier
        context_id: ContextId,
        /// Key generation
        key_generation: Option<KeyGeneration>,
    },

    /// Presented cookie was rejected
    #[error("cookie rejected: {0}")]
    InvalidCookie(#[from] CookieError),

    /// A cookie was presented but this authenticator has no codec
    #[error("cookies are not accepted")]
    CookiesNotAccepted,
}

impl AuthenticationError {
    /// Text safe to return to the remote party.
    pub fn public_message(&self) -> &'static str {
        PUBLIC_FAILURE_MESSAGE
    }
}

/// Evidence produced by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationEvidence {
    /// Authenticated context
    pub context_id: ContextId,
    /// Key generation that was used
    pub key_generation: Option<KeyGeneration>,
    /// Claims attached to the context, verbatim
    pub claims: Arc<[ClaimSet]>,
}

/// Authenticates contexts presented with incoming requests.
#[derive(Debug, Clone)]
pub struct ContextAuthenticator {
    cache: Arc<ContextCache>,
    codec: Option<ContextCookieCodec>,
}

impl ContextAuthenticator {
    /// Authenticator backed by `cache`. Cookies are accepted only if a
    /// codec is supplied.
    pub fn new(cache: Arc<ContextCache>, codec: Option<ContextCookieCodec>) -> Self {
        Self { cache, codec }
    }

    /// Check that `context` is usable at `now`.
    ///
    /// Accepts when `token_valid_from <= now <= token_valid_to` and
    /// `key_valid_from <= now`. The key expiry is not consulted here.
    ///
    /// # Errors
    ///
    /// - `ContextExpired` if `now` is outside those bounds
    pub fn validate(
        &self,
        context: &SecurityContext,
        now: Timestamp,
    ) -> Result<AuthorizationEvidence, AuthenticationError> {
        let usable = context.token_valid_from() <= now
            && now <= context.token_valid_to()
            && context.key_valid_from() <= now;

        if !usable {
            let err = AuthenticationError::ContextExpired {
                context_id: context.context_id().clone(),
                key_generation: context.key_generation().cloned(),
            };
            tracing::warn!(
                context_id = %context.context_id(),
                now = %now,
                token_valid_from = %context.token_valid_from(),
                token_valid_to = %context.token_valid_to(),
                key_valid_from = %context.key_valid_from(),
                "context rejected: outside validity window"
            );
            return Err(err);
        }

        Ok(AuthorizationEvidence {
            context_id: context.context_id().clone(),
            key_generation: context.key_generation().cloned(),
            claims: Arc::clone(context.claims()),
        })
    }

    /// Resolve `reference` and validate the context at `now`.
    ///
    /// A reference carrying a cookie is decoded without consulting the cache.
    ///
    /// # Errors
    ///
    /// - `InvalidCookie` if the cookie is rejected
    /// - `CookiesNotAccepted` if a cookie was presented without a codec
    /// - `UnknownContext` if nothing is cached under the reference
    /// - `ContextExpired` from [`ContextAuthenticator::validate`]
    pub fn authenticate(
        &self,
        reference: &ContextReference,
        now: Timestamp,
    ) -> Result<AuthorizationEvidence, AuthenticationError> {
        let context = self.resolve(reference, now)?;
        self.validate(&context, now)
    }

    fn resolve(
        &self,
        reference: &ContextReference,
        now: Timestamp,
    ) -> Result<SecurityContext, AuthenticationError> {
        if let Some(cookie) = &reference.cookie {
            let Some(codec) = &self.codec else {
                tracing::warn!(context_id = %reference.context_id, "cookie presented but cookies are disabled");
                return Err(AuthenticationError::CookiesNotAccepted);
            };
            let expected = CookieExpectation {
                context_id: reference.context_id.clone(),
                key_generation: reference.key_generation.clone(),
                local_id: reference.local_id.clone(),
            };
            return Ok(codec.decode(cookie, &expected)?);
        }

        self.cache.get(&reference.context_id, reference.key_generation.as_ref(), now).ok_or_else(
            || {
                tracing::warn!(
                    context_id = %reference.context_id,
                    key_generation = ?reference.key_generation.as_ref().map(KeyGeneration::as_str),
                    "context rejected: not cached"
                );
                AuthenticationError::UnknownContext {
                    context_id: reference.context_id.clone(),
                    key_generation: reference.key_generation.clone(),
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::context::{Claim, KeyKind, ProofKey};

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs)
    }

    fn context(key_window: (i64, i64)) -> SecurityContext {
        SecurityContext::builder(
            ContextId::new("urn:uuid:a"),
            KeyKind::Symmetric,
            ProofKey::eager(vec![1u8; 16]),
            ts(100),
            ts(200),
        )
        .key_window(ts(key_window.0), ts(key_window.1))
        .claims(vec![ClaimSet::new("sts", vec![Claim::new("name", "bob")])])
        .build()
        .unwrap()
    }

    fn authenticator() -> ContextAuthenticator {
        ContextAuthenticator::new(Arc::new(ContextCache::default()), None)
    }

    #[test]
    fn validity_window_is_inclusive() {
        let auth = authenticator();
        let ctx = context((100, 200));

        assert!(auth.validate(&ctx, ts(100)).is_ok());
        assert!(auth.validate(&ctx, ts(200)).is_ok());
        assert!(auth.validate(&ctx, ts(99)).is_err());
        assert!(auth.validate(&ctx, ts(200).saturating_add(Duration::from_nanos(100))).is_err());
    }

    #[test]
    fn key_not_yet_effective_rejected() {
        let auth = authenticator();
        let ctx = context((150, 200));

        assert!(matches!(
            auth.validate(&ctx, ts(120)),
            Err(AuthenticationError::ContextExpired { .. })
        ));
        assert!(auth.validate(&ctx, ts(150)).is_ok());
    }

    #[test]
    fn key_expiry_not_consulted() {
        let auth = authenticator();
        let ctx = context((100, 150));
        assert!(auth.validate(&ctx, ts(180)).is_ok());
    }

    #[test]
    fn claims_returned_verbatim() {
        let auth = authenticator();
        let ctx = context((100, 200));
        let evidence = auth.validate(&ctx, ts(150)).unwrap();
        assert_eq!(&evidence.claims, ctx.claims());
        assert_eq!(&evidence.context_id, ctx.context_id());
    }

    #[test]
    fn unknown_context_rejected() {
        let auth = authenticator();
        let reference = ContextReference {
            context_id: ContextId::new("urn:uuid:missing"),
            key_generation: None,
            local_id: None,
            cookie: None,
        };
        let err = auth.authenticate(&reference, ts(150)).unwrap_err();
        assert!(matches!(err, AuthenticationError::UnknownContext { .. }));
        assert_eq!(err.public_message(), "authentication failed");
    }

    #[test]
    fn cookie_without_codec_rejected() {
        let auth = authenticator();
        let mut reference = ContextReference::for_context(&context((100, 200)));
        reference.cookie = Some(vec![1, 2, 3]);
        assert_eq!(
            auth.authenticate(&reference, ts(150)).unwrap_err(),
            AuthenticationError::CookiesNotAccepted
        );
    }
}
