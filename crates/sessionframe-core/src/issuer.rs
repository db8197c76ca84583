//! Issuer side of the negotiation.
//!
//! [`SessionIssuer`] answers [`NegotiationRequest`]s: it checks the requested
//! algorithm suite and key parameters, optionally runs a challenge leg,
//! produces key material according to the entropy mode, and issues a
//! [`SecurityContext`]. The context is either cached or, in cookie mode,
//! encoded into a cookie returned to the requester so the issuer keeps no
//! per-client state.
//!
//! Like the requester state machine, the issuer does no I/O. Time is passed
//! in; randomness comes from the environment.
//!
//! A multi-leg challenge is single-use, expires after
//! [`IssuerConfig::challenge_lifetime`], and is bound to the parameters of
//! the leg that obtained it.

use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use sessionframe_crypto::{Zeroizing, compute_combined_key};
use thiserror::Error;

use crate::{
    cache::ContextCache,
    context::{
        CacheError, ClaimSet, ContextError, ContextId, KeyGeneration, KeyKind, ProofKey,
        SecurityContext,
    },
    cookie::{ContextCookieCodec, CookieError},
    env::Environment,
    negotiation::{
        AlgorithmSuite, EntropyMode, IssuedToken, NegotiationProfile, NegotiationRequest,
        NegotiationResponse, ProofDescriptor, ResponseBody,
    },
    time::Timestamp,
};

/// Lifetime of issued tokens when not configured.
pub const DEFAULT_ISSUED_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);

/// Key window length when not configured.
pub const DEFAULT_KEY_RENEWAL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How long a superseded key generation stays cached after renewal.
pub const DEFAULT_KEY_ROLLOVER_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outstanding challenges when not configured.
pub const DEFAULT_MAX_PENDING_CHALLENGES: usize = 128;

/// How long a challenge waits for its continuation.
pub const DEFAULT_CHALLENGE_LIFETIME: Duration = Duration::from_secs(60);

/// Size of a continuation challenge.
const CHALLENGE_SIZE: usize = 16;

/// Fault code for requests the issuer will not serve.
pub const FAULT_INVALID_REQUEST: &str = "wst:InvalidRequest";

/// Fault code for requests that are internally inconsistent.
pub const FAULT_BAD_REQUEST: &str = "wst:BadRequest";

/// Fault code for issuer-side failures.
pub const FAULT_REQUEST_FAILED: &str = "wst:RequestFailed";

/// Issuer configuration
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Token window length
    pub issued_token_lifetime: Duration,
    /// Key window length; renewal is expected before it ends
    pub key_renewal_interval: Duration,
    /// How long the previous generation is still served after renewal
    pub key_rollover_interval: Duration,
    /// Only suite this issuer applies
    pub algorithm_suite: AlgorithmSuite,
    /// Message flow
    pub profile: NegotiationProfile,
    /// Return contexts as cookies instead of caching them
    pub cookie_mode: bool,
    /// Bound on challenges awaiting their second leg
    pub max_pending_challenges: usize,
    /// Time a requester has to answer a challenge
    pub challenge_lifetime: Duration,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issued_token_lifetime: DEFAULT_ISSUED_TOKEN_LIFETIME,
            key_renewal_interval: DEFAULT_KEY_RENEWAL_INTERVAL,
            key_rollover_interval: DEFAULT_KEY_ROLLOVER_INTERVAL,
            algorithm_suite: AlgorithmSuite::Basic256,
            profile: NegotiationProfile::Default,
            cookie_mode: false,
            max_pending_challenges: DEFAULT_MAX_PENDING_CHALLENGES,
            challenge_lifetime: DEFAULT_CHALLENGE_LIFETIME,
        }
    }
}

/// Issuer-side failures outside the request/response exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssuerError {
    /// No cached context to renew
    #[error("unknown context {context_id}")]
    UnknownContext {
        /// Requested context
        context_id: ContextId,
    },

    /// Only symmetric contexts can be renewed
    #[error("{kind:?} contexts cannot be renewed")]
    RenewalNotSupported {
        /// Kind of the context
        kind: KeyKind,
    },

    /// Cookie mode configured without a codec
    #[error("cookie mode requires a cookie codec")]
    MissingCodec,

    /// Renewed context invalid
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Cache refused the context
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Cookie could not be produced
    #[error(transparent)]
    Cookie(#[from] CookieError),
}

/// Responder in the negotiation exchange.
pub struct SessionIssuer<E: Environment> {
    config: IssuerConfig,
    env: E,
    cache: Arc<ContextCache>,
    codec: Option<ContextCookieCodec>,
    pending: Mutex<HashMap<Vec<u8>, PendingChallenge>>,
}

/// A handed-out challenge and the leg it was handed to.
struct PendingChallenge {
    expires_at: Timestamp,
    leg: LegParameters,
}

/// Request parameters a continuation must repeat unchanged.
#[derive(PartialEq, Eq)]
struct LegParameters {
    key_type: KeyKind,
    key_size_bits: u32,
    entropy_mode: EntropyMode,
    entropy: Option<Zeroizing<Vec<u8>>>,
    public_key: Option<Vec<u8>>,
    audience: Option<String>,
    algorithm_suite: AlgorithmSuite,
}

impl LegParameters {
    fn of(request: &NegotiationRequest) -> Self {
        Self {
            key_type: request.key_type,
            key_size_bits: request.key_size_bits,
            entropy_mode: request.entropy_mode,
            entropy: request.entropy.clone().map(Zeroizing::new),
            public_key: request.public_key.clone(),
            audience: request.audience.clone(),
            algorithm_suite: request.algorithm_suite,
        }
    }
}

/// Fault raised while handling a request.
struct Fault {
    code: &'static str,
    reason: String,
}

impl Fault {
    fn invalid(reason: impl Into<String>) -> Self {
        Self { code: FAULT_INVALID_REQUEST, reason: reason.into() }
    }

    fn bad(reason: impl Into<String>) -> Self {
        Self { code: FAULT_BAD_REQUEST, reason: reason.into() }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self { code: FAULT_REQUEST_FAILED, reason: reason.into() }
    }
}

impl<E: Environment> SessionIssuer<E> {
    /// Create an issuer.
    ///
    /// # Errors
    ///
    /// - `MissingCodec` if `config.cookie_mode` is set without a codec
    pub fn new(
        config: IssuerConfig,
        env: E,
        cache: Arc<ContextCache>,
        codec: Option<ContextCookieCodec>,
    ) -> Result<Self, IssuerError> {
        if config.cookie_mode && codec.is_none() {
            return Err(IssuerError::MissingCodec);
        }
        Ok(Self { config, env, cache, codec, pending: Mutex::new(HashMap::new()) })
    }

    /// Configuration
    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Cache holding issued contexts.
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Answer one request leg. `claims` describe the authenticated requester
    /// and are attached to the issued context.
    pub fn handle_request(
        &self,
        request: NegotiationRequest,
        claims: &[ClaimSet],
        now: Timestamp,
    ) -> NegotiationResponse {
        let correlation = request.correlation;
        match self.process(&request, claims, now) {
            Ok(body) => NegotiationResponse { correlation, body },
            Err(fault) => {
                tracing::warn!(
                    code = fault.code,
                    reason = %fault.reason,
                    leg = request.leg,
                    "negotiation request refused"
                );
                NegotiationResponse::fault(correlation, fault.code, fault.reason)
            },
        }
    }

    /// Issue the next key generation for a cached context.
    ///
    /// The new generation gets a fresh key and a key window starting at
    /// `now`; the token window is unchanged. The previous generation keeps
    /// being served for [`IssuerConfig::key_rollover_interval`], then drops
    /// out of the cache.
    ///
    /// # Errors
    ///
    /// - `UnknownContext` if the generation is not cached
    /// - `RenewalNotSupported` for non-symmetric contexts
    /// - `Context` if the token window has already closed
    /// - `Cache` if the cache refuses the new generation
    pub fn renew(
        &self,
        context_id: &ContextId,
        key_generation: Option<&KeyGeneration>,
        now: Timestamp,
    ) -> Result<SecurityContext, IssuerError> {
        let Some(current) = self.cache.get(context_id, key_generation, now) else {
            return Err(IssuerError::UnknownContext { context_id: context_id.clone() });
        };
        if current.key_kind() != KeyKind::Symmetric {
            return Err(IssuerError::RenewalNotSupported { kind: current.key_kind() });
        }

        let key_len = current.key()?.len();
        let key = ProofKey::eager(self.env.random_vec(key_len));
        let generation = KeyGeneration::generate(&self.env);
        let key_valid_to =
            now.saturating_add(self.config.key_renewal_interval).min(current.token_valid_to());

        let renewed = current.renew(key, generation, now, key_valid_to)?;
        self.cache.add(renewed.clone())?;
        self.cache
            .update_key_validity(&current, now.saturating_add(self.config.key_rollover_interval));

        tracing::info!(
            context_id = %context_id,
            key_generation = ?renewed.key_generation().map(KeyGeneration::as_str),
            key_valid_to = %key_valid_to,
            "renewed context key"
        );
        Ok(renewed)
    }

    /// Forget challenges whose continuation can no longer arrive in time.
    /// Returns how many were dropped.
    pub fn purge_expired_challenges(&self, now: Timestamp) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, challenge| now <= challenge.expires_at);
        let purged = before - pending.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = pending.len(), "purged expired challenges");
        }
        purged
    }

    /// Number of challenges awaiting a continuation.
    pub fn pending_challenges(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every cached generation of a context.
    pub fn cancel(&self, context_id: &ContextId) -> usize {
        let removed = self.cache.remove_all(context_id);
        tracing::info!(context_id = %context_id, removed, "cancelled context");
        removed
    }

    fn process(
        &self,
        request: &NegotiationRequest,
        claims: &[ClaimSet],
        now: Timestamp,
    ) -> Result<ResponseBody, Fault> {
        if request.algorithm_suite != self.config.algorithm_suite {
            return Err(Fault::invalid(format!(
                "algorithm suite {:?} not supported",
                request.algorithm_suite
            )));
        }

        if let Some(body) = self.challenge_leg(request, now)? {
            return Ok(body);
        }

        let (context_key, proof, key_size_bits) = self.key_material(request)?;
        let token = self.issue(context_key, proof, key_size_bits, request.key_type, claims, now)?;
        Ok(ResponseBody::Issued(token))
    }

    /// Multi-leg profile: first leg gets a challenge, the second must echo
    /// one we handed out, in time, with the same parameters.
    fn challenge_leg(
        &self,
        request: &NegotiationRequest,
        now: Timestamp,
    ) -> Result<Option<ResponseBody>, Fault> {
        let NegotiationProfile::MultiLeg { .. } = self.config.profile else {
            if request.continuation.is_some() {
                return Err(Fault::bad("unexpected continuation"));
            }
            return Ok(None);
        };

        let mut pending = self.pending.lock();
        match &request.continuation {
            Some(challenge) => {
                let Some(issued) = pending.remove(challenge) else {
                    return Err(Fault::bad("unknown or replayed challenge"));
                };
                if now > issued.expires_at {
                    return Err(Fault::bad("challenge expired"));
                }
                if issued.leg != LegParameters::of(request) {
                    return Err(Fault::bad("continuation changes first-leg parameters"));
                }
                Ok(None)
            },
            None => {
                pending.retain(|_, challenge| now <= challenge.expires_at);
                if pending.len() >= self.config.max_pending_challenges {
                    return Err(Fault::failed("too many pending negotiations"));
                }
                let challenge = self.env.random_vec(CHALLENGE_SIZE);
                let expires_at = now.saturating_add(self.config.challenge_lifetime);
                pending.insert(
                    challenge.clone(),
                    PendingChallenge { expires_at, leg: LegParameters::of(request) },
                );
                Ok(Some(ResponseBody::Continue { challenge }))
            },
        }
    }

    /// Key for the issuer's context, proof for the requester, and the key
    /// size to advertise.
    fn key_material(
        &self,
        request: &NegotiationRequest,
    ) -> Result<(ProofKey, ProofDescriptor, Option<u32>), Fault> {
        match request.key_type {
            KeyKind::Bearer => {
                if request.entropy.is_some() || request.public_key.is_some() {
                    return Err(Fault::bad("bearer request carries key material"));
                }
                Ok((ProofKey::none(), ProofDescriptor::None, None))
            },
            KeyKind::Asymmetric => match &request.public_key {
                Some(public_key) if !public_key.is_empty() => Ok((
                    ProofKey::eager(public_key.clone()),
                    ProofDescriptor::PublicKeyBinding(public_key.clone()),
                    None,
                )),
                _ => Err(Fault::bad("asymmetric request without public key")),
            },
            KeyKind::Symmetric => self.symmetric_material(request),
        }
    }

    fn symmetric_material(
        &self,
        request: &NegotiationRequest,
    ) -> Result<(ProofKey, ProofDescriptor, Option<u32>), Fault> {
        let bits = request.key_size_bits;
        if !self.config.algorithm_suite.supports_key_size(bits) {
            return Err(Fault::invalid(format!("key size {bits} not supported")));
        }
        let len = bits as usize / 8;

        match (request.entropy_mode, &request.entropy) {
            (EntropyMode::ClientOnly, Some(entropy)) if entropy.len() == len => {
                Ok((ProofKey::eager(entropy.clone()), ProofDescriptor::None, None))
            },
            (EntropyMode::ServerOnly, None) => {
                let key = self.env.random_vec(len);
                Ok((ProofKey::eager(key.clone()), ProofDescriptor::InlineKey(key), None))
            },
            (EntropyMode::Combined, Some(entropy)) if entropy.len() == len => {
                let issuer_entropy = self.env.random_vec(len);
                let key = compute_combined_key(entropy, &issuer_entropy, bits)
                    .map_err(|err| Fault::failed(err.to_string()))?;
                Ok((
                    ProofKey::Eager(key),
                    ProofDescriptor::IssuerEntropy(issuer_entropy),
                    Some(bits),
                ))
            },
            (mode, _) => {
                Err(Fault::bad(format!("entropy does not match {mode:?} mode and {bits}-bit key")))
            },
        }
    }

    fn issue(
        &self,
        key: ProofKey,
        proof: ProofDescriptor,
        key_size_bits: Option<u32>,
        key_kind: KeyKind,
        claims: &[ClaimSet],
        now: Timestamp,
    ) -> Result<IssuedToken, Fault> {
        let token_valid_to = now.saturating_add(self.config.issued_token_lifetime);
        let key_valid_to = now.saturating_add(self.config.key_renewal_interval).min(token_valid_to);
        let context_id = ContextId::generate(&self.env);
        let key_generation = KeyGeneration::generate(&self.env);

        let context = SecurityContext::builder(
            context_id.clone(),
            key_kind,
            key,
            now,
            token_valid_to,
        )
        .key_generation(key_generation.clone())
        .key_window(now, key_valid_to)
        .claims(claims.to_vec())
        .build()
        .map_err(|err| Fault::bad(err.to_string()))?;

        let cookie = if self.config.cookie_mode {
            let Some(codec) = &self.codec else {
                return Err(Fault::failed("cookie codec unavailable"));
            };
            Some(codec.encode(&context).map_err(|err| Fault::failed(err.to_string()))?)
        } else {
            self.cache.add(context).map_err(|err| Fault::failed(err.to_string()))?;
            None
        };

        tracing::info!(
            context_id = %context_id,
            key_kind = ?key_kind,
            cookie_mode = cookie.is_some(),
            token_valid_to = %token_valid_to,
            "issued security context"
        );

        Ok(IssuedToken {
            context_id,
            local_id: None,
            key_generation: Some(key_generation),
            key_size_bits,
            proof,
            algorithm_suite: self.config.algorithm_suite,
            token_valid_from: now,
            token_valid_to,
            key_window: Some((now, key_valid_to)),
            claims: claims.to_vec(),
            cookie,
        })
    }
}
