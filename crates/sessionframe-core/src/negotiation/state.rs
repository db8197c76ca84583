//! Negotiation state machine (requester side).
//!
//! Pure protocol logic: it builds requests, checks responses and turns an
//! issued token into a [`SecurityContext`]. It performs no I/O and never
//! waits; the [`NegotiationEngine`](super::NegotiationEngine) drives it over a
//! transport.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐ start  ┌──────────────────┐  Issued   ┌───────────┐
//! │ NotStarted │───────>│ AwaitingResponse │──────────>│ Completed │
//! └────────────┘        └──────────────────┘           └───────────┘
//!                          │    ↑        │
//!                 Continue │    │ next_  │ any error
//!                          ↓    │ request↓
//!                  ┌──────────────────┐ ┌─────────┐
//!                  │ MoreLegsRequired │ │ Faulted │
//!                  └──────────────────┘ └─────────┘
//! ```

use std::sync::Arc;

use sessionframe_crypto::{Zeroizing, compute_combined_key};

use super::{
    error::NegotiationError,
    keypair::{EPHEMERAL_SEED_SIZE, Ed25519KeyGenerator, EphemeralKeyGenerator, EphemeralKeyPair},
    message::{
        AlgorithmSuite, Correlation, EntropyMode, IssuedToken, NegotiationRequest,
        NegotiationResponse, ProofDescriptor, ResponseBody,
    },
};
use crate::{
    context::{KeyKind, ProofKey, SecurityContext},
    env::Environment,
    time::Timestamp,
};

/// Key size requested when not configured.
pub const DEFAULT_KEY_SIZE_BITS: u32 = 256;

/// Leg limit for the multi-leg profile when not configured.
pub const DEFAULT_MAX_LEGS: u32 = 4;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// `start` not called yet
    NotStarted,
    /// A request is outstanding
    AwaitingResponse,
    /// Issuer asked for another leg; call `next_request`
    MoreLegsRequired,
    /// Context established
    Completed,
    /// Negotiation failed; no further progress possible
    Faulted,
}

/// Message flow variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationProfile {
    /// Single request/response; a continuation is a protocol violation
    Default,
    /// Issuer may request further legs by returning a challenge
    MultiLeg {
        /// Maximum number of request legs
        max_legs: u32,
    },
}

/// Negotiation configuration
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Proof key kind to request
    pub key_kind: KeyKind,
    /// Requested key size in bits
    pub key_size_bits: u32,
    /// Symmetric key material source
    pub entropy_mode: EntropyMode,
    /// Algorithm suite to request
    pub algorithm_suite: AlgorithmSuite,
    /// Message flow
    pub profile: NegotiationProfile,
    /// Intended audience
    pub audience: Option<String>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            key_kind: KeyKind::Symmetric,
            key_size_bits: DEFAULT_KEY_SIZE_BITS,
            entropy_mode: EntropyMode::Combined,
            algorithm_suite: AlgorithmSuite::Basic256,
            profile: NegotiationProfile::Default,
            audience: None,
        }
    }
}

/// Result of handling a response.
#[derive(Debug)]
pub enum NegotiationStep {
    /// Context established
    Completed(SecurityContext),
    /// Call `next_request` and send it
    MoreLegsRequired,
}

/// Requester-side negotiation.
pub struct Negotiation<E: Environment> {
    config: NegotiationConfig,
    env: E,
    key_generator: Arc<dyn EphemeralKeyGenerator>,
    state: NegotiationState,
    leg: u32,
    outstanding: Option<Correlation>,
    local_entropy: Option<Zeroizing<Vec<u8>>>,
    keypair: Option<EphemeralKeyPair>,
    challenge: Option<Vec<u8>>,
}

impl<E: Environment> Negotiation<E> {
    /// Negotiation using Ed25519 for asymmetric proof keys.
    pub fn new(config: NegotiationConfig, env: E) -> Self {
        Self::with_key_generator(config, env, Arc::new(Ed25519KeyGenerator))
    }

    /// Negotiation with an explicit ephemeral key generator.
    pub fn with_key_generator(
        config: NegotiationConfig,
        env: E,
        key_generator: Arc<dyn EphemeralKeyGenerator>,
    ) -> Self {
        Self {
            config,
            env,
            key_generator,
            state: NegotiationState::NotStarted,
            leg: 0,
            outstanding: None,
            local_entropy: None,
            keypair: None,
            challenge: None,
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Number of legs sent so far.
    pub fn leg(&self) -> u32 {
        self.leg
    }

    /// Configuration
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Produce the first request.
    ///
    /// Generates local entropy or an ephemeral keypair as the configuration
    /// requires.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if already started
    /// - `InvalidConfig` if the key size is not usable with the suite
    /// - `KeyGeneration` if the ephemeral keypair cannot be generated
    pub fn start(&mut self) -> Result<NegotiationRequest, NegotiationError> {
        self.require(NegotiationState::NotStarted, "start")?;
        self.guard(Self::prepare_and_send)
    }

    /// Check a response to the outstanding request.
    ///
    /// `now` is used to reject tokens that are already expired.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no request is outstanding
    /// - `CorrelationMismatch` if the response answers another request
    /// - `ProtocolFault` if the issuer returned a fault
    /// - `AlgorithmMismatch` if the issuer applied another suite
    /// - `TooManyLegs` if the leg limit is reached
    /// - `MalformedResponse` or `Context` if the token is unusable
    pub fn handle_response(
        &mut self,
        response: NegotiationResponse,
        now: Timestamp,
    ) -> Result<NegotiationStep, NegotiationError> {
        self.require(NegotiationState::AwaitingResponse, "handle_response")?;
        self.guard(|this| this.process_response(response, now))
    }

    /// Produce the next request after `MoreLegsRequired`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless the last response asked for another leg
    pub fn next_request(&mut self) -> Result<NegotiationRequest, NegotiationError> {
        self.require(NegotiationState::MoreLegsRequired, "next_request")?;
        self.guard(|this| Ok(this.build_request()))
    }

    fn require(
        &self,
        expected: NegotiationState,
        operation: &'static str,
    ) -> Result<(), NegotiationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(NegotiationError::InvalidState { state: self.state, operation })
        }
    }

    /// Run `f`, moving to `Faulted` if it fails.
    fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, NegotiationError>,
    ) -> Result<T, NegotiationError> {
        let result = f(self);
        if let Err(err) = &result {
            tracing::debug!(error = %err, leg = self.leg, "negotiation faulted");
            self.state = NegotiationState::Faulted;
            self.outstanding = None;
        }
        result
    }

    fn prepare_and_send(&mut self) -> Result<NegotiationRequest, NegotiationError> {
        let bits = self.config.key_size_bits;
        match self.config.key_kind {
            KeyKind::Symmetric => {
                if !self.config.algorithm_suite.supports_key_size(bits) {
                    return Err(NegotiationError::InvalidConfig {
                        reason: "key size not supported by algorithm suite",
                    });
                }
                if self.config.entropy_mode != EntropyMode::ServerOnly {
                    let entropy = self.env.random_vec(bits as usize / 8);
                    self.local_entropy = Some(Zeroizing::new(entropy));
                }
            },
            KeyKind::Asymmetric => {
                let mut seed = Zeroizing::new([0u8; EPHEMERAL_SEED_SIZE]);
                self.env.random_bytes(&mut *seed);
                self.keypair = Some(self.key_generator.generate(&seed)?);
            },
            KeyKind::Bearer => {},
        }

        if let NegotiationProfile::MultiLeg { max_legs: 0 } = self.config.profile {
            return Err(NegotiationError::InvalidConfig { reason: "multi-leg profile allows no legs" });
        }

        Ok(self.build_request())
    }

    fn build_request(&mut self) -> NegotiationRequest {
        let correlation = Correlation::generate(&self.env);
        self.leg += 1;
        self.outstanding = Some(correlation);
        self.state = NegotiationState::AwaitingResponse;

        tracing::debug!(leg = self.leg, correlation = %correlation, "sending negotiation request");

        NegotiationRequest {
            correlation,
            leg: self.leg,
            key_type: self.config.key_kind,
            key_size_bits: self.config.key_size_bits,
            entropy_mode: self.config.entropy_mode,
            entropy: self.local_entropy.as_ref().map(|entropy| entropy.to_vec()),
            public_key: self.keypair.as_ref().map(|pair| pair.public_key.clone()),
            audience: self.config.audience.clone(),
            algorithm_suite: self.config.algorithm_suite,
            continuation: self.challenge.take(),
        }
    }

    fn process_response(
        &mut self,
        response: NegotiationResponse,
        now: Timestamp,
    ) -> Result<NegotiationStep, NegotiationError> {
        let Some(expected) = self.outstanding else {
            return Err(NegotiationError::InvalidState {
                state: self.state,
                operation: "handle_response",
            });
        };
        if response.correlation != expected {
            return Err(NegotiationError::CorrelationMismatch {
                expected,
                received: response.correlation,
            });
        }
        self.outstanding = None;

        match response.body {
            ResponseBody::Fault { code, reason } => {
                Err(NegotiationError::ProtocolFault { code, reason })
            },
            ResponseBody::Continue { challenge } => {
                let NegotiationProfile::MultiLeg { max_legs } = self.config.profile else {
                    return Err(NegotiationError::MalformedResponse {
                        reason: "continuation in single-leg profile".to_string(),
                    });
                };
                if self.leg >= max_legs {
                    return Err(NegotiationError::TooManyLegs { max_legs });
                }
                self.challenge = Some(challenge);
                self.state = NegotiationState::MoreLegsRequired;
                Ok(NegotiationStep::MoreLegsRequired)
            },
            ResponseBody::Issued(token) => {
                let context = self.complete(token, now)?;
                self.state = NegotiationState::Completed;
                tracing::info!(
                    context_id = %context.context_id(),
                    legs = self.leg,
                    key_kind = ?context.key_kind(),
                    "negotiation completed"
                );
                Ok(NegotiationStep::Completed(context))
            },
        }
    }

    fn complete(
        &mut self,
        token: IssuedToken,
        now: Timestamp,
    ) -> Result<SecurityContext, NegotiationError> {
        if token.algorithm_suite != self.config.algorithm_suite {
            return Err(NegotiationError::AlgorithmMismatch {
                requested: self.config.algorithm_suite,
                advertised: token.algorithm_suite,
            });
        }
        if now > token.token_valid_to {
            return Err(malformed("issued token already expired"));
        }

        let key = self.proof_key(&token)?;

        let mut builder = SecurityContext::builder(
            token.context_id,
            self.config.key_kind,
            key,
            token.token_valid_from,
            token.token_valid_to,
        )
        .claims(token.claims);

        if let Some((from, to)) = token.key_window {
            builder = builder.key_window(from, to);
        }
        if let Some(local_id) = token.local_id {
            builder = builder.local_id(local_id);
        }
        if let Some(generation) = token.key_generation {
            builder = builder.key_generation(generation);
        }
        if let Some(cookie) = token.cookie {
            builder = builder.cookie_blob(cookie);
        }

        Ok(builder.build()?)
    }

    /// Key bytes implied by the token's proof and our entropy mode.
    fn proof_key(&mut self, token: &IssuedToken) -> Result<ProofKey, NegotiationError> {
        match (self.config.key_kind, &token.proof) {
            (KeyKind::Bearer, ProofDescriptor::None) => Ok(ProofKey::none()),
            (KeyKind::Bearer, _) => Err(malformed("proof returned for bearer request")),

            (KeyKind::Asymmetric, ProofDescriptor::PublicKeyBinding(bound)) => {
                let Some(pair) = self.keypair.take() else {
                    return Err(malformed("no ephemeral keypair"));
                };
                if *bound != pair.public_key {
                    return Err(malformed("issuer bound a different public key"));
                }
                Ok(ProofKey::Eager(pair.private_key))
            },
            (KeyKind::Asymmetric, _) => Err(malformed("asymmetric proof must bind our public key")),

            (KeyKind::Symmetric, proof) => match (self.config.entropy_mode, proof) {
                (EntropyMode::ClientOnly, ProofDescriptor::None) => {
                    let Some(entropy) = self.local_entropy.take() else {
                        return Err(malformed("no local entropy"));
                    };
                    Ok(ProofKey::Eager(entropy))
                },
                (EntropyMode::ServerOnly, ProofDescriptor::InlineKey(key)) => {
                    Ok(ProofKey::eager(key.clone()))
                },
                (EntropyMode::Combined, ProofDescriptor::IssuerEntropy(issuer_entropy)) => {
                    let Some(entropy) = self.local_entropy.take() else {
                        return Err(malformed("no local entropy"));
                    };
                    let bits = token.key_size_bits.unwrap_or(self.config.key_size_bits);
                    let key = compute_combined_key(&entropy, issuer_entropy, bits)
                        .map_err(crate::context::ContextError::from)?;
                    Ok(ProofKey::Eager(key))
                },
                (mode, _) => Err(NegotiationError::MalformedResponse {
                    reason: format!("proof does not match {mode:?} entropy"),
                }),
            },
        }
    }
}

fn malformed(reason: &str) -> NegotiationError {
    NegotiationError::MalformedResponse { reason: reason.to_string() }
}
