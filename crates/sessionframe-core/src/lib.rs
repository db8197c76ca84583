//! Sessionframe core: negotiated security contexts.
//!
//! This crate establishes a shared secret between two parties through a
//! negotiation exchange, keeps the resulting [`SecurityContext`] in a bounded
//! [`ContextCache`], and can serialize a context into an encrypted cookie so
//! the issuing side does not need to retain per-client state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐  requests/responses  ┌──────────────┐
//! │ NegotiationEngine │<────────────────────>│ SessionIssuer│
//! └─────────┬─────────┘   (transport trait)  └──────┬───────┘
//!           │ SecurityContext                       │ add / cookie
//!           ↓                                       ↓
//!   ┌──────────────┐   ContextReference    ┌──────────────────────┐
//!   │  caller app  │──────────────────────>│ ContextAuthenticator │
//!   └──────────────┘                       └──────────┬───────────┘
//!                                    cache lookup     │   cookie decode
//!                                  ┌──────────────────┴──────────────┐
//!                                  ↓                                 ↓
//!                           ┌──────────────┐              ┌────────────────────┐
//!                           │ ContextCache │              │ ContextCookieCodec │
//!                           └──────────────┘              └────────────────────┘
//! ```
//!
//! Protocol logic is sans-IO: the [`Negotiation`] state machine takes
//! responses and returns requests, and every component reads time and
//! randomness through the [`Environment`] trait. Only
//! [`NegotiationEngine`] awaits anything.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod authenticator;
pub mod cache;
pub mod context;
pub mod cookie;
pub mod env;
pub mod issuer;
pub mod negotiation;
pub mod sim;
pub mod time;

pub use authenticator::{AuthenticationError, AuthorizationEvidence, ContextAuthenticator};
pub use cache::{CacheConfig, ContextCache, EvictionPolicy};
pub use context::{
    CacheError, Claim, ClaimSet, ContextError, ContextId, ContextKey, ContextReference,
    KeyGeneration, KeyKind, KeyProvider, ProofKey, SecurityContext, SecurityContextBuilder,
};
pub use cookie::{
    ContextCookieCodec, CookieError, CookieExpectation, CookieProtector, InvalidCookieReason,
    XChaChaCookieProtector,
};
pub use env::Environment;
pub use issuer::{IssuerConfig, IssuerError, SessionIssuer};
pub use negotiation::{
    AlgorithmSuite, Correlation, Ed25519KeyGenerator, EntropyMode, EphemeralKeyGenerator,
    EphemeralKeyPair, IssuedToken, Negotiation, NegotiationConfig, NegotiationEngine,
    NegotiationError, NegotiationProfile, NegotiationRequest, NegotiationResponse,
    NegotiationState, NegotiationStep, NegotiationTransport, ProofDescriptor, ResponseBody,
    TransportError,
};
pub use sim::{SimEnv, SimInstant};
pub use time::Timestamp;
