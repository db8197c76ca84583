//! Security context negotiation.
//!
//! The requester side is split in two: [`Negotiation`] is a sans-IO state
//! machine that builds requests and validates responses, and
//! [`NegotiationEngine`] drives it over a [`NegotiationTransport`] under a
//! deadline budget. The issuer side lives in [`crate::issuer`].

mod engine;
mod error;
mod keypair;
mod message;
mod state;

pub use self::{
    engine::{DEFAULT_NEGOTIATION_BUDGET, NegotiationEngine, NegotiationTransport},
    error::{NegotiationError, TransportError},
    keypair::{EPHEMERAL_SEED_SIZE, Ed25519KeyGenerator, EphemeralKeyGenerator, EphemeralKeyPair},
    message::{
        AlgorithmSuite, CORRELATION_SIZE, Correlation, EntropyMode, IssuedToken,
        NegotiationRequest, NegotiationResponse, ProofDescriptor, ResponseBody,
    },
    state::{
        DEFAULT_KEY_SIZE_BITS, DEFAULT_MAX_LEGS, Negotiation, NegotiationConfig,
        NegotiationProfile, NegotiationState, NegotiationStep,
    },
};
