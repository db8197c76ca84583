//! Negotiation and transport errors.

use std::time::Duration;

use thiserror::Error;

use super::{
    message::{AlgorithmSuite, Correlation},
    state::NegotiationState,
};
use crate::context::ContextError;

/// Failures of the transport carrying negotiation messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the issuer
    #[error("connection failed: {0}")]
    Connection(String),

    /// Issuer side went away
    #[error("transport closed")]
    Closed,

    /// Response could not be decoded
    #[error("transport protocol error: {0}")]
    Protocol(String),
}

/// Reasons a negotiation did not produce a context.
///
/// Negotiation is never retried internally; the caller decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Issuer returned a fault; code and reason are passed through unchanged
    #[error("issuer fault {code}: {reason}")]
    ProtocolFault {
        /// Issuer fault code
        code: String,
        /// Issuer explanation
        reason: String,
    },

    /// Response answers a different request
    #[error("correlation mismatch: expected {expected:?}, received {received:?}")]
    CorrelationMismatch {
        /// Correlation of the outstanding request
        expected: Correlation,
        /// Correlation in the response
        received: Correlation,
    },

    /// Deadline budget exhausted
    #[error("negotiation timed out (budget {budget:?})")]
    TimedOut {
        /// Total budget that was given
        budget: Duration,
    },

    /// Issuer applied a different algorithm suite
    #[error("algorithm mismatch: requested {requested:?}, issuer advertised {advertised:?}")]
    AlgorithmMismatch {
        /// Suite we asked for
        requested: AlgorithmSuite,
        /// Suite the issuer used
        advertised: AlgorithmSuite,
    },

    /// Response is inconsistent with the request
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// What was wrong
        reason: String,
    },

    /// Issuer kept asking for more legs
    #[error("negotiation exceeded {max_legs} legs")]
    TooManyLegs {
        /// Configured limit
        max_legs: u32,
    },

    /// Operation not allowed in the current state
    #[error("invalid state: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state
        state: NegotiationState,
        /// Operation attempted
        operation: &'static str,
    },

    /// Local configuration cannot be negotiated
    #[error("invalid negotiation config: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: &'static str,
    },

    /// Transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Ephemeral keypair could not be generated
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Negotiated values do not form a valid context
    #[error("invalid issued context: {0}")]
    Context(#[from] ContextError),
}

impl NegotiationError {
    /// True if starting a fresh negotiation with adjusted parameters may
    /// succeed.
    ///
    /// Only an algorithm mismatch qualifies: the issuer told us what it
    /// supports. Everything else is a broken exchange or a peer refusal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlgorithmMismatch { .. })
    }
}
