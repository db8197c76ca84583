//! Node error types.

use sessionframe_core::{AuthenticationError, CookieError, IssuerError, NegotiationError};
use sessionframe_crypto::DerivationError;
use thiserror::Error;

/// Errors surfaced by the node and the operator CLI.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Invalid configuration or command-line input.
    ///
    /// Fatal; fix the input and retry.
    #[error("configuration error: {0}")]
    Config(String),

    /// Issuer could not be set up or refused an operation.
    #[error("issuer error: {0}")]
    Issuer(#[from] IssuerError),

    /// Negotiation did not produce a context.
    ///
    /// Use [`NegotiationError::is_recoverable`] to decide whether a retry
    /// with adjusted parameters makes sense.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Presented context was rejected.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    /// Cookie could not be produced or was rejected.
    #[error("cookie error: {0}")]
    Cookie(#[from] CookieError),

    /// Key derivation request was invalid.
    #[error("derivation error: {0}")]
    Derivation(#[from] DerivationError),
}
