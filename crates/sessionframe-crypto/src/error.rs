//! Error types for key derivation and cookie sealing.

use thiserror::Error;

/// Errors from key derivation.
///
/// All variants are programming or configuration errors. None of them are
/// transient, so callers must not retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    /// Requested key is longer than the source key.
    #[error("requested {requested} bytes but source key has only {available}")]
    KeyTooLong {
        /// Requested length in bytes
        requested: usize,
        /// Source key length in bytes
        available: usize,
    },

    /// Both or neither of offset/generation were supplied.
    #[error("exactly one of offset or generation must be set (offset: {offset:?}, generation: {generation:?})")]
    InvalidPosition {
        /// Offset supplied by the caller
        offset: Option<usize>,
        /// Generation supplied by the caller
        generation: Option<u32>,
    },

    /// Length is zero or not a whole number of bytes.
    #[error("invalid derived key length: {length_bits} bits")]
    InvalidLength {
        /// Requested length in bits
        length_bits: u32,
    },

    /// Effective keystream offset exceeds the allowed maximum.
    #[error("derivation offset {offset:?} exceeds maximum {max}")]
    OffsetTooLarge {
        /// Effective offset (None if it overflowed)
        offset: Option<usize>,
        /// Maximum allowed offset
        max: usize,
    },

    /// Nonce was empty.
    #[error("derivation nonce must not be empty")]
    EmptyNonce,
}

/// Errors from opening a sealed cookie.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    /// Sealed blob is shorter than nonce plus tag.
    #[error("sealed cookie too short: {len} bytes")]
    Truncated {
        /// Length of the blob that was presented
        len: usize,
    },

    /// Authentication tag did not verify (wrong key or tampering).
    #[error("cookie authentication failed")]
    AuthenticationFailed,
}
