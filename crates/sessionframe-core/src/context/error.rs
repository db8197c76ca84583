//! Errors for security context construction and caching.

use sessionframe_crypto::DerivationError;
use thiserror::Error;

use super::key::KeyKind;

/// Errors raised while building, resolving or deriving from a context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// Validity windows are not nested (`token_from <= key_from <= key_to <=
    /// token_to`)
    #[error("invalid lifetime: {reason}")]
    InvalidLifetime {
        /// Which ordering constraint failed
        reason: &'static str,
    },

    /// Key length does not match the key kind
    #[error("invalid key length {len} for {kind:?} key")]
    InvalidKeyLength {
        /// Kind of the key
        kind: KeyKind,
        /// Length that was supplied
        len: usize,
    },

    /// A lazily provided key could not be resolved
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// Derived key request failed
    #[error("key derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}

/// Errors from [`ContextCache`](crate::cache::ContextCache) insertion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Cache is at capacity and the eviction policy rejects new entries
    #[error("context cache full (capacity {capacity})")]
    CacheFull {
        /// Configured capacity
        capacity: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ContextError::InvalidKeyLength { kind: KeyKind::Symmetric, len: 7 };
        assert_eq!(err.to_string(), "invalid key length 7 for Symmetric key");

        let err = CacheError::CacheFull { capacity: 3 };
        assert_eq!(err.to_string(), "context cache full (capacity 3)");
    }

    #[test]
    fn derivation_errors_convert() {
        let err: ContextError = DerivationError::EmptyNonce.into();
        assert!(matches!(err, ContextError::Derivation(DerivationError::EmptyNonce)));
    }
}
