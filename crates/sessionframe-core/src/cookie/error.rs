//! Cookie encode/decode errors.

use thiserror::Error;

use crate::context::ContextError;

/// Why a cookie was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidCookieReason {
    /// Authenticated decryption failed
    #[error("cookie failed integrity check")]
    Tampered,

    /// Blob exceeds the size limit
    #[error("cookie of {len} bytes exceeds limit of {max}")]
    TooLarge {
        /// Blob length
        len: usize,
        /// Limit
        max: usize,
    },

    /// Input ended inside a field
    #[error("cookie truncated in {field}")]
    Truncated {
        /// Field being read
        field: &'static str,
    },

    /// Record tag not defined by the format
    #[error("unknown cookie field tag {tag}")]
    UnknownField {
        /// Offending tag
        tag: u8,
    },

    /// Record tag repeated or out of order
    #[error("cookie field tag {tag} out of order")]
    UnorderedField {
        /// Offending tag
        tag: u8,
    },

    /// Required record absent
    #[error("cookie missing {field}")]
    MissingField {
        /// Missing field
        field: &'static str,
    },

    /// Record present but its value does not parse
    #[error("cookie has malformed {field}")]
    MalformedField {
        /// Malformed field
        field: &'static str,
    },

    /// Cookie belongs to a different context
    #[error("cookie context id does not match")]
    ContextIdMismatch,

    /// Cookie was issued for a different local identifier
    #[error("cookie local id does not match")]
    LocalIdMismatch,

    /// Cookie carries a different key generation
    #[error("cookie key generation does not match")]
    KeyGenerationMismatch,

    /// Fields parsed but do not form a valid context
    #[error("cookie holds an invalid context: {0}")]
    InvalidContext(ContextError),
}

/// Errors from [`ContextCookieCodec`](super::ContextCookieCodec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// Cookie rejected
    #[error("invalid cookie: {0}")]
    InvalidCookie(#[from] InvalidCookieReason),

    /// Format version not understood
    #[error("unsupported cookie version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the cookie
        found: u32,
        /// Version this codec writes
        expected: u32,
    },

    /// Context could not be encoded
    #[error("cookie encoding failed: {0}")]
    Encode(String),
}

impl CookieError {
    /// True if the error means a presented cookie must not be trusted.
    ///
    /// Encoding failures are local faults, not rejections.
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, Self::InvalidCookie(_) | Self::UnsupportedVersion { .. })
    }
}
