//! Sessionframe Cryptographic Primitives
//!
//! Cryptographic building blocks for Sessionframe. Pure functions with
//! deterministic outputs. Callers provide random bytes (nonces, entropy) so
//! every operation can be tested deterministically.
//!
//! # Key Hierarchy
//!
//! A negotiated security context owns a single session key. Individual
//! message-protection operations never use that key directly; they use
//! subkeys derived from it with P_SHA1.
//!
//! ```text
//! Requestor entropy ──┐
//!                     ├─ P_SHA1 (combined mode) → Session Key
//! Issuer entropy ─────┘                              │
//!                                                    ▼
//!                       P_SHA1(label || nonce, position) → Derived Keys
//! ```
//!
//! Contexts that the issuer does not want to keep in memory are sealed into
//! an opaque cookie with XChaCha20-Poly1305 under a process-wide cookie key
//! that is supplied (and rotated) from outside this crate.
//!
//! # Security
//!
//! - Derivation is deterministic: the same (key, label, nonce, position,
//!   length) always yields the same bytes.
//! - Derived key length never exceeds the source key length.
//! - Intermediate keystream buffers are zeroized on drop.
//! - Cookie sealing is authenticated: any modification fails to open.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cookie_seal;
mod derived_key;
mod error;
mod psha1;

pub use cookie_seal::{COOKIE_KEY_SIZE, COOKIE_NONCE_SIZE, open_cookie, seal_cookie};
pub use derived_key::{
    DEFAULT_DERIVED_KEY_LENGTH, DEFAULT_NONCE_SIZE, DerivedKey, DerivedKeyParams,
    DerivedKeyParamsBuilder, KeyPosition,
};
pub use error::{DerivationError, SealError};
pub use psha1::{
    COMBINED_KEY_LABEL, DEFAULT_LABEL, MAX_DERIVATION_OFFSET, compute_combined_key, derive,
};
pub use zeroize::Zeroizing;
