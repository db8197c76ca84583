//! Proof keys and their kinds.
//!
//! A context's key is either held eagerly or resolved on first use through a
//! [`KeyProvider`]. Lazy resolution happens exactly once: the resolution state
//! sits behind a mutex that is held across the provider call, so concurrent
//! readers wait for the first resolver instead of racing it.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::ContextError;

/// Supported symmetric key sizes in bytes.
pub const SYMMETRIC_KEY_SIZES: [usize; 3] = [16, 24, 32];

/// Kind of proof key bound to a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// Shared secret of 16, 24 or 32 bytes
    Symmetric,
    /// Private component of an ephemeral keypair
    Asymmetric,
    /// No proof key
    Bearer,
}

impl KeyKind {
    /// Wire tag used in cookies.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Symmetric => 1,
            Self::Asymmetric => 2,
            Self::Bearer => 3,
        }
    }

    /// Parse a wire tag. `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Symmetric),
            2 => Some(Self::Asymmetric),
            3 => Some(Self::Bearer),
            _ => None,
        }
    }

    /// Check a key length against this kind.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` if symmetric and not 16/24/32 bytes, bearer and
    ///   non-empty, or asymmetric and empty
    pub fn check_len(self, len: usize) -> Result<(), ContextError> {
        let ok = match self {
            Self::Symmetric => SYMMETRIC_KEY_SIZES.contains(&len),
            Self::Asymmetric => len > 0,
            Self::Bearer => len == 0,
        };
        if ok { Ok(()) } else { Err(ContextError::InvalidKeyLength { kind: self, len }) }
    }
}

/// Source of lazily resolved key material.
pub trait KeyProvider: Send + Sync {
    /// Resolve `handle` to key bytes.
    ///
    /// # Errors
    ///
    /// - `KeyResolution` if the handle is unknown or the backing store fails
    fn resolve(&self, handle: &str) -> Result<Zeroizing<Vec<u8>>, ContextError>;
}

enum Resolution {
    Unresolved(String),
    Resolved(Zeroizing<Vec<u8>>),
}

/// Provider-backed key, resolved on first access.
pub struct LazyKey {
    provider: Arc<dyn KeyProvider>,
    state: Mutex<Resolution>,
}

impl LazyKey {
    fn resolve(&self, kind: KeyKind) -> Result<Zeroizing<Vec<u8>>, ContextError> {
        let mut state = self.state.lock();
        let bytes = match &*state {
            Resolution::Resolved(bytes) => return Ok(bytes.clone()),
            Resolution::Unresolved(handle) => self.provider.resolve(handle)?,
        };
        kind.check_len(bytes.len())?;
        *state = Resolution::Resolved(bytes.clone());
        Ok(bytes)
    }

    fn is_resolved(&self) -> bool {
        matches!(*self.state.lock(), Resolution::Resolved(_))
    }
}

/// Key material bound to a context.
#[derive(Clone)]
pub enum ProofKey {
    /// Key bytes held directly
    Eager(Zeroizing<Vec<u8>>),
    /// Key resolved through a [`KeyProvider`] on first use
    Lazy(Arc<LazyKey>),
}

impl ProofKey {
    /// Key held directly.
    pub fn eager(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Eager(Zeroizing::new(bytes.into()))
    }

    /// Empty key for bearer contexts.
    pub fn none() -> Self {
        Self::Eager(Zeroizing::new(Vec::new()))
    }

    /// Key resolved from `provider` on first use.
    pub fn lazy(handle: impl Into<String>, provider: Arc<dyn KeyProvider>) -> Self {
        Self::Lazy(Arc::new(LazyKey {
            provider,
            state: Mutex::new(Resolution::Unresolved(handle.into())),
        }))
    }

    /// True if key bytes are available without calling a provider.
    pub fn is_resolved(&self) -> bool {
        match self {
            Self::Eager(_) => true,
            Self::Lazy(lazy) => lazy.is_resolved(),
        }
    }

    /// Key bytes, resolving once if lazy. The length is checked against
    /// `kind` on resolution.
    pub(crate) fn resolve(&self, kind: KeyKind) -> Result<Zeroizing<Vec<u8>>, ContextError> {
        match self {
            Self::Eager(bytes) => Ok(bytes.clone()),
            Self::Lazy(lazy) => lazy.resolve(kind),
        }
    }
}

impl PartialEq for ProofKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Eager(a), Self::Eager(b)) => a == b,
            (Self::Lazy(a), Self::Lazy(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for ProofKey {}

impl fmt::Debug for ProofKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eager(bytes) => write!(f, "Eager(<{} bytes redacted>)", bytes.len()),
            Self::Lazy(lazy) => {
                write!(f, "Lazy({})", if lazy.is_resolved() { "resolved" } else { "unresolved" })
            },
        }
    }
}
