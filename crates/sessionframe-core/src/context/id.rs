//! Context and key-generation identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::env::Environment;

/// Stable identifier of a security context across renewals.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(String);

/// Identifier of one key generation within a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyGeneration(String);

/// Cache index: context id plus optional key generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    /// Context identifier
    pub context_id: ContextId,
    /// Key generation, `None` when the context has no generation scheme
    pub key_generation: Option<KeyGeneration>,
}

fn random_urn<E: Environment>(env: &E) -> String {
    let mut bytes = [0u8; 16];
    env.random_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().urn().to_string()
}

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Wrap an existing identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Fresh `urn:uuid:` identifier from environment randomness.
            pub fn generate<E: Environment>(env: &E) -> Self {
                Self(random_urn(env))
            }

            /// Identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_id!(ContextId);
string_id!(KeyGeneration);
