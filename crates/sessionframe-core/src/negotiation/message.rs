//! Negotiation messages.
//!
//! These are the logical contents of the request/response exchange. How they
//! are put on the wire is up to the transport; the types derive `serde` so a
//! transport can use any self-describing encoding (the fuzz targets use
//! CBOR).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    context::{ClaimSet, ContextId, KeyGeneration, KeyKind},
    env::Environment,
    time::Timestamp,
};

/// Size of a correlation identifier.
pub const CORRELATION_SIZE: usize = 16;

/// Links a response to the request leg it answers. Fresh for every leg.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Correlation(pub [u8; CORRELATION_SIZE]);

impl Correlation {
    /// Random correlation from the environment.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let mut bytes = [0u8; CORRELATION_SIZE];
        env.random_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Correlation(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Symmetric algorithm suite requested for the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmSuite {
    /// 128-bit minimum key size
    Basic128,
    /// 192-bit minimum key size
    Basic192,
    /// 256-bit keys
    Basic256,
}

impl AlgorithmSuite {
    /// Key size used when the requester does not choose one.
    pub fn default_key_size_bits(self) -> u32 {
        match self {
            Self::Basic128 => 128,
            Self::Basic192 => 192,
            Self::Basic256 => 256,
        }
    }

    /// True if a symmetric key of `bits` may be used with this suite.
    pub fn supports_key_size(self, bits: u32) -> bool {
        matches!(bits, 128 | 192 | 256) && bits >= self.default_key_size_bits()
    }
}

/// Which party contributes key material for a symmetric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntropyMode {
    /// Requester entropy becomes the key
    ClientOnly,
    /// Issuer generates the key and returns it
    ServerOnly,
    /// Key is derived from both parties' entropy
    Combined,
}

/// One request leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationRequest {
    /// Fresh identifier the response must echo
    pub correlation: Correlation,
    /// Leg number, starting at 1
    pub leg: u32,
    /// Requested proof key kind
    pub key_type: KeyKind,
    /// Requested key size in bits
    pub key_size_bits: u32,
    /// How symmetric key material is produced
    pub entropy_mode: EntropyMode,
    /// Requester entropy (symmetric, client-only or combined)
    pub entropy: Option<Vec<u8>>,
    /// Requester public key (asymmetric)
    pub public_key: Option<Vec<u8>>,
    /// Intended audience of the context
    pub audience: Option<String>,
    /// Requested algorithm suite
    pub algorithm_suite: AlgorithmSuite,
    /// Challenge echoed from the previous leg
    pub continuation: Option<Vec<u8>>,
}

/// Issuer's answer to one leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationResponse {
    /// Correlation of the request being answered
    pub correlation: Correlation,
    /// Outcome
    pub body: ResponseBody,
}

impl NegotiationResponse {
    /// Fault answer to `correlation`.
    pub fn fault(
        correlation: Correlation,
        code: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self { correlation, body: ResponseBody::Fault { code: code.into(), reason: reason.into() } }
    }
}

/// Outcome carried by a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Negotiation finished; token issued
    Issued(IssuedToken),
    /// Another leg is required; the challenge goes into the next request
    Continue {
        /// Opaque challenge to echo
        challenge: Vec<u8>,
    },
    /// Issuer rejected the request
    Fault {
        /// Issuer fault code
        code: String,
        /// Issuer explanation
        reason: String,
    },
}

/// How the issuer proves or conveys the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofDescriptor {
    /// No proof (client-only entropy, or bearer)
    None,
    /// Issuer entropy for combined key computation
    IssuerEntropy(Vec<u8>),
    /// Issuer-generated key
    InlineKey(Vec<u8>),
    /// Echo of the requester's public key
    PublicKeyBinding(Vec<u8>),
}

impl fmt::Debug for ProofDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::IssuerEntropy(bytes) => write!(f, "IssuerEntropy(<{} bytes>)", bytes.len()),
            Self::InlineKey(bytes) => write!(f, "InlineKey(<{} bytes redacted>)", bytes.len()),
            Self::PublicKeyBinding(bytes) => write!(f, "PublicKeyBinding(<{} bytes>)", bytes.len()),
        }
    }
}

/// Token issued at the end of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Context identifier
    pub context_id: ContextId,
    /// Issuer-local identifier
    pub local_id: Option<String>,
    /// Key generation
    pub key_generation: Option<KeyGeneration>,
    /// Key size, if different from the requested one
    pub key_size_bits: Option<u32>,
    /// Proof of key possession
    pub proof: ProofDescriptor,
    /// Algorithm suite the issuer applied
    pub algorithm_suite: AlgorithmSuite,
    /// Token effective time
    pub token_valid_from: Timestamp,
    /// Token expiry time
    pub token_valid_to: Timestamp,
    /// Key window, defaults to the token window
    pub key_window: Option<(Timestamp, Timestamp)>,
    /// Claims attached by the issuer
    pub claims: Vec<ClaimSet>,
    /// Cookie, when the issuer keeps no state
    pub cookie: Option<Vec<u8>>,
}
