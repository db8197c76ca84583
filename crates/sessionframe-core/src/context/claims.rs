//! Authorization evidence attached to a context at negotiation time.
//!
//! Claims are carried verbatim: nothing in this crate interprets them.

use serde::{Deserialize, Serialize};

/// One identity or authorization assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type URI or name
    pub claim_type: String,
    /// Claim value
    pub value: String,
}

/// Claims asserted by one issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Party that asserted the claims
    pub issuer: String,
    /// Assertions
    pub claims: Vec<Claim>,
}

impl Claim {
    /// Create a claim.
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self { claim_type: claim_type.into(), value: value.into() }
    }
}

impl ClaimSet {
    /// Create a claim set.
    pub fn new(issuer: impl Into<String>, claims: Vec<Claim>) -> Self {
        Self { issuer: issuer.into(), claims }
    }
}
