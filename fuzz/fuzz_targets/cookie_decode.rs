//! Fuzz target for context cookie decoding
//!
//! # Strategy
//!
//! - Raw plaintext: arbitrary bytes handed straight to the field parser
//!   through a pass-through protector
//! - Structured records: a version header plus arbitrary (tag, value)
//!   records, so the parser gets past framing and into field validation
//! - Mutated cookies: a valid sealed cookie with bytes flipped, truncated or
//!   extended
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A decoded context always carries the expected context id and key
//!   generation, and satisfies the window nesting rules
//! - Any modification of a sealed cookie is rejected as a security failure

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sessionframe_core::{
    cookie::format::COOKIE_FORMAT_VERSION, ContextCookieCodec, ContextId, CookieError,
    CookieExpectation, CookieProtector, KeyGeneration, KeyKind, ProofKey, SecurityContext, SimEnv,
    Timestamp, XChaChaCookieProtector,
};
use sessionframe_crypto::Zeroizing;

#[derive(Debug, Arbitrary)]
enum CookieInput {
    RawPlaintext { bytes: Vec<u8> },
    Records { version: Option<u32>, records: Vec<(u8, Vec<u8>)> },
    Mutated { seed: u64, mutation: Mutation },
}

#[derive(Debug, Arbitrary)]
enum Mutation {
    Flip { index: usize, mask: u8 },
    Truncate { len: usize },
    Extend { tail: Vec<u8> },
}

/// Hands plaintext to the parser unchanged.
struct PassThrough;

impl CookieProtector for PassThrough {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, CookieError> {
        Ok(plaintext.to_vec())
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CookieError> {
        Ok(Zeroizing::new(blob.to_vec()))
    }
}

fn expectation() -> CookieExpectation {
    CookieExpectation {
        context_id: ContextId::new("urn:uuid:fuzz"),
        key_generation: Some(KeyGeneration::new("urn:uuid:fuzz-gen")),
        local_id: None,
    }
}

fn check(result: Result<SecurityContext, CookieError>, expected: &CookieExpectation) {
    if let Ok(context) = result {
        assert_eq!(context.context_id(), &expected.context_id);
        assert_eq!(context.key_generation(), expected.key_generation.as_ref());
        assert!(context.token_valid_from() <= context.key_valid_from());
        assert!(context.key_valid_from() <= context.key_valid_to());
        assert!(context.key_valid_to() <= context.token_valid_to());
        assert!(context.is_cookie_mode());
    }
}

fuzz_target!(|input: CookieInput| {
    let expected = expectation();

    match input {
        CookieInput::RawPlaintext { bytes } => {
            let codec = ContextCookieCodec::new(Arc::new(PassThrough));
            check(codec.decode(&bytes, &expected), &expected);
        }

        CookieInput::Records { version, records } => {
            let mut bytes = version.unwrap_or(COOKIE_FORMAT_VERSION).to_be_bytes().to_vec();
            for (tag, value) in records.iter().take(16) {
                bytes.push(*tag);
                bytes.extend_from_slice(&(value.len() as u32).to_be_bytes());
                bytes.extend_from_slice(value);
            }
            let codec = ContextCookieCodec::new(Arc::new(PassThrough));
            check(codec.decode(&bytes, &expected), &expected);
        }

        CookieInput::Mutated { seed, mutation } => {
            let codec = ContextCookieCodec::new(Arc::new(XChaChaCookieProtector::new(
                [0x77; 32],
                SimEnv::with_seed(seed),
            )));
            let context = SecurityContext::builder(
                expected.context_id.clone(),
                KeyKind::Symmetric,
                ProofKey::eager(vec![0x11; 32]),
                Timestamp::from_unix_secs(1_000),
                Timestamp::from_unix_secs(2_000),
            )
            .key_generation(KeyGeneration::new("urn:uuid:fuzz-gen"))
            .build()
            .expect("fixture context is valid");
            let mut blob = codec.encode(&context).expect("fixture encodes");
            let original = blob.clone();

            match mutation {
                Mutation::Flip { index, mask } => {
                    let index = index % blob.len();
                    blob[index] ^= mask;
                }
                Mutation::Truncate { len } => blob.truncate(len % blob.len()),
                Mutation::Extend { tail } => blob.extend_from_slice(&tail),
            }

            let result = codec.decode(&blob, &expected);
            if blob == original {
                assert!(result.is_ok(), "unmodified cookie rejected");
            } else {
                let err = result.expect_err("modified cookie accepted");
                assert!(err.is_security_rejection());
            }
        }
    }
});
