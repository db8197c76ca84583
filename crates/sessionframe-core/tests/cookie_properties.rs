//! Property-based tests for context cookies
//!
//! These tests verify the cookie invariants end to end:
//!
//! 1. **Round trip**: decoding an encoded context yields the same fields and
//!    a context in cookie mode
//! 2. **Integrity**: any single-byte change to the blob is rejected as an
//!    invalid cookie, never as a different context
//! 3. **Binding**: a cookie only decodes for the identity it was issued to
//! 4. **Expiry boundary**: the authenticator accepts a cookie at its token
//!    expiry and rejects it one second later

mod common;

use std::sync::Arc;

use common::{codec, ts};
use proptest::prelude::*;
use sessionframe_core::{
    AuthenticationError, Claim, ClaimSet, ContextAuthenticator, ContextCache, ContextId,
    ContextReference, CookieError, CookieExpectation, InvalidCookieReason, KeyGeneration, KeyKind,
    ProofKey, SecurityContext, SimEnv,
};

fn expectation(context: &SecurityContext) -> CookieExpectation {
    CookieExpectation {
        context_id: context.context_id().clone(),
        key_generation: context.key_generation().cloned(),
        local_id: context.local_id().map(str::to_string),
    }
}

prop_compose! {
    fn arb_claims()(
        sets in prop::collection::vec(
            ("[a-z]{1,12}", prop::collection::vec(("[a-z]{1,8}", "[ -~]{0,24}"), 0..4)),
            0..3,
        ),
    ) -> Vec<ClaimSet> {
        sets.into_iter()
            .map(|(issuer, claims)| {
                ClaimSet::new(
                    issuer,
                    claims.into_iter().map(|(kind, value)| Claim::new(kind, value)).collect(),
                )
            })
            .collect()
    }
}

prop_compose! {
    fn arb_context()(
        id in "[a-z0-9:-]{1,40}",
        generation in prop::option::of("[a-z0-9-]{1,20}"),
        local_id in prop::option::of("[a-z0-9]{1,16}"),
        key_len in prop::sample::select(vec![16usize, 24, 32]),
        key_byte in any::<u8>(),
        token_from in 0i64..1_000_000,
        token_len in 1i64..1_000_000,
        key_offset in 0i64..1_000,
        claims in arb_claims(),
    ) -> SecurityContext {
        let token_to = token_from + token_len;
        let key_from = (token_from + key_offset).min(token_to);
        let mut builder = SecurityContext::builder(
            ContextId::new(id),
            KeyKind::Symmetric,
            ProofKey::eager(vec![key_byte; key_len]),
            ts(token_from),
            ts(token_to),
        )
        .key_window(ts(key_from), ts(token_to))
        .claims(claims);
        if let Some(generation) = generation {
            builder = builder.key_generation(KeyGeneration::new(generation));
        }
        if let Some(local_id) = local_id {
            builder = builder.local_id(local_id);
        }
        builder.build().expect("generated context should be valid")
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_cookie_round_trip(context in arb_context(), seed in any::<u64>()) {
        let codec = codec(&SimEnv::with_seed(seed));
        let blob = codec.encode(&context).expect("encode should succeed");
        let decoded = codec.decode(&blob, &expectation(&context)).expect("decode should succeed");

        prop_assert!(decoded.is_cookie_mode());
        prop_assert!(!context.is_cookie_mode());
        prop_assert_eq!(decoded.cookie_blob(), Some(blob.as_slice()));
        prop_assert_eq!(decoded.context_id(), context.context_id());
        prop_assert_eq!(decoded.key_generation(), context.key_generation());
        prop_assert_eq!(decoded.local_id(), context.local_id());
        prop_assert_eq!(decoded.key_kind(), context.key_kind());
        prop_assert_eq!(decoded.token_valid_from(), context.token_valid_from());
        prop_assert_eq!(decoded.token_valid_to(), context.token_valid_to());
        prop_assert_eq!(decoded.key_valid_from(), context.key_valid_from());
        prop_assert_eq!(decoded.key_valid_to(), context.key_valid_to());
        prop_assert_eq!(decoded.claims(), context.claims());
        let decoded_key = decoded.key().expect("eager key");
        let context_key = context.key().expect("eager key");
        prop_assert_eq!(
            decoded_key.as_slice(),
            context_key.as_slice()
        );
    }

    #[test]
    fn prop_single_byte_tamper_rejected(
        context in arb_context(),
        position in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let codec = codec(&SimEnv::with_seed(7));
        let mut blob = codec.encode(&context).expect("encode should succeed");
        let index = position.index(blob.len());
        blob[index] ^= flip;

        let result = codec.decode(&blob, &expectation(&context));
        prop_assert!(
            matches!(result, Err(CookieError::InvalidCookie(InvalidCookieReason::Tampered))),
            "tampered byte {} accepted or misclassified: {:?}",
            index,
            result
        );
    }

    #[test]
    fn prop_truncated_cookie_rejected(context in arb_context(), cut in any::<prop::sample::Index>()) {
        let codec = codec(&SimEnv::with_seed(8));
        let blob = codec.encode(&context).expect("encode should succeed");
        let truncated = &blob[..cut.index(blob.len())];

        let result = codec.decode(truncated, &expectation(&context));
        prop_assert!(matches!(result, Err(CookieError::InvalidCookie(_))));
    }
}

/// INVARIANT: A cookie decodes only for the context id and key generation it
/// was issued under.
#[test]
fn cookie_bound_to_identity() {
    let codec = codec(&SimEnv::with_seed(3));
    let context = common::symmetric_context("urn:uuid:bound", 100, 200);
    let blob = codec.encode(&context).expect("encode should succeed");

    let mut wrong_id = expectation(&context);
    wrong_id.context_id = ContextId::new("urn:uuid:other");
    assert!(matches!(
        codec.decode(&blob, &wrong_id),
        Err(CookieError::InvalidCookie(InvalidCookieReason::ContextIdMismatch))
    ));

    let mut wrong_generation = expectation(&context);
    wrong_generation.key_generation = Some(KeyGeneration::new("urn:uuid:bound#gen-2"));
    assert!(matches!(
        codec.decode(&blob, &wrong_generation),
        Err(CookieError::InvalidCookie(InvalidCookieReason::KeyGenerationMismatch))
    ));
}

/// INVARIANT: A cookie sealed under one key does not open under another.
#[test]
fn cookie_from_other_issuer_rejected() {
    let env = SimEnv::with_seed(4);
    let context = common::symmetric_context("urn:uuid:foreign", 100, 200);
    let foreign = sessionframe_core::ContextCookieCodec::new(Arc::new(
        sessionframe_core::XChaChaCookieProtector::new([0x01; 32], env.clone()),
    ));
    let blob = foreign.encode(&context).expect("encode should succeed");

    let err = codec(&env).decode(&blob, &expectation(&context)).expect_err("foreign cookie");
    assert!(err.is_security_rejection());
}

/// INVARIANT: Authentication accepts a cookie up to and including its token
/// expiry and rejects it one second after.
#[test]
fn cookie_expiry_boundary() {
    let env = SimEnv::with_seed(5);
    let codec = codec(&env);
    let context = common::symmetric_context("urn:uuid:expiring", 100, 200);
    let blob = codec.encode(&context).expect("encode should succeed");

    let authenticator = ContextAuthenticator::new(Arc::new(ContextCache::default()), Some(codec));
    let reference = ContextReference {
        context_id: context.context_id().clone(),
        key_generation: context.key_generation().cloned(),
        local_id: None,
        cookie: Some(blob),
    };

    authenticator.authenticate(&reference, ts(199)).expect("inside window");
    let evidence = authenticator.authenticate(&reference, ts(200)).expect("at expiry");
    assert_eq!(&evidence.context_id, context.context_id());
    assert_eq!(evidence.claims, *context.claims());

    let err = authenticator.authenticate(&reference, ts(201)).expect_err("past expiry");
    assert!(matches!(err, AuthenticationError::ContextExpired { .. }));

    let err = authenticator.authenticate(&reference, ts(99)).expect_err("before start");
    assert!(matches!(err, AuthenticationError::ContextExpired { .. }));
}

/// INVARIANT: Without a codec, a presented cookie is refused instead of being
/// looked up in the cache.
#[test]
fn cookie_refused_without_codec() {
    let env = SimEnv::with_seed(6);
    let context = common::symmetric_context("urn:uuid:nocodec", 100, 200);
    let blob = codec(&env).encode(&context).expect("encode should succeed");

    let cache = Arc::new(ContextCache::default());
    cache.add(context.clone()).expect("cache has room");
    let authenticator = ContextAuthenticator::new(cache, None);

    let mut reference = ContextReference::for_context(&context);
    reference.cookie = Some(blob);
    let err = authenticator.authenticate(&reference, ts(150)).expect_err("cookies disabled");
    assert!(matches!(err, AuthenticationError::CookiesNotAccepted));
    assert_eq!(err.public_message(), sessionframe_core::authenticator::PUBLIC_FAILURE_MESSAGE);
}
