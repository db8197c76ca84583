//! Fuzz target for requester-side negotiation response handling
//!
//! # Strategy
//!
//! - Drive a `Negotiation` through a sequence of arbitrary responses, each
//!   either answering the outstanding request or carrying a forged
//!   correlation
//! - Issued tokens get arbitrary proofs, suites, windows and key sizes
//! - Interleave out-of-order `next_request` calls
//!
//! # Invariants
//!
//! - NEVER panic on any response
//! - A forged correlation never completes the negotiation
//! - Once completed or faulted, the state never changes again
//! - A completed context satisfies the window nesting rules

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sessionframe_core::{
    AlgorithmSuite, ContextId, Correlation, EntropyMode, IssuedToken, KeyGeneration, KeyKind,
    Negotiation, NegotiationConfig, NegotiationProfile, NegotiationResponse, NegotiationState,
    NegotiationStep, ProofDescriptor, ResponseBody, SimEnv, Timestamp,
};

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    key_kind: u8,
    entropy_mode: u8,
    max_legs: Option<u8>,
    steps: Vec<Step>,
}

#[derive(Debug, Arbitrary)]
enum Step {
    Respond { forged: Option<[u8; 16]>, body: Body },
    NextRequest,
}

#[derive(Debug, Arbitrary)]
enum Body {
    Fault { code: String, reason: String },
    Continue { challenge: Vec<u8> },
    Issued(Token),
}

#[derive(Debug, Arbitrary)]
struct Token {
    proof: Proof,
    suite: u8,
    key_size_bits: Option<u32>,
    token_from: i32,
    token_len: i32,
    key_window: Option<(i32, i32)>,
    generation: Option<String>,
}

#[derive(Debug, Arbitrary)]
enum Proof {
    None,
    IssuerEntropy(Vec<u8>),
    InlineKey(Vec<u8>),
    PublicKeyBinding(Vec<u8>),
}

fn suite(value: u8) -> AlgorithmSuite {
    match value % 3 {
        0 => AlgorithmSuite::Basic128,
        1 => AlgorithmSuite::Basic192,
        _ => AlgorithmSuite::Basic256,
    }
}

fn token(token: Token) -> IssuedToken {
    let from = Timestamp::from_unix_secs(i64::from(token.token_from));
    let to = Timestamp::from_unix_secs(i64::from(token.token_from) + i64::from(token.token_len));
    IssuedToken {
        context_id: ContextId::new("urn:uuid:fuzz"),
        local_id: None,
        key_generation: token.generation.map(KeyGeneration::new),
        key_size_bits: token.key_size_bits,
        proof: match token.proof {
            Proof::None => ProofDescriptor::None,
            Proof::IssuerEntropy(bytes) => ProofDescriptor::IssuerEntropy(bytes),
            Proof::InlineKey(bytes) => ProofDescriptor::InlineKey(bytes),
            Proof::PublicKeyBinding(bytes) => ProofDescriptor::PublicKeyBinding(bytes),
        },
        algorithm_suite: suite(token.suite),
        token_valid_from: from,
        token_valid_to: to,
        key_window: token.key_window.map(|(a, b)| {
            (Timestamp::from_unix_secs(i64::from(a)), Timestamp::from_unix_secs(i64::from(b)))
        }),
        claims: Vec::new(),
        cookie: None,
    }
}

fuzz_target!(|scenario: Scenario| {
    let config = NegotiationConfig {
        key_kind: match scenario.key_kind % 3 {
            0 => KeyKind::Symmetric,
            1 => KeyKind::Asymmetric,
            _ => KeyKind::Bearer,
        },
        entropy_mode: match scenario.entropy_mode % 3 {
            0 => EntropyMode::ClientOnly,
            1 => EntropyMode::ServerOnly,
            _ => EntropyMode::Combined,
        },
        profile: scenario.max_legs.map_or(NegotiationProfile::Default, |max_legs| {
            NegotiationProfile::MultiLeg { max_legs: u32::from(max_legs % 8) }
        }),
        ..NegotiationConfig::default()
    };

    let mut negotiation = Negotiation::new(config, SimEnv::with_seed(scenario.seed));
    let Ok(mut outstanding) = negotiation.start().map(|request| request.correlation) else {
        assert_eq!(negotiation.state(), NegotiationState::Faulted);
        return;
    };
    let now = Timestamp::from_unix_secs(0);

    for step in scenario.steps.into_iter().take(16) {
        let before = negotiation.state();
        match step {
            Step::NextRequest => {
                if let Ok(request) = negotiation.next_request() {
                    assert_eq!(before, NegotiationState::MoreLegsRequired);
                    outstanding = request.correlation;
                }
            }
            Step::Respond { forged, body } => {
                let correlation = forged.map_or(outstanding, Correlation);
                let body = match body {
                    Body::Fault { code, reason } => ResponseBody::Fault { code, reason },
                    Body::Continue { challenge } => ResponseBody::Continue { challenge },
                    Body::Issued(issued) => ResponseBody::Issued(token(issued)),
                };
                let result = negotiation.handle_response(NegotiationResponse { correlation, body }, now);

                if correlation != outstanding {
                    assert!(!matches!(result, Ok(NegotiationStep::Completed(_))));
                }
                if let Ok(NegotiationStep::Completed(context)) = &result {
                    assert_eq!(negotiation.state(), NegotiationState::Completed);
                    assert!(context.token_valid_from() <= context.key_valid_from());
                    assert!(context.key_valid_from() <= context.key_valid_to());
                    assert!(context.key_valid_to() <= context.token_valid_to());
                }
            }
        }

        if matches!(before, NegotiationState::Completed | NegotiationState::Faulted) {
            assert_eq!(negotiation.state(), before);
        }
    }
});
