//! End-to-end negotiation tests: engine, issuer and authenticator together.
//!
//! These tests verify critical invariants:
//! - Both sides hold the same proof key after a successful negotiation
//! - Every entropy mode and key kind produces a usable context
//! - Multi-leg negotiations echo the issuer's challenge and stay sequential
//! - Responses for another request are rejected and fault the negotiation
//! - The overall budget shrinks across legs and bounds the whole exchange

mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::{InProcessTransport, TamperingTransport, codec, issuer};
use sessionframe_core::{
    AlgorithmSuite, ContextAuthenticator, ContextReference, Correlation, EntropyMode, Environment,
    IssuerConfig, KeyKind, NegotiationConfig, NegotiationEngine, NegotiationError,
    NegotiationProfile, NegotiationRequest, NegotiationResponse, NegotiationTransport,
    ResponseBody, SimEnv, TransportError,
};

const BUDGET: Duration = Duration::from_secs(60);

fn engine(
    env: &SimEnv,
    issuer_config: IssuerConfig,
    config: NegotiationConfig,
) -> NegotiationEngine<SimEnv, InProcessTransport> {
    let transport = InProcessTransport::new(issuer(env, issuer_config), env.clone());
    NegotiationEngine::new(env.clone(), transport, config)
}

/// INVARIANT: After a combined-entropy negotiation both sides derive the
/// same key, and the context authenticates against the issuer's cache.
#[tokio::test(start_paused = true)]
async fn combined_negotiation_shares_key() {
    let env = SimEnv::with_seed(21);
    let engine = engine(&env, IssuerConfig::default(), NegotiationConfig::default());

    let context = engine.negotiate(BUDGET).await.expect("negotiation should succeed");
    let issuer = &engine.transport().issuer;
    let cached = issuer
        .cache()
        .get(context.context_id(), context.key_generation(), env.wall_clock())
        .expect("issuer caches the context");

    assert_eq!(context.key_kind(), KeyKind::Symmetric);
    assert_eq!(context.key().expect("eager key").len(), 32);
    assert_eq!(context.key().expect("eager key"), cached.key().expect("eager key"));
    assert_eq!(context.claims(), cached.claims());
    assert!(context.context_id().as_str().starts_with("urn:uuid:"));

    let authenticator = ContextAuthenticator::new(Arc::clone(issuer.cache()), None);
    let evidence = authenticator
        .authenticate(&ContextReference::for_context(&context), env.wall_clock())
        .expect("issued context authenticates");
    assert_eq!(&evidence.context_id, context.context_id());
    assert_eq!(evidence.claims, *context.claims());
}

/// INVARIANT: In client-only mode the key is the requester's entropy; in
/// server-only mode no entropy is sent and the key comes from the issuer.
#[tokio::test(start_paused = true)]
async fn single_source_entropy_modes() {
    let env = SimEnv::with_seed(22);

    let client = engine(
        &env,
        IssuerConfig::default(),
        NegotiationConfig { entropy_mode: EntropyMode::ClientOnly, ..NegotiationConfig::default() },
    );
    let context = client.negotiate(BUDGET).await.expect("client-only should succeed");
    let sent = client.transport().sent.lock().clone();
    let entropy = sent[0].entropy.clone().expect("client entropy sent");
    assert_eq!(context.key().expect("eager key").as_slice(), entropy.as_slice());

    let server = engine(
        &env,
        IssuerConfig::default(),
        NegotiationConfig { entropy_mode: EntropyMode::ServerOnly, ..NegotiationConfig::default() },
    );
    let context = server.negotiate(BUDGET).await.expect("server-only should succeed");
    assert!(server.transport().sent.lock()[0].entropy.is_none());
    let cached = server
        .transport()
        .issuer
        .cache()
        .get(context.context_id(), context.key_generation(), env.wall_clock())
        .expect("issuer caches the context");
    assert_eq!(context.key().expect("eager key"), cached.key().expect("eager key"));
}

/// INVARIANT: An asymmetric negotiation binds the requester's ephemeral
/// public key; the requester keeps the private half.
#[tokio::test(start_paused = true)]
async fn asymmetric_binds_public_key() {
    let env = SimEnv::with_seed(23);
    let engine = engine(
        &env,
        IssuerConfig::default(),
        NegotiationConfig { key_kind: KeyKind::Asymmetric, ..NegotiationConfig::default() },
    );

    let context = engine.negotiate(BUDGET).await.expect("negotiation should succeed");
    let public_key = engine.transport().sent.lock()[0].public_key.clone().expect("public key sent");
    let cached = engine
        .transport()
        .issuer
        .cache()
        .get(context.context_id(), context.key_generation(), env.wall_clock())
        .expect("issuer caches the context");

    assert_eq!(context.key_kind(), KeyKind::Asymmetric);
    assert_eq!(cached.key().expect("eager key").as_slice(), public_key.as_slice());
    assert_ne!(context.key().expect("eager key").as_slice(), public_key.as_slice());
}

/// INVARIANT: A bearer negotiation carries no key material either way.
#[tokio::test(start_paused = true)]
async fn bearer_has_no_key() {
    let env = SimEnv::with_seed(24);
    let engine = engine(
        &env,
        IssuerConfig::default(),
        NegotiationConfig { key_kind: KeyKind::Bearer, ..NegotiationConfig::default() },
    );

    let context = engine.negotiate(BUDGET).await.expect("negotiation should succeed");
    let request = engine.transport().sent.lock()[0].clone();
    assert!(request.entropy.is_none());
    assert!(request.public_key.is_none());
    assert!(context.key().expect("empty key").is_empty());
}

/// INVARIANT: In the multi-leg profile the second leg echoes the challenge,
/// reuses the first leg's entropy and carries a fresh correlation.
#[tokio::test(start_paused = true)]
async fn multi_leg_negotiation() {
    let env = SimEnv::with_seed(25);
    let engine = engine(
        &env,
        IssuerConfig {
            profile: NegotiationProfile::MultiLeg { max_legs: 2 },
            ..IssuerConfig::default()
        },
        NegotiationConfig {
            profile: NegotiationProfile::MultiLeg { max_legs: 4 },
            ..NegotiationConfig::default()
        },
    );

    let context = engine.negotiate(BUDGET).await.expect("negotiation should succeed");
    let sent = engine.transport().sent.lock().clone();

    assert_eq!(sent.len(), 2);
    assert_eq!((sent[0].leg, sent[1].leg), (1, 2));
    assert!(sent[0].continuation.is_none());
    assert!(sent[1].continuation.as_ref().is_some_and(|challenge| challenge.len() == 16));
    assert_eq!(sent[0].entropy, sent[1].entropy);
    assert_ne!(sent[0].correlation, sent[1].correlation);

    let cached = engine
        .transport()
        .issuer
        .cache()
        .get(context.context_id(), context.key_generation(), env.wall_clock())
        .expect("issuer caches the context");
    assert_eq!(context.key().expect("eager key"), cached.key().expect("eager key"));
}

/// INVARIANT: A requester limited to one leg refuses an issuer that asks
/// for more.
#[tokio::test(start_paused = true)]
async fn leg_limit_enforced() {
    let env = SimEnv::with_seed(26);
    let engine = engine(
        &env,
        IssuerConfig {
            profile: NegotiationProfile::MultiLeg { max_legs: 2 },
            ..IssuerConfig::default()
        },
        NegotiationConfig {
            profile: NegotiationProfile::MultiLeg { max_legs: 1 },
            ..NegotiationConfig::default()
        },
    );

    let err = engine.negotiate(BUDGET).await.expect_err("leg limit reached");
    assert!(matches!(err, NegotiationError::TooManyLegs { max_legs: 1 }));
}

/// INVARIANT: A continuation in the single-leg profile is a malformed
/// response.
#[tokio::test(start_paused = true)]
async fn continuation_in_default_profile_rejected() {
    let env = SimEnv::with_seed(27);
    let engine = engine(
        &env,
        IssuerConfig {
            profile: NegotiationProfile::MultiLeg { max_legs: 2 },
            ..IssuerConfig::default()
        },
        NegotiationConfig::default(),
    );

    let err = engine.negotiate(BUDGET).await.expect_err("unexpected continuation");
    assert!(matches!(err, NegotiationError::MalformedResponse { .. }));
}

/// INVARIANT: A response whose correlation does not match the outstanding
/// request is rejected.
#[tokio::test(start_paused = true)]
async fn correlation_mismatch_rejected() {
    let env = SimEnv::with_seed(28);
    let transport = TamperingTransport {
        inner: InProcessTransport::new(issuer(&env, IssuerConfig::default()), env.clone()),
        rewrite: |mut response: NegotiationResponse| {
            response.correlation = Correlation([0xEE; 16]);
            response
        },
    };
    let engine = NegotiationEngine::new(env.clone(), transport, NegotiationConfig::default());

    let err = engine.negotiate(BUDGET).await.expect_err("mismatched correlation");
    let NegotiationError::CorrelationMismatch { expected, received } = &err else {
        panic!("expected CorrelationMismatch, got {err:?}");
    };
    assert_eq!(*received, Correlation([0xEE; 16]));
    assert_eq!(*expected, engine.transport().inner.sent.lock()[0].correlation);
}

/// INVARIANT: An issuer that applies another algorithm suite yields a
/// recoverable mismatch; a suite the issuer refuses yields its fault.
#[tokio::test(start_paused = true)]
async fn algorithm_suite_disagreement() {
    let env = SimEnv::with_seed(29);
    let transport = TamperingTransport {
        inner: InProcessTransport::new(issuer(&env, IssuerConfig::default()), env.clone()),
        rewrite: |mut response: NegotiationResponse| {
            if let ResponseBody::Issued(token) = &mut response.body {
                token.algorithm_suite = AlgorithmSuite::Basic192;
            }
            response
        },
    };
    let engine = NegotiationEngine::new(env.clone(), transport, NegotiationConfig::default());
    let err = engine.negotiate(BUDGET).await.expect_err("suite rewritten");
    assert!(matches!(
        err,
        NegotiationError::AlgorithmMismatch {
            requested: AlgorithmSuite::Basic256,
            advertised: AlgorithmSuite::Basic192,
        }
    ));
    assert!(err.is_recoverable());

    let refusing = engine_with_suite(&env, AlgorithmSuite::Basic128);
    let err = refusing.negotiate(BUDGET).await.expect_err("suite refused");
    assert!(matches!(
        &err,
        NegotiationError::ProtocolFault { code, .. } if code == "wst:InvalidRequest"
    ));
    assert!(!err.is_recoverable());
}

fn engine_with_suite(
    env: &SimEnv,
    issuer_suite: AlgorithmSuite,
) -> NegotiationEngine<SimEnv, InProcessTransport> {
    engine(
        env,
        IssuerConfig { algorithm_suite: issuer_suite, ..IssuerConfig::default() },
        NegotiationConfig::default(),
    )
}

/// INVARIANT: In cookie mode the issuer keeps nothing, and the context
/// authenticates from its cookie alone.
#[tokio::test(start_paused = true)]
async fn cookie_mode_round_trip() {
    let env = SimEnv::with_seed(30);
    let engine = engine(
        &env,
        IssuerConfig { cookie_mode: true, ..IssuerConfig::default() },
        NegotiationConfig::default(),
    );

    let context = engine.negotiate(BUDGET).await.expect("negotiation should succeed");
    assert!(context.is_cookie_mode());
    assert!(engine.transport().issuer.cache().is_empty());

    let verifier = ContextAuthenticator::new(
        Arc::new(sessionframe_core::ContextCache::default()),
        Some(codec(&SimEnv::with_seed(99))),
    );
    let reference = ContextReference::for_context(&context);
    assert!(reference.cookie.is_some());
    let evidence =
        verifier.authenticate(&reference, env.wall_clock()).expect("cookie authenticates");
    assert_eq!(&evidence.context_id, context.context_id());
}

/// INVARIANT: Each leg is offered only what is left of the overall budget.
#[tokio::test(start_paused = true)]
async fn budget_shrinks_across_legs() {
    let env = SimEnv::with_seed(31);
    let multi_leg = || {
        (
            IssuerConfig {
                profile: NegotiationProfile::MultiLeg { max_legs: 2 },
                ..IssuerConfig::default()
            },
            NegotiationConfig {
                profile: NegotiationProfile::MultiLeg { max_legs: 2 },
                ..NegotiationConfig::default()
            },
        )
    };

    let (issuer_config, config) = multi_leg();
    let transport = InProcessTransport::new(issuer(&env, issuer_config), env.clone())
        .with_latency(Duration::from_secs(20));
    let engine = NegotiationEngine::new(env.clone(), transport, config);
    engine.negotiate(Duration::from_secs(50)).await.expect("fits in budget");
    assert_eq!(
        *engine.transport().budgets.lock(),
        vec![Duration::from_secs(50), Duration::from_secs(30)]
    );

    let (issuer_config, config) = multi_leg();
    let transport = InProcessTransport::new(issuer(&env, issuer_config), env.clone())
        .with_latency(Duration::from_secs(30));
    let engine = NegotiationEngine::new(env.clone(), transport, config);
    let started = env.wall_clock();
    let err = engine.negotiate(Duration::from_secs(50)).await.expect_err("second leg too slow");

    assert!(matches!(
        err,
        NegotiationError::TimedOut { budget } if budget == Duration::from_secs(50)
    ));
    assert_eq!(
        *engine.transport().budgets.lock(),
        vec![Duration::from_secs(50), Duration::from_secs(20)]
    );
    assert_eq!(env.wall_clock().duration_since(started), Duration::from_secs(50));
}

/// INVARIANT: A transport slower than the whole budget is abandoned when the
/// budget runs out.
#[tokio::test(start_paused = true)]
async fn slow_transport_times_out() {
    let env = SimEnv::with_seed(32);
    let transport = InProcessTransport::new(issuer(&env, IssuerConfig::default()), env.clone())
        .with_latency(Duration::from_secs(300));
    let engine = NegotiationEngine::new(env.clone(), transport, NegotiationConfig::default());

    let started = env.wall_clock();
    let err = engine.negotiate(BUDGET).await.expect_err("transport too slow");
    assert!(matches!(err, NegotiationError::TimedOut { .. }));
    assert_eq!(env.wall_clock().duration_since(started), BUDGET);
    assert!(engine.transport().issuer.cache().is_empty());
}

/// INVARIANT: A zero budget fails before anything is sent.
#[tokio::test(start_paused = true)]
async fn zero_budget_sends_nothing() {
    let env = SimEnv::with_seed(33);
    let engine = engine(&env, IssuerConfig::default(), NegotiationConfig::default());

    let err = engine.negotiate(Duration::ZERO).await.expect_err("no budget");
    assert!(matches!(err, NegotiationError::TimedOut { .. }));
    assert!(engine.transport().sent.lock().is_empty());
}

struct ClosedTransport;

#[async_trait]
impl NegotiationTransport for ClosedTransport {
    async fn send(
        &self,
        _request: NegotiationRequest,
        _remaining: Duration,
    ) -> Result<NegotiationResponse, TransportError> {
        Err(TransportError::Closed)
    }
}

/// INVARIANT: Transport failures surface unchanged.
#[tokio::test(start_paused = true)]
async fn transport_failure_surfaces() {
    let env = SimEnv::with_seed(34);
    let engine = NegotiationEngine::new(env, ClosedTransport, NegotiationConfig::default());

    let err = engine.negotiate(BUDGET).await.expect_err("transport closed");
    assert!(matches!(err, NegotiationError::Transport(TransportError::Closed)));
}
