//! Shared fixtures for sessionframe-core integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use sessionframe_core::{
    Claim, ClaimSet, ContextCache, ContextCookieCodec, ContextId, Environment, IssuerConfig,
    KeyGeneration, KeyKind, NegotiationRequest, NegotiationResponse, NegotiationTransport, ProofKey,
    SecurityContext, SessionIssuer, SimEnv, Timestamp, TransportError, XChaChaCookieProtector,
};

/// Cookie key shared by issuer and verifier in tests.
pub const COOKIE_KEY: [u8; 32] = [0x5C; 32];

pub fn ts(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(secs)
}

pub fn claims() -> Vec<ClaimSet> {
    vec![ClaimSet::new(
        "urn:sessionframe:test-issuer",
        vec![Claim::new("name", "alice"), Claim::new("role", "operator")],
    )]
}

/// Symmetric context with a 32-byte key over `[from, to]`.
pub fn symmetric_context(id: &str, from: i64, to: i64) -> SecurityContext {
    SecurityContext::builder(
        ContextId::new(id),
        KeyKind::Symmetric,
        ProofKey::eager(vec![0xA1; 32]),
        ts(from),
        ts(to),
    )
    .key_generation(KeyGeneration::new(format!("{id}#gen-1")))
    .claims(claims())
    .build()
    .expect("fixture context should be valid")
}

pub fn codec(env: &SimEnv) -> ContextCookieCodec {
    ContextCookieCodec::new(Arc::new(XChaChaCookieProtector::new(COOKIE_KEY, env.clone())))
}

/// Transport that hands requests straight to an in-process issuer.
///
/// `latency` is spent on the environment clock before each answer, so budget
/// tests see time pass.
pub struct InProcessTransport {
    pub issuer: Arc<SessionIssuer<SimEnv>>,
    pub env: SimEnv,
    pub latency: Duration,
    pub sent: Mutex<Vec<NegotiationRequest>>,
    pub budgets: Mutex<Vec<Duration>>,
}

impl InProcessTransport {
    pub fn new(issuer: Arc<SessionIssuer<SimEnv>>, env: SimEnv) -> Self {
        Self {
            issuer,
            env,
            latency: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
            budgets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl NegotiationTransport for InProcessTransport {
    async fn send(
        &self,
        request: NegotiationRequest,
        remaining: Duration,
    ) -> Result<NegotiationResponse, TransportError> {
        self.sent.lock().push(request.clone());
        self.budgets.lock().push(remaining);
        if !self.latency.is_zero() {
            self.env.sleep(self.latency).await;
        }
        Ok(self.issuer.handle_request(request, &claims(), self.env.wall_clock()))
    }
}

/// Transport that passes responses through a rewrite hook.
pub struct TamperingTransport<F> {
    pub inner: InProcessTransport,
    pub rewrite: F,
}

#[async_trait]
impl<F> NegotiationTransport for TamperingTransport<F>
where
    F: Fn(NegotiationResponse) -> NegotiationResponse + Send + Sync,
{
    async fn send(
        &self,
        request: NegotiationRequest,
        remaining: Duration,
    ) -> Result<NegotiationResponse, TransportError> {
        let response = self.inner.send(request, remaining).await?;
        Ok((self.rewrite)(response))
    }
}

/// Issuer over a fresh default cache.
pub fn issuer(env: &SimEnv, config: IssuerConfig) -> Arc<SessionIssuer<SimEnv>> {
    let codec = config.cookie_mode.then(|| codec(env));
    Arc::new(
        SessionIssuer::new(config, env.clone(), Arc::new(ContextCache::default()), codec)
            .expect("issuer config should be valid"),
    )
}
