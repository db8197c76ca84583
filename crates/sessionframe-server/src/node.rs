//! A complete issuing and verifying node.
//!
//! [`Node`] wires the core components together the way a deployment runs
//! them: one shared [`ContextCache`] behind both the [`SessionIssuer`] and the
//! [`ContextAuthenticator`], a cookie codec when cookies are enabled, and
//! background sweepers for the cache and the issuer's pending challenges. Requesters reach the issuer through
//! [`Node::connect`].

use std::{sync::Arc, time::Duration};

use sessionframe_core::{
    AuthorizationEvidence, CacheConfig, ClaimSet, ContextAuthenticator, ContextCache,
    ContextCookieCodec, ContextReference, Environment, IssuerConfig, NegotiationConfig,
    NegotiationEngine, SecurityContext, SessionIssuer, XChaChaCookieProtector,
};
use sessionframe_crypto::COOKIE_KEY_SIZE;
use tokio::task::JoinHandle;

use crate::{
    error::NodeError,
    loopback::{DEFAULT_QUEUE_DEPTH, LoopbackTransport, spawn_loopback_issuer},
    sweeper::spawn_sweeper,
};

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Context cache sizing and sweep interval
    pub cache: CacheConfig,
    /// Issuer behaviour
    pub issuer: IssuerConfig,
    /// Cookie key shared with every node that verifies our cookies. A random
    /// key is generated if cookie mode is enabled without one.
    pub cookie_key: Option<[u8; COOKIE_KEY_SIZE]>,
    /// Loopback channel depth per connection
    pub queue_depth: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            issuer: IssuerConfig::default(),
            cookie_key: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Issuer, cache and authenticator sharing one environment.
pub struct Node<E: Environment> {
    env: E,
    cache: Arc<ContextCache>,
    issuer: Arc<SessionIssuer<E>>,
    authenticator: ContextAuthenticator,
    queue_depth: usize,
    sweepers: [JoinHandle<()>; 2],
}

impl<E: Environment> Node<E> {
    /// Build the node and start its sweepers. Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - `Issuer` if the issuer configuration is inconsistent
    pub fn start(config: NodeConfig, env: E) -> Result<Self, NodeError> {
        let cookie_key = match config.cookie_key {
            Some(key) => Some(key),
            None if config.issuer.cookie_mode => {
                tracing::warn!("cookie mode without a configured key; cookies die with this node");
                let mut key = [0u8; COOKIE_KEY_SIZE];
                env.random_bytes(&mut key);
                Some(key)
            },
            None => None,
        };
        let codec = cookie_key.map(|key| {
            ContextCookieCodec::new(Arc::new(XChaChaCookieProtector::new(key, env.clone())))
        });

        let sweep_interval = config.cache.sweep_interval;
        let cache = Arc::new(ContextCache::new(config.cache));
        let issuer = Arc::new(SessionIssuer::new(
            config.issuer,
            env.clone(),
            Arc::clone(&cache),
            codec.clone(),
        )?);
        let authenticator = ContextAuthenticator::new(Arc::clone(&cache), codec);
        let sweepers = [
            spawn_sweeper(&cache, env.clone(), sweep_interval),
            spawn_sweeper(&issuer, env.clone(), sweep_interval),
        ];

        tracing::info!(
            capacity = cache.capacity(),
            cookie_mode = issuer.config().cookie_mode,
            ?sweep_interval,
            "node started"
        );

        Ok(Self { env, cache, issuer, authenticator, queue_depth: config.queue_depth, sweepers })
    }

    /// Shared context cache.
    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// Issuer answering negotiations.
    pub fn issuer(&self) -> &Arc<SessionIssuer<E>> {
        &self.issuer
    }

    /// Authenticator over the shared cache.
    pub fn authenticator(&self) -> &ContextAuthenticator {
        &self.authenticator
    }

    /// Open a loopback connection whose issued contexts carry `claims`.
    pub fn connect(&self, claims: Vec<ClaimSet>) -> LoopbackTransport {
        let (transport, _task) = spawn_loopback_issuer(
            Arc::clone(&self.issuer),
            claims,
            self.env.clone(),
            self.queue_depth,
        );
        transport
    }

    /// Negotiate a context with this node's issuer.
    ///
    /// # Errors
    ///
    /// - `Negotiation` if the negotiation fails or exceeds `budget`
    pub async fn negotiate(
        &self,
        config: NegotiationConfig,
        claims: Vec<ClaimSet>,
        budget: Duration,
    ) -> Result<SecurityContext, NodeError> {
        let engine = NegotiationEngine::new(self.env.clone(), self.connect(claims), config);
        Ok(engine.negotiate(budget).await?)
    }

    /// Authenticate a presented context at the current time.
    ///
    /// # Errors
    ///
    /// - `Authentication` if the context is unknown, expired or its cookie
    ///   is rejected
    pub fn authenticate(
        &self,
        reference: &ContextReference,
    ) -> Result<AuthorizationEvidence, NodeError> {
        Ok(self.authenticator.authenticate(reference, self.env.wall_clock())?)
    }
}

impl<E: Environment> Drop for Node<E> {
    fn drop(&mut self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

impl<E: Environment> std::fmt::Debug for Node<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("cache", &self.cache).finish_non_exhaustive()
    }
}
