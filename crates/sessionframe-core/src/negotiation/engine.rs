//! Async negotiation driver.
//!
//! Runs a [`Negotiation`] over a [`NegotiationTransport`] within one overall
//! deadline budget. Legs are strictly sequential: leg N+1 is sent only after
//! leg N's response was accepted. Each send is raced against the remaining
//! budget, so a slow issuer cannot stretch the negotiation past it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{
    error::{NegotiationError, TransportError},
    keypair::{Ed25519KeyGenerator, EphemeralKeyGenerator},
    message::{NegotiationRequest, NegotiationResponse},
    state::{Negotiation, NegotiationConfig, NegotiationStep},
};
use crate::{context::SecurityContext, env::Environment};

/// Overall negotiation budget used by callers without their own deadline.
pub const DEFAULT_NEGOTIATION_BUDGET: Duration = Duration::from_secs(60);

/// Carries negotiation messages to the issuer.
#[async_trait]
pub trait NegotiationTransport: Send + Sync {
    /// Send one request and wait for its response.
    ///
    /// `remaining` is the budget left for this leg; implementations may use
    /// it for their own I/O timeouts.
    async fn send(
        &self,
        request: NegotiationRequest,
        remaining: Duration,
    ) -> Result<NegotiationResponse, TransportError>;
}

/// Drives negotiations with the issuer behind a transport.
pub struct NegotiationEngine<E: Environment, T: NegotiationTransport> {
    env: E,
    transport: T,
    config: NegotiationConfig,
    key_generator: Arc<dyn EphemeralKeyGenerator>,
}

impl<E: Environment, T: NegotiationTransport> NegotiationEngine<E, T> {
    /// Engine using Ed25519 for asymmetric proof keys.
    pub fn new(env: E, transport: T, config: NegotiationConfig) -> Self {
        Self { env, transport, config, key_generator: Arc::new(Ed25519KeyGenerator) }
    }

    /// Replace the ephemeral key generator.
    #[must_use]
    pub fn with_key_generator(mut self, key_generator: Arc<dyn EphemeralKeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Configuration used for every negotiation.
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Transport used for every leg.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one negotiation to completion within `budget`.
    ///
    /// # Errors
    ///
    /// - `TimedOut` if the budget runs out before a context is issued
    /// - `Transport` if the transport fails
    /// - any error from [`Negotiation`]
    pub async fn negotiate(&self, budget: Duration) -> Result<SecurityContext, NegotiationError> {
        let started = self.env.now();
        let mut negotiation = Negotiation::with_key_generator(
            self.config.clone(),
            self.env.clone(),
            Arc::clone(&self.key_generator),
        );
        let mut request = negotiation.start()?;

        loop {
            let elapsed = self.env.now() - started;
            let Some(remaining) = budget.checked_sub(elapsed).filter(|left| !left.is_zero())
            else {
                tracing::debug!(?budget, leg = negotiation.leg(), "negotiation budget exhausted");
                return Err(NegotiationError::TimedOut { budget });
            };

            let response = tokio::select! {
                biased;
                result = self.transport.send(request, remaining) => result?,
                () = self.env.sleep(remaining) => {
                    tracing::debug!(?budget, leg = negotiation.leg(), "negotiation leg timed out");
                    return Err(NegotiationError::TimedOut { budget });
                }
            };

            match negotiation.handle_response(response, self.env.wall_clock())? {
                NegotiationStep::Completed(context) => return Ok(context),
                NegotiationStep::MoreLegsRequired => request = negotiation.next_request()?,
            }
        }
    }
}
