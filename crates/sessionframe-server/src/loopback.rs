//! In-process negotiation transport.
//!
//! [`spawn_loopback_issuer`] runs a [`SessionIssuer`] on its own Tokio task
//! and returns a [`LoopbackTransport`] that reaches it over a bounded
//! channel. Every message is CBOR-encoded on the way in and out, so the
//! requester and issuer share nothing but bytes, as they would across a
//! real network.
//!
//! ```text
//! NegotiationEngine ── CBOR request ──> mpsc ──> issuer task
//!        ^                                           │
//!        └────────── CBOR response <── oneshot <─────┘
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sessionframe_core::{
    ClaimSet, Environment, NegotiationRequest, NegotiationResponse, NegotiationTransport,
    SessionIssuer, TransportError,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Requests the issuer task buffers before senders wait.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// One encoded request and where to send its encoded response.
struct Exchange {
    request: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

/// Transport to an issuer task in the same process.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    sender: mpsc::Sender<Exchange>,
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange").field("request_len", &self.request.len()).finish_non_exhaustive()
    }
}

#[async_trait]
impl NegotiationTransport for LoopbackTransport {
    async fn send(
        &self,
        request: NegotiationRequest,
        remaining: Duration,
    ) -> Result<NegotiationResponse, TransportError> {
        let encoded = encode(&request)?;
        let (reply, response) = oneshot::channel();

        tracing::trace!(leg = request.leg, ?remaining, len = encoded.len(), "loopback send");
        self.sender
            .send(Exchange { request: encoded, reply })
            .await
            .map_err(|_| TransportError::Closed)?;

        let bytes = response.await.map_err(|_| TransportError::Closed)?;
        ciborium::from_reader(bytes.as_slice())
            .map_err(|err| TransportError::Protocol(format!("undecodable response: {err}")))
    }
}

/// Run `issuer` on a new task and return a transport connected to it.
///
/// `claims` are attached to every context the task issues. The task ends
/// when every clone of the transport has been dropped.
pub fn spawn_loopback_issuer<E: Environment>(
    issuer: Arc<SessionIssuer<E>>,
    claims: Vec<ClaimSet>,
    env: E,
    queue_depth: usize,
) -> (LoopbackTransport, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<Exchange>(queue_depth.max(1));

    let handle = tokio::spawn(async move {
        while let Some(exchange) = receiver.recv().await {
            let Some(response) = answer(&issuer, &claims, &env, &exchange.request) else {
                // Reply sender dropped without a value; the requester sees Closed
                continue;
            };
            if exchange.reply.send(response).is_err() {
                tracing::debug!("requester gave up before the response was ready");
            }
        }
        tracing::debug!("loopback issuer stopped");
    });

    (LoopbackTransport { sender }, handle)
}

fn answer<E: Environment>(
    issuer: &SessionIssuer<E>,
    claims: &[ClaimSet],
    env: &E,
    request: &[u8],
) -> Option<Vec<u8>> {
    let request: NegotiationRequest = match ciborium::from_reader(request) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable negotiation request");
            return None;
        },
    };

    let response = issuer.handle_request(request, claims, env.wall_clock());
    match encode(&response) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::warn!(error = %err, "dropping unencodable negotiation response");
            None
        },
    }
}

fn encode<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes)
        .map_err(|err| TransportError::Protocol(format!("unencodable message: {err}")))?;
    Ok(bytes)
}
