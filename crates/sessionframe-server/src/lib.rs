//! Sessionframe runtime.
//!
//! Production glue around [`sessionframe_core`]: the core components are
//! sans-IO and take time and randomness from an [`Environment`]; this crate
//! supplies the real environment, runs the issuer on Tokio tasks and keeps
//! the cache swept.
//!
//! # Components
//!
//! - [`SystemEnv`]: Production environment (system clock, OS RNG)
//! - [`LoopbackTransport`]: In-process negotiation transport, CBOR over a
//!   channel to an issuer task
//! - [`spawn_sweeper`]: Periodic expiry sweep of a [`ContextCache`] or of an
//!   issuer's pending challenges
//! - [`Node`]: Issuer, cache and authenticator wired together
//!
//! [`Environment`]: sessionframe_core::Environment
//! [`ContextCache`]: sessionframe_core::ContextCache

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod loopback;
mod node;
mod sweeper;
mod system_env;

pub use error::NodeError;
pub use loopback::{DEFAULT_QUEUE_DEPTH, LoopbackTransport, spawn_loopback_issuer};
pub use node::{Node, NodeConfig};
pub use sweeper::{Sweep, spawn_sweeper};
pub use system_env::SystemEnv;
