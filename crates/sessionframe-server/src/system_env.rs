//! Production environment using system time and RNG.
//!
//! `SystemEnv` implements [`Environment`] with:
//!
//! - `std::time::Instant` for the monotonic clock used by deadline budgets
//! - `SystemTime` converted to [`Timestamp`] for validity windows
//! - the OS cryptographic RNG (getrandom) for identifiers, entropy, nonces
//!   and ephemeral keys
//! - `tokio::time::sleep` for waiting
//!
//! Behaviour is non-deterministic; tests use `SimEnv` instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sessionframe_core::{Environment, Timestamp};

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. A node without working cryptographic
/// randomness would issue predictable context ids, keys and cookie nonces,
/// so it must not continue.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> Timestamp {
        // A clock before 1970 clamps to the epoch; every window check then fails closed
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Timestamp::UNIX_EPOCH.saturating_add(since_epoch)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - node cannot operate securely");
    }
}
