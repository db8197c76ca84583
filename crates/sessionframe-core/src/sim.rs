//! Deterministic simulation environment.
//!
//! [`SimEnv`] uses a seeded `ChaCha20` RNG and a virtual clock that only moves
//! when advanced explicitly or when a `sleep` completes. Two environments
//! created with the same seed produce the same identifiers, nonces and keys,
//! which keeps negotiation and cache tests reproducible.

use std::{ops::Sub, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{env::Environment, time::Timestamp};

/// Virtual monotonic instant (time elapsed since the environment started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(Duration);

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Seeded, manually clocked environment. Clones share state.
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<SimState>>,
}

struct SimState {
    rng: ChaCha20Rng,
    elapsed: Duration,
    wall_start: Timestamp,
}

impl SimEnv {
    /// Wall-clock start used by [`SimEnv::with_seed`] (2023-11-14T22:13:20Z).
    pub const DEFAULT_WALL_START: Timestamp = Timestamp::from_unix_secs(1_700_000_000);

    /// Environment with the given RNG seed, starting at
    /// [`SimEnv::DEFAULT_WALL_START`].
    pub fn with_seed(seed: u64) -> Self {
        Self::new(seed, Self::DEFAULT_WALL_START)
    }

    /// Environment with the given RNG seed and wall-clock start.
    pub fn new(seed: u64, wall_start: Timestamp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimState {
                rng: ChaCha20Rng::seed_from_u64(seed),
                elapsed: Duration::ZERO,
                wall_start,
            })),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.inner.lock();
        state.elapsed = state.elapsed.saturating_add(duration);
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.inner.lock().elapsed)
    }

    fn wall_clock(&self) -> Timestamp {
        let state = self.inner.lock();
        state.wall_start.saturating_add(state.elapsed)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let env = self.clone();
        async move {
            tokio::time::sleep(duration).await;
            env.advance(duration);
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.lock().rng.fill_bytes(buffer);
    }
}
