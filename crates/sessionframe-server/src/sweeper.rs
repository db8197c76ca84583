//! Background expiry sweeps.
//!
//! Lookups already drop expired state lazily; a sweep bounds how long state
//! nobody asks for keeps occupying capacity. The node sweeps the context
//! cache and the issuer's pending challenges.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use sessionframe_core::{ContextCache, Environment, SessionIssuer, Timestamp};
use tokio::task::JoinHandle;

/// State with entries that lapse over time.
pub trait Sweep: Send + Sync + 'static {
    /// Name used in log lines.
    const NAME: &'static str;

    /// Drop everything expired at `now`. Returns how many entries went.
    fn sweep(&self, now: Timestamp) -> usize;
}

impl Sweep for ContextCache {
    const NAME: &'static str = "context cache";

    fn sweep(&self, now: Timestamp) -> usize {
        self.sweep_expired(now)
    }
}

impl<E: Environment> Sweep for SessionIssuer<E> {
    const NAME: &'static str = "pending challenges";

    fn sweep(&self, now: Timestamp) -> usize {
        self.purge_expired_challenges(now)
    }
}

/// Periodically sweep `target`.
///
/// The task holds only a weak reference and stops once the target has been
/// dropped.
pub fn spawn_sweeper<S: Sweep, E: Environment>(
    target: &Arc<S>,
    env: E,
    interval: Duration,
) -> JoinHandle<()> {
    let target: Weak<S> = Arc::downgrade(target);

    tokio::spawn(async move {
        loop {
            env.sleep(interval).await;

            let Some(target) = target.upgrade() else {
                tracing::debug!(target = S::NAME, "sweep target dropped, sweeper stopping");
                return;
            };
            let removed = target.sweep(env.wall_clock());
            if removed > 0 {
                tracing::info!(target = S::NAME, removed, "expired entries swept");
            }
        }
    })
}
