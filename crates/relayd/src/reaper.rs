//! Idle session eviction.
//!
//! The reaper wakes once per interval, walks a snapshot of the registry and
//! evicts every session that has not sent a line for longer than the idle
//! timeout. Eviction sends the inactivity notice, closes the session and
//! releases its registry entry; each step is a no-op when another party
//! (logout, a failed write, a concurrent sweep) got there first.

use std::time::Duration;

use relay_core::CloseReason;
use relay_protocol::Reply;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::RegistryHandle;

/// Periodic idle-session sweeper.
pub struct IdleReaper {
    registry: RegistryHandle,
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(registry: RegistryHandle, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            registry,
            idle_timeout,
            interval,
        }
    }

    /// Runs one sweep and returns how many sessions it evicted.
    pub async fn sweep(&self) -> usize {
        let mut evicted = 0;

        for session in self.registry.snapshot().await {
            if session.is_closed() || session.idle_for() <= self.idle_timeout {
                continue;
            }

            // The notice must be queued before close, which stops the queue.
            session.send(&Reply::inactivity());
            if !session.close(CloseReason::IdleTimeout) {
                continue;
            }

            if let Some(handle) = session.handle() {
                info!(
                    handle = %handle,
                    session = %session.id(),
                    idle_secs = session.idle_for().as_secs(),
                    "Evicting idle session"
                );
                self.registry
                    .release(handle.clone(), session.id(), CloseReason::IdleTimeout)
                    .await;
            }
            evicted += 1;
        }

        evicted
    }

    /// Sweeps every interval until `cancel_token` fires.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut tick = interval_at(Instant::now() + self.interval, self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Idle reaper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("Idle reaper shutting down");
                    break;
                }

                _ = tick.tick() => {
                    let evicted = self.sweep().await;
                    if evicted > 0 {
                        debug!(evicted, "Idle sweep complete");
                    }
                }
            }
        }
    }
}

/// Spawns an [`IdleReaper`] on its own task.
pub fn spawn_reaper(
    registry: RegistryHandle,
    idle_timeout: Duration,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(IdleReaper::new(registry, idle_timeout, interval).run(cancel_token))
}
