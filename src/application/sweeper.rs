//! Periodic idle-state eviction.
//!
//! Buckets and breakers are created lazily and never expire on their own; the
//! sweeper task calls the limiter's idle sweep on a fixed interval so memory
//! stays bounded by the set of recently active keys.

use crate::application::limiter::RateLimiter;
use crate::application::ports::Storage;
use crate::application::registry::{BreakerEntry, BucketEntry};
use crate::error::{RateLimitError, Result};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Handle to a running sweeper task.
///
/// Dropping the handle detaches the task; it still stops on its own once the
/// limiter is disposed or every limiter handle is dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The task may already have exited
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            debug!(error = %e, "sweeper task ended abnormally");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<BS, CS> RateLimiter<BS, CS>
where
    BS: Storage<String, BucketEntry> + Clone + 'static,
    CS: Storage<String, BreakerEntry> + Clone + 'static,
{
    /// Spawn a task that evicts idle state every `every`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns `RateLimitError::ZeroSweepInterval` if `every` is zero.
    ///
    /// # Panics
    /// Panics if the limiter has been disposed.
    pub fn spawn_sweeper(&self, every: Duration) -> Result<SweeperHandle> {
        if self.is_disposed() {
            panic!("RateLimiter::spawn_sweeper called after dispose");
        }
        if every.is_zero() {
            return Err(RateLimitError::ZeroSweepInterval);
        }

        let limiter = self.downgrade();
        let (tx, mut rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    _ = ticker.tick() => match limiter.sweep() {
                        Some(evicted) => trace!(evicted, "sweep finished"),
                        None => break,
                    },
                }
            }
            debug!("sweeper stopped");
        });

        debug!(interval_ms = every.as_millis() as u64, "sweeper started");
        Ok(SweeperHandle {
            shutdown: Some(tx),
            task,
        })
    }
}
