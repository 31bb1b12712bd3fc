//! Background sweep of limiter buckets, cached results and proposals.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use toolgate_policy::RateLimiter;
use tracing::{debug, info};

use crate::cache::ResultCache;
use crate::proposals::ProposalBook;

/// Counts of what one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle rate-limit buckets dropped across both limiters.
    pub rate_buckets: usize,
    /// Expired cached results dropped.
    pub cache_entries: usize,
    /// Expired proposals dropped.
    pub proposals: usize,
}

impl SweepReport {
    /// Returns the total number of removed items.
    #[must_use]
    pub const fn total(self) -> usize {
        self.rate_buckets + self.cache_entries + self.proposals
    }
}

#[derive(Clone)]
pub(crate) struct Sweeper {
    pub(crate) limiters: [Arc<RateLimiter>; 2],
    pub(crate) cache: Arc<ResultCache>,
    pub(crate) proposals: Arc<ProposalBook>,
}

impl Sweeper {
    pub(crate) fn sweep(&self) -> SweepReport {
        SweepReport {
            rate_buckets: self.limiters.iter().map(|limiter| limiter.cleanup()).sum(),
            cache_entries: self.cache.purge_expired(),
            proposals: self.proposals.purge_expired(),
        }
    }
}

/// Handle to the running sweeper task.
pub struct MaintenanceHandle {
    shutdown: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl fmt::Debug for MaintenanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaintenanceHandle")
            .field("shutdown", &self.shutdown.load(Ordering::Relaxed))
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

impl MaintenanceHandle {
    /// Returns `true` once the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stops the sweeper and waits for the task to end.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        self.worker.abort();
        let _ = self.worker.await;
        info!("maintenance sweeper stopped");
    }
}

pub(crate) fn spawn(every: Duration, sweeper: Sweeper) -> MaintenanceHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let worker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        while !flag.load(Ordering::Acquire) {
            interval.tick().await;
            if flag.load(Ordering::Acquire) {
                break;
            }

            let report = sweeper.sweep();
            if report.total() > 0 {
                debug!(
                    rate_buckets = report.rate_buckets,
                    cache_entries = report.cache_entries,
                    proposals = report.proposals,
                    "maintenance sweep"
                );
            }
        }
    });

    MaintenanceHandle { shutdown, worker }
}
