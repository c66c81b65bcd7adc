use futures_util::future::join_all;
use parking_lot::Mutex;
use skyshelf_daemon::Daemon;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    cache::TelemetryCache, error::TelemetryError, hub::BroadcastHub, prober::CapacityProber,
};

/// Handle to a cycle submitted in the background. Dropping it detaches the
/// cycle; it keeps running.
pub type CycleHandle = JoinHandle<CycleOutcome>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle held the in-progress flag.
    Skipped,
    /// Remotes could not be listed; the cache was left alone.
    EnumerationFailed,
    /// The daemon has no remotes configured; the cache was left alone.
    NoRemotes,
    Completed { probed: usize, changed: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub ready_attempts: u32,
    pub ready_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            interval: Duration::from_secs(5 * 60),
            batch_size: 5,
            ready_attempts: 3,
            ready_delay: Duration::from_secs(1),
        }
    }
}

/// Periodic refresh of every remote's capacity.
///
/// At most one cycle runs at a time (the in-progress flag) and at most one
/// timer is pending (the timer slot). Whatever happens inside a cycle, the
/// flag is cleared and the next timer armed when it ends.
pub struct RefreshScheduler {
    daemon: Arc<dyn Daemon>,
    prober: CapacityProber,
    cache: Arc<TelemetryCache>,
    hub: Arc<BroadcastHub>,
    settings: SchedulerSettings,
    in_progress: AtomicBool,
    started: AtomicBool,
    daemon_ready: AtomicBool,
    stopped: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        cache: Arc<TelemetryCache>,
        hub: Arc<BroadcastHub>,
        settings: SchedulerSettings,
    ) -> Arc<Self> {
        Arc::new(RefreshScheduler {
            prober: CapacityProber::new(daemon.clone()),
            daemon,
            cache,
            hub,
            settings,
            in_progress: AtomicBool::new(false),
            started: AtomicBool::new(false),
            daemon_ready: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    #[cfg(test)]
    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Lazily starts the refresh loop. Only the first call does anything.
    pub fn ensure_started(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(
                "starting background refresh (every {:?}, batches of {})",
                self.settings.interval, self.settings.batch_size
            );
            drop(self.submit());
        }
    }

    /// Drops any pending timer and submits a cycle right away. The returned
    /// handle may be awaited or dropped.
    pub fn trigger_now(self: &Arc<Self>) -> CycleHandle {
        self.started.store(true, Ordering::Release);
        self.cancel_timer();
        self.submit()
    }

    /// Cancels the pending timer, if any, and stops arming new ones. A running
    /// cycle is left to finish.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.cancel_timer();
    }

    fn submit(self: &Arc<Self>) -> CycleHandle {
        let this = self.clone();
        tokio::spawn(async move { this.run_cycle().await })
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    fn arm_timer(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let this = self.clone();
        let interval = self.settings.interval;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            drop(this.submit());
        });

        if let Some(previous) = self.timer.lock().replace(timer) {
            previous.abort();
        }
    }

    /// One full pass over all remotes.
    pub async fn run_cycle(self: Arc<Self>) -> CycleOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("refresh already in progress; trigger ignored");
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard(self.clone());

        self.confirm_daemon_ready().await;

        match self.refresh_all().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("{}; keeping previous data", err);
                CycleOutcome::EnumerationFailed
            }
        }
    }

    async fn refresh_all(&self) -> Result<CycleOutcome, TelemetryError> {
        let remotes = self
            .daemon
            .list_remotes()
            .await
            .map_err(TelemetryError::Enumeration)?;

        if remotes.is_empty() {
            info!("daemon reports no remotes; nothing to refresh");
            return Ok(CycleOutcome::NoRemotes);
        }

        let mut changed = false;
        let mut failed = 0;
        for batch in remotes.chunks(self.settings.batch_size.max(1)) {
            let records = join_all(batch.iter().map(|remote| self.prober.probe(remote))).await;
            for (remote, record) in batch.iter().zip(records) {
                if record.is_failed() {
                    failed += 1;
                }
                changed |= self.cache.merge_one(remote, record);
            }
        }

        if changed {
            let delivered = self.hub.publish(self.cache.snapshot());
            debug!("storage changed; pushed to {} subscriber(s)", delivered);
        }

        info!(
            "refreshed {} remote(s), {} failing{}",
            remotes.len(),
            failed,
            if changed { "" } else { ", no changes" }
        );

        Ok(CycleOutcome::Completed {
            probed: remotes.len(),
            changed,
        })
    }

    async fn confirm_daemon_ready(&self) {
        if self.daemon_ready.load(Ordering::Acquire) {
            return;
        }

        let attempts = self.settings.ready_attempts.max(1);
        for attempt in 1..=attempts {
            match self.daemon.version().await {
                Ok(info) => {
                    info!("storage daemon {} is ready", info.version);
                    self.daemon_ready.store(true, Ordering::Release);
                    return;
                }
                Err(err) if err.kind().is_transient() && attempt < attempts => {
                    debug!("daemon not ready (attempt {}/{}): {}", attempt, attempts, err);
                    tokio::time::sleep(self.settings.ready_delay).await;
                }
                Err(err) => {
                    warn!("could not confirm daemon readiness: {}", err);
                    return;
                }
            }
        }
    }
}

/// Releases the in-progress flag and arms the next timer when a cycle ends,
/// including by panic or cancellation.
struct CycleGuard(Arc<RefreshScheduler>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.in_progress.store(false, Ordering::Release);
        self.0.arm_timer();
    }
}
