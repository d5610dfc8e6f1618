//! Poll scheduler
//!
//! Runs one timer loop per active data point and keeps the loop set in step
//! with the configuration store.
//!
//! ```text
//! reconcile (every reconcile_interval)
//!   ├─ loop without active point ──► cancel, wait for in-flight tick, mark status stopped
//!   ├─ active point without loop ──► start loop
//!   ├─ interval changed          ──► replace loop
//!   └─ publish status snapshot
//!
//! loop (every max(interval, min_interval))
//!   └─ tick ──► poll_once(point)   (skipped while the previous tick runs, unless overlap = allow)
//! ```

mod poll;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acq_calc::Accumulator;
use acq_model::{DataPoint, PointCode, PointId};
use dashmap::DashMap;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{OverlapPolicy, SchedulerConfig};
use crate::connection::ConnectionManager;
use crate::error::{AcqError, Result};
use crate::protocols::{HttpReader, SessionConnector};
use crate::status::StatusReporter;
use crate::store::ConfigStore;

struct PollLoop {
    code: PointCode,
    /// Configured interval, compared on reconcile
    interval: u64,
    period: Duration,
    token: CancellationToken,
    handle: JoinHandle<()>,
    skipped: Arc<AtomicU64>,
}

struct Inner {
    store: Arc<dyn ConfigStore>,
    connections: ConnectionManager,
    connector: Arc<dyn SessionConnector>,
    http: HttpReader,
    accumulator: Accumulator,
    reporter: StatusReporter,
    config: SchedulerConfig,
    loops: DashMap<PointId, PollLoop>,
    shutdown: CancellationToken,
    monitor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Clears the in-flight flag when a tick ends, even by panic
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("loops", &self.inner.loops.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl PollScheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        connections: ConnectionManager,
        connector: Arc<dyn SessionConnector>,
        reporter: StatusReporter,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_http(store, connections, connector, reporter, config, HttpReader::new())
    }

    pub fn with_http(
        store: Arc<dyn ConfigStore>,
        connections: ConnectionManager,
        connector: Arc<dyn SessionConnector>,
        reporter: StatusReporter,
        config: SchedulerConfig,
        http: HttpReader,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                connections,
                connector,
                http,
                accumulator: Accumulator::new(),
                reporter,
                config,
                loops: DashMap::new(),
                shutdown: CancellationToken::new(),
                monitor: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.inner.accumulator
    }

    /// Reconcile once, then keep reconciling every `reconcile_interval`
    pub async fn start(&self) {
        if let Err(e) = self.reconcile().await {
            error!("Initial point reconciliation failed: {}", e);
        }

        let scheduler = self.clone();
        let token = self.inner.shutdown.clone();
        let period = self.inner.config.reconcile_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = scheduler.reconcile().await {
                            error!("Point reconciliation failed: {}", e);
                        }
                    },
                }
            }
            debug!("Point monitor stopped");
        });
        *self.inner.monitor.lock() = Some(handle);
        info!("Poll scheduler started (reconcile every {:?})", period);
    }

    /// Converge the loop set onto the store's active points, then publish
    /// the status snapshot
    pub async fn reconcile(&self) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Ok(());
        }

        let active: HashMap<PointId, DataPoint> = self
            .inner
            .store
            .active_points()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let stale: Vec<PointId> = self
            .inner
            .loops
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !active.contains_key(id))
            .collect();
        for id in stale {
            if let Some((_, poll_loop)) = self.inner.loops.remove(&id) {
                self.stop_loop(id, poll_loop, true).await;
            }
        }

        for (id, point) in active {
            let running = self.inner.loops.get(&id).map(|l| l.interval);
            match running {
                Some(interval) if interval == point.scheduler_interval => {},
                Some(interval) => {
                    info!(
                        point = id,
                        "Interval changed {}s -> {}s, restarting loop", interval, point.scheduler_interval
                    );
                    if let Some((_, old)) = self.inner.loops.remove(&id) {
                        self.stop_loop(id, old, false).await;
                    }
                    self.start_loop(&point);
                },
                None => self.start_loop(&point),
            }
        }

        if let Err(e) = self.inner.reporter.publish().await {
            warn!("Status publish failed: {}", e);
        }
        Ok(())
    }

    fn start_loop(&self, point: &DataPoint) {
        let period = point.poll_period(self.inner.config.min_interval_secs);
        let token = self.inner.shutdown.child_token();
        let skipped = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(self.clone().run_loop(
            point.id,
            period,
            token.clone(),
            Arc::clone(&skipped),
        ));
        self.inner.loops.insert(
            point.id,
            PollLoop {
                code: point.code,
                interval: point.scheduler_interval,
                period,
                token,
                handle,
                skipped,
            },
        );
        info!(point = point.id, "Polling {} every {:?}", point.name, period);
    }

    async fn stop_loop(&self, id: PointId, poll_loop: PollLoop, mark_stopped: bool) {
        poll_loop.token.cancel();
        if let Err(e) = poll_loop.handle.await {
            warn!(point = id, "Poll loop ended abnormally: {}", e);
        }
        if !mark_stopped {
            return;
        }

        self.inner.accumulator.clear_point(poll_loop.code);
        match self.inner.store.status(poll_loop.code).await {
            Ok(Some(mut status)) => {
                status.mark_stopped();
                if let Err(e) = self.inner.store.save_status(&status).await {
                    warn!(point = id, "Failed to save stopped status: {}", e);
                }
            },
            Ok(None) => {},
            Err(e) => warn!(point = id, "Failed to load status: {}", e),
        }
        info!(point = id, "Polling stopped");
    }

    async fn run_loop(
        self,
        id: PointId,
        period: Duration,
        token: CancellationToken,
        skipped: Arc<AtomicU64>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let in_flight = Arc::new(AtomicBool::new(false));
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    while ticks.try_join_next().is_some() {}

                    let guard = match self.inner.config.overlap {
                        OverlapPolicy::Skip => {
                            if in_flight.swap(true, Ordering::AcqRel) {
                                skipped.fetch_add(1, Ordering::Relaxed);
                                debug!(point = id, "Previous read still running, tick skipped");
                                continue;
                            }
                            Some(InFlight(Arc::clone(&in_flight)))
                        },
                        OverlapPolicy::Allow => None,
                    };

                    let scheduler = self.clone();
                    ticks.spawn(async move {
                        let _guard = guard;
                        scheduler.tick(id).await;
                    });
                },
            }
        }

        // In-flight reads finish and write their status
        while ticks.join_next().await.is_some() {}
    }

    async fn tick(&self, id: PointId) {
        match self.poll_once(id).await {
            Ok(()) => {},
            Err(e @ AcqError::ConfigInconsistency(_)) => {
                warn!(point = id, "Point skipped: {}", e);
            },
            Err(e) => warn!(point = id, "Poll failed: {}", e),
        }
    }

    /// Poll period of every running loop
    pub fn active_loops(&self) -> BTreeMap<PointId, Duration> {
        self.inner
            .loops
            .iter()
            .map(|entry| (*entry.key(), entry.value().period))
            .collect()
    }

    /// Ticks dropped because the previous read of the point was still running
    pub fn skipped_ticks(&self, id: PointId) -> Option<u64> {
        self.inner
            .loops
            .get(&id)
            .map(|l| l.skipped.load(Ordering::Relaxed))
    }

    /// Stop the monitor and every loop, letting in-flight reads finish
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let monitor = self.inner.monitor.lock().take();
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                warn!("Point monitor ended abnormally: {}", e);
            }
        }

        let ids: Vec<PointId> = self.inner.loops.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, poll_loop)) = self.inner.loops.remove(&id) {
                self.stop_loop(id, poll_loop, false).await;
            }
        }
        info!("Poll scheduler stopped");
    }
}
