//! Connection manager
//!
//! Keeps one long-lived session per active Modbus device and reconnects it with
//! capped exponential backoff.
//!
//! ```text
//!        reconcile (every check_interval)
//!                  │
//!   ┌──────────────┼───────────────────────────┐
//!   ▼              ▼                           ▼
//! removed        new device               existing device
//! close+drop     insert + connect         refresh record, connect if idle
//!
//!   connect ──ok──► connected (retries = 0, lastConnect persisted)
//!      │
//!      └─err──► retries += 1 ──► sleep(min(initial·2^(retries-1), max)) ──► connect
//! ```
//!
//! Each device owns an async mutex around its session slot. Holding it (a
//! [`DeviceLease`]) is the only way to talk to the device, which serializes
//! every request to one device across all data points.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use acq_model::{Device, DeviceCode};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::ReconnectPolicy;
use crate::error::Result;
use crate::protocols::{DeviceSession, SessionConnector};
use crate::store::ConfigStore;

const EVENT_CAPACITY: usize = 64;

type SessionSlot = Option<Box<dyn DeviceSession>>;

/// Connection health of one device, as reported to status consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub connected: bool,
    /// Consecutive failed connection attempts
    pub retries: u32,
    pub last_error: Option<String>,
    /// A connection attempt is in flight
    pub reconnecting: bool,
}

/// Connection state changes, broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(DeviceCode),
    Disconnected { device: DeviceCode, error: String },
}

#[derive(Debug)]
struct ConnectionState {
    device: Device,
    connected: bool,
    retries: u32,
    last_error: Option<String>,
    reconnecting: bool,
    /// A backoff timer is armed
    retry_pending: bool,
    /// Bounded policy exhausted; only reconciliation or a disconnect clears it
    gave_up: bool,
    /// Bumped by explicit disconnects; stale timers compare against it
    generation: u64,
}

struct Connection {
    session: Arc<Mutex<SessionSlot>>,
    state: parking_lot::Mutex<ConnectionState>,
    /// Cancelled when the device leaves the managed set
    lifetime: CancellationToken,
}

impl Connection {
    fn health(&self) -> ConnectionHealth {
        let state = self.state.lock();
        ConnectionHealth {
            connected: state.connected,
            retries: state.retries,
            last_error: state.last_error.clone(),
            reconnecting: state.reconnecting,
        }
    }

    /// Whether a new attempt may start right now
    fn is_idle(&self) -> bool {
        let state = self.state.lock();
        !state.connected && !state.reconnecting && !state.retry_pending && !state.gave_up
    }
}

struct Inner {
    store: Arc<dyn ConfigStore>,
    connector: Arc<dyn SessionConnector>,
    policy: ReconnectPolicy,
    default_timeout: Duration,
    check_interval: Duration,
    connections: DashMap<DeviceCode, Arc<Connection>>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: CancellationToken,
    monitor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Owner of all managed device sessions
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("devices", &self.inner.connections.len())
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn SessionConnector>,
        policy: ReconnectPolicy,
        default_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                connector,
                policy,
                default_timeout,
                check_interval,
                connections: DashMap::new(),
                events,
                shutdown: CancellationToken::new(),
                monitor: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Reconcile once, then keep reconciling every `check_interval`
    pub async fn start(&self) {
        if let Err(e) = self.reconcile().await {
            error!("Initial device reconciliation failed: {}", e);
        }

        let manager = self.clone();
        let token = self.inner.shutdown.clone();
        let period = self.inner.check_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = manager.reconcile().await {
                            error!("Device reconciliation failed: {}", e);
                        }
                    },
                }
            }
            debug!("Connection monitor stopped");
        });
        *self.inner.monitor.lock() = Some(handle);
        info!("Connection manager started (check every {:?})", period);
    }

    /// Converge the managed set onto the store's active Modbus devices
    pub async fn reconcile(&self) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Ok(());
        }

        let active: HashMap<DeviceCode, Device> = self
            .inner
            .store
            .active_devices()
            .await?
            .into_iter()
            .filter(|d| d.kind().is_managed())
            .map(|d| (d.code, d))
            .collect();

        let removed: Vec<DeviceCode> = self
            .inner
            .connections
            .iter()
            .map(|entry| *entry.key())
            .filter(|code| !active.contains_key(code))
            .collect();
        for code in removed {
            self.remove(code).await;
        }

        for (code, device) in active {
            let existing = self.inner.connections.get(&code).map(|c| Arc::clone(&c));
            match existing {
                Some(conn) => {
                    let endpoint_changed = {
                        let mut state = conn.state.lock();
                        let changed =
                            state.device.meta != device.meta || state.device.timeout != device.timeout;
                        state.device = device;
                        state.gave_up = false;
                        changed
                    };
                    if endpoint_changed {
                        info!(device = code, "Connection parameters changed, reconnecting");
                        self.disconnect_server(code).await;
                    }
                    if conn.is_idle() {
                        tokio::spawn(self.connect_server(code));
                    }
                },
                None => {
                    info!(device = code, "Managing device {} ({})", device.label(), device.meta.endpoint());
                    let conn = Arc::new(Connection {
                        session: Arc::new(Mutex::new(None)),
                        state: parking_lot::Mutex::new(ConnectionState {
                            device,
                            connected: false,
                            retries: 0,
                            last_error: None,
                            reconnecting: false,
                            retry_pending: false,
                            gave_up: false,
                            generation: 0,
                        }),
                        lifetime: self.inner.shutdown.child_token(),
                    });
                    self.inner.connections.insert(code, conn);
                    tokio::spawn(self.connect_server(code));
                },
            }
        }
        Ok(())
    }

    async fn remove(&self, code: DeviceCode) {
        let Some((_, conn)) = self.inner.connections.remove(&code) else {
            return;
        };
        conn.lifetime.cancel();

        let mut slot = conn.session.lock().await;
        if let Some(mut session) = slot.take() {
            session.close().await;
        }
        info!(device = code, "Device no longer active, connection closed");
    }

    /// Attempt one connection to `code`, scheduling a retry on failure
    ///
    /// Returns immediately if an attempt is already in flight. The future is
    /// boxed because the retry timer calls back into this method.
    pub fn connect_server(&self, code: DeviceCode) -> BoxFuture<'static, ()> {
        let manager = self.clone();
        async move { manager.attempt(code, None).await }.boxed()
    }

    async fn attempt(&self, code: DeviceCode, generation: Option<u64>) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let Some(conn) = self.inner.connections.get(&code).map(|c| Arc::clone(&c)) else {
            return;
        };

        let device = {
            let mut state = conn.state.lock();
            if generation.is_some_and(|g| g != state.generation) {
                return;
            }
            if generation.is_some() {
                state.retry_pending = false;
            }
            if state.reconnecting || state.retry_pending {
                debug!(device = code, "Connection attempt already pending");
                return;
            }
            state.reconnecting = true;
            state.device.clone()
        };
        let timeout = device.timeout_or(self.inner.default_timeout);

        let mut slot = conn.session.lock().await;
        if let Some(mut stale) = slot.take() {
            stale.close().await;
        }

        match self.inner.connector.connect(&device, timeout).await {
            Ok(mut session) => {
                if conn.lifetime.is_cancelled() {
                    session.close().await;
                    return;
                }
                *slot = Some(session);
                drop(slot);

                {
                    let mut state = conn.state.lock();
                    state.connected = true;
                    state.retries = 0;
                    state.last_error = None;
                    state.reconnecting = false;
                    state.gave_up = false;
                }
                info!(device = code, "Connected to {} ({})", device.label(), device.meta.endpoint());
                let _ = self.inner.events.send(ConnectionEvent::Connected(code));

                if let Err(e) = self.inner.store.record_device_connect(code, Utc::now()).await {
                    warn!(device = code, "Failed to persist connect time: {}", e);
                }
            },
            Err(e) => {
                drop(slot);
                let message = e.to_string();

                let (retries, schedule, generation) = {
                    let mut state = conn.state.lock();
                    state.connected = false;
                    state.retries = state.retries.saturating_add(1);
                    state.last_error = Some(message.clone());
                    state.reconnecting = false;
                    let schedule =
                        self.inner.policy.allows_retry(state.retries) && !conn.lifetime.is_cancelled();
                    state.retry_pending = schedule;
                    state.gave_up = !schedule && !conn.lifetime.is_cancelled();
                    (state.retries, schedule, state.generation)
                };
                let _ = self.inner.events.send(ConnectionEvent::Disconnected {
                    device: code,
                    error: message.clone(),
                });

                if schedule {
                    let delay = self.inner.policy.delay_for(retries);
                    warn!(
                        device = code,
                        "Connection to {} failed (attempt {}): {}. Retrying in {:?}",
                        device.label(),
                        retries,
                        message,
                        delay
                    );
                    self.schedule_retry(code, conn.lifetime.clone(), delay, generation);
                } else {
                    warn!(
                        device = code,
                        "Connection to {} failed (attempt {}): {}. Giving up until next check",
                        device.label(),
                        retries,
                        message
                    );
                }
            },
        }
    }

    fn schedule_retry(
        &self,
        code: DeviceCode,
        lifetime: CancellationToken,
        delay: Duration,
        generation: u64,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = lifetime.cancelled() => {},
                _ = tokio::time::sleep(delay) => manager.retry(code, generation).await,
            }
        });
    }

    fn retry(&self, code: DeviceCode, generation: u64) -> BoxFuture<'static, ()> {
        let manager = self.clone();
        async move { manager.attempt(code, Some(generation)).await }.boxed()
    }

    /// Start a connection attempt if the device is idle, without waiting for it
    fn trigger(&self, code: DeviceCode, conn: &Connection) {
        if conn.is_idle() && !conn.lifetime.is_cancelled() {
            tokio::spawn(self.connect_server(code));
        }
    }

    /// Current managed session of a device, if it is connected
    ///
    /// Never waits for a connection: a device that is not connected yields
    /// `None` and gets a connection attempt in the background. A session found
    /// closed is discarded the same way. The returned lease holds the device
    /// lock; it waits only for another request to the same device to finish.
    pub async fn get_client(&self, code: DeviceCode) -> Option<DeviceLease> {
        let conn = self.inner.connections.get(&code).map(|c| Arc::clone(&c))?;
        let connected = conn.state.lock().connected;
        if !connected {
            self.trigger(code, &conn);
            return None;
        }

        let mut lease = self.lease(code, conn).await;
        if lease.managed_session().await.is_some() {
            Some(lease)
        } else {
            None
        }
    }

    /// Exclusive access to a managed device, connected or not
    ///
    /// Returns `None` when the device is not under management.
    pub async fn lock_device(&self, code: DeviceCode) -> Option<DeviceLease> {
        let conn = self.inner.connections.get(&code).map(|c| Arc::clone(&c))?;
        Some(self.lease(code, conn).await)
    }

    async fn lease(&self, code: DeviceCode, conn: Arc<Connection>) -> DeviceLease {
        let guard = Arc::clone(&conn.session).lock_owned().await;
        DeviceLease {
            guard,
            code,
            conn,
            manager: self.clone(),
        }
    }

    /// Close a device's session and reset its counters
    ///
    /// The device stays managed; the next reconciliation reconnects it.
    pub async fn disconnect_server(&self, code: DeviceCode) {
        let Some(conn) = self.inner.connections.get(&code).map(|c| Arc::clone(&c)) else {
            return;
        };

        let mut slot = conn.session.lock().await;
        if let Some(mut session) = slot.take() {
            session.close().await;
        }
        drop(slot);

        let mut state = conn.state.lock();
        state.connected = false;
        state.retries = 0;
        state.last_error = None;
        state.reconnecting = false;
        state.retry_pending = false;
        state.gave_up = false;
        state.generation = state.generation.wrapping_add(1);
        info!(device = code, "Disconnected");
    }

    /// Probe a device: open a session and close it again
    pub async fn test_connection(&self, device: &Device) -> bool {
        let timeout = device.timeout_or(self.inner.default_timeout);
        match self.inner.connector.connect(device, timeout).await {
            Ok(mut session) => {
                session.close().await;
                info!(device = device.code, "Connection test to {} succeeded", device.meta.endpoint());
                true
            },
            Err(e) => {
                warn!(device = device.code, "Connection test to {} failed: {}", device.meta.endpoint(), e);
                false
            },
        }
    }

    /// Health of every managed device
    pub fn status(&self) -> BTreeMap<DeviceCode, ConnectionHealth> {
        self.inner
            .connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().health()))
            .collect()
    }

    pub fn health(&self, code: DeviceCode) -> Option<ConnectionHealth> {
        self.inner.connections.get(&code).map(|c| c.health())
    }

    /// Stop the monitor and retry timers and close every session
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let monitor = self.inner.monitor.lock().take();
        if let Some(handle) = monitor {
            if let Err(e) = handle.await {
                warn!("Connection monitor ended abnormally: {}", e);
            }
        }

        let codes: Vec<DeviceCode> = self.inner.connections.iter().map(|e| *e.key()).collect();
        for code in codes {
            self.remove(code).await;
        }
        info!("Connection manager stopped");
    }
}

/// Exclusive access to one device
///
/// Dropping the lease releases the device for the next request.
pub struct DeviceLease {
    guard: OwnedMutexGuard<SessionSlot>,
    code: DeviceCode,
    conn: Arc<Connection>,
    manager: ConnectionManager,
}

impl DeviceLease {
    pub fn device(&self) -> DeviceCode {
        self.code
    }

    /// The managed session, if it is connected and still open
    ///
    /// A stale session is closed, the device is marked disconnected and a
    /// reconnect is started in the background.
    pub async fn managed_session(&mut self) -> Option<&mut Box<dyn DeviceSession>> {
        let connected = self.conn.state.lock().connected;
        let open = self.guard.as_ref().is_some_and(|s| s.is_open());
        if !(connected && open) {
            if connected || self.guard.is_some() {
                self.invalidate("session closed").await;
            } else {
                self.manager.trigger(self.code, &self.conn);
            }
            return None;
        }
        self.guard.as_mut()
    }

    /// Drop the managed session after a transport failure
    pub async fn invalidate(&mut self, error: &str) {
        if let Some(mut session) = self.guard.take() {
            session.close().await;
        }
        {
            let mut state = self.conn.state.lock();
            state.connected = false;
            state.last_error = Some(error.to_string());
        }
        warn!(device = self.code, "Managed session dropped: {}", error);
        let _ = self.manager.inner.events.send(ConnectionEvent::Disconnected {
            device: self.code,
            error: error.to_string(),
        });
        self.manager.trigger(self.code, &self.conn);
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLease")
            .field("device", &self.code)
            .field("has_session", &self.guard.is_some())
            .finish()
    }
}
