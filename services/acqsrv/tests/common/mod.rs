//! Shared fixtures for acqsrv integration tests
#![allow(dead_code, clippy::disallowed_methods)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acq_calc::{RawData, ReadFunction};
use acq_model::{
    DataPoint, Device, DeviceCode, DeviceMeta, HttpRead, ModbusRead, PointMeta, ValueFormat,
};
use acqsrv::{AcqError, AcqsrvConfig, DeviceSession, SessionConnector};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

/// One recorded read: which device, which address, when it started and ended
#[derive(Debug, Clone, Copy)]
pub struct ReadSpan {
    pub device: DeviceCode,
    pub address: u16,
    pub start: Instant,
    pub end: Instant,
}

#[derive(Default)]
struct Shared {
    /// Remaining connect failures per device; `u32::MAX` fails forever
    connect_failures: Mutex<HashMap<DeviceCode, u32>>,
    connects: Mutex<Vec<(DeviceCode, Instant)>>,
    registers: Mutex<HashMap<u16, Vec<u16>>>,
    reads: Mutex<Vec<ReadSpan>>,
    in_flight: Mutex<HashMap<DeviceCode, usize>>,
    max_in_flight: Mutex<HashMap<DeviceCode, usize>>,
    read_delay: Mutex<Duration>,
    fail_reads: AtomicBool,
    closes: AtomicUsize,
}

/// Scripted connector: programmable connect outcomes and register values,
/// records every connect and read
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<Shared>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_delay(self, delay: Duration) -> Self {
        *self.shared.read_delay.lock() = delay;
        self
    }

    pub fn fail_connects(&self, device: DeviceCode, times: u32) {
        self.shared.connect_failures.lock().insert(device, times);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.shared.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_registers(&self, address: u16, words: Vec<u16>) {
        self.shared.registers.lock().insert(address, words);
    }

    pub fn connects(&self, device: DeviceCode) -> Vec<Instant> {
        self.shared
            .connects
            .lock()
            .iter()
            .filter(|(d, _)| *d == device)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn reads(&self) -> Vec<ReadSpan> {
        self.shared.reads.lock().clone()
    }

    pub fn reads_at(&self, address: u16) -> usize {
        self.shared
            .reads
            .lock()
            .iter()
            .filter(|r| r.address == address)
            .count()
    }

    /// Highest number of simultaneous reads seen on a device
    pub fn max_concurrent_reads(&self, device: DeviceCode) -> usize {
        self.shared
            .max_in_flight
            .lock()
            .get(&device)
            .copied()
            .unwrap_or(0)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(
        &self,
        device: &Device,
        _timeout: Duration,
    ) -> acqsrv::Result<Box<dyn DeviceSession>> {
        self.shared.connects.lock().push((device.code, Instant::now()));

        {
            let mut failures = self.shared.connect_failures.lock();
            if let Some(remaining) = failures.get_mut(&device.code) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(AcqError::connection(format!(
                        "device {} refused connection",
                        device.code
                    )));
                }
            }
        }

        Ok(Box::new(ScriptedSession {
            device: device.code,
            shared: Arc::clone(&self.shared),
            open: true,
        }))
    }
}

struct ScriptedSession {
    device: DeviceCode,
    shared: Arc<Shared>,
    open: bool,
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn read(
        &mut self,
        _unit_id: u8,
        function: ReadFunction,
        address: u16,
        quantity: u16,
    ) -> acqsrv::Result<RawData> {
        let start = Instant::now();
        {
            let mut in_flight = self.shared.in_flight.lock();
            let count = in_flight.entry(self.device).or_insert(0);
            *count += 1;
            let mut max = self.shared.max_in_flight.lock();
            let seen = max.entry(self.device).or_insert(0);
            *seen = (*seen).max(*count);
        }

        let delay = *self.shared.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut in_flight = self.shared.in_flight.lock();
            if let Some(count) = in_flight.get_mut(&self.device) {
                *count -= 1;
            }
        }
        self.shared.reads.lock().push(ReadSpan {
            device: self.device,
            address,
            start,
            end: Instant::now(),
        });

        if self.shared.fail_reads.load(Ordering::SeqCst) {
            self.open = false;
            return Err(AcqError::connection("connection reset by peer"));
        }

        let words = self
            .shared
            .registers
            .lock()
            .get(&address)
            .cloned()
            .unwrap_or_else(|| vec![0; quantity as usize]);
        if function.returns_bits() {
            Ok(RawData::Bits(words.iter().map(|w| *w != 0).collect()))
        } else {
            Ok(RawData::Words(words))
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn tcp_device(code: DeviceCode) -> Device {
    Device {
        code,
        name: format!("plc-{code}"),
        is_active: true,
        timeout: Some(1),
        meta: DeviceMeta::ModbusTcp {
            host: "127.0.0.1".into(),
            port: 1502,
        },
        last_connect: None,
    }
}

pub fn http_device(code: DeviceCode, url: &str) -> Device {
    Device {
        code,
        name: format!("api-{code}"),
        is_active: true,
        timeout: Some(1),
        meta: DeviceMeta::Http { url: url.into() },
        last_connect: None,
    }
}

pub fn modbus_read(address: u16) -> ModbusRead {
    ModbusRead {
        unit_id: 1,
        modbus_function: "readHoldingRegisters".into(),
        data_address: address,
        length_address: 1,
        format: Some(ValueFormat::Uint16),
        swap_words: false,
        swap_bytes: false,
        is_reading: true,
        convert: None,
        accumulate: None,
    }
}

pub fn modbus_point(id: i64, device: DeviceCode, interval: u64, read: ModbusRead) -> DataPoint {
    DataPoint {
        id,
        code: id * 100,
        device_code: device,
        name: format!("point-{id}"),
        is_active: true,
        scheduler_interval: interval,
        meta: PointMeta::ModbusTcp(read),
        cached_last_value: None,
    }
}

pub fn http_point(id: i64, device: DeviceCode, url: &str) -> DataPoint {
    DataPoint {
        id,
        code: id * 100,
        device_code: device,
        name: format!("http-{id}"),
        is_active: true,
        scheduler_interval: 1,
        meta: PointMeta::Http(HttpRead {
            url: url.into(),
            is_reading: true,
            accumulate: None,
        }),
        cached_last_value: None,
    }
}

/// Defaults with fast reconciliation, suitable for paused-time tests
pub fn test_config() -> AcqsrvConfig {
    let mut config = AcqsrvConfig::default();
    config.connection.check_interval_secs = 10;
    config.connection.initial_delay_ms = 1_000;
    config.connection.max_delay_ms = 30_000;
    config.scheduler.reconcile_interval_ms = 2_000;
    config
}

/// Let spawned tasks run without moving the paused clock much
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
