//! One poll of one data point

use acq_calc::{decode, derive, ReadFunction};
use acq_model::{
    AccumulateRule, ConvertMeta, DataPoint, Device, HttpRead, ModbusRead, PointId, PointMeta,
    PointStatus, Reading,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::PollScheduler;
use crate::error::{AcqError, Result};

impl PollScheduler {
    /// Poll a point once: read, decode, transform and persist its status
    ///
    /// The point is re-read from the store first, so configuration edits apply
    /// from the next tick. A point whose device is missing, inactive or of a
    /// different kind fails with `ConfigInconsistency` and leaves its status
    /// untouched.
    pub async fn poll_once(&self, id: PointId) -> Result<()> {
        let Some(point) = self.inner.store.point(id).await? else {
            debug!(point = id, "Point no longer exists");
            return Ok(());
        };
        if !point.is_active {
            return Ok(());
        }

        match &point.meta {
            PointMeta::ModbusTcp(read) | PointMeta::ModbusSerial(read) => {
                let device = self.device_for(&point).await?;
                self.poll_modbus(&point, &device, read).await
            },
            PointMeta::Http(read) => {
                let device = self.device_for(&point).await?;
                self.poll_http(&point, &device, read).await
            },
            PointMeta::Unsupported => {
                warn!(point = id, "Point kind is not supported, nothing to read");
                Ok(())
            },
        }
    }

    async fn device_for(&self, point: &DataPoint) -> Result<Device> {
        let device = self
            .inner
            .store
            .device(point.device_code)
            .await?
            .ok_or_else(|| {
                AcqError::config_inconsistency(format!(
                    "point {} references missing device {}",
                    point.code, point.device_code
                ))
            })?;

        if !device.is_active {
            return Err(AcqError::config_inconsistency(format!(
                "point {} references inactive device {}",
                point.code, device.code
            )));
        }
        if device.kind() != point.kind() {
            return Err(AcqError::config_inconsistency(format!(
                "point {} is {} but device {} is {}",
                point.code,
                point.kind(),
                device.code,
                device.kind()
            )));
        }
        Ok(device)
    }

    async fn poll_modbus(&self, point: &DataPoint, device: &Device, read: &ModbusRead) -> Result<()> {
        let mut status = self.inner.store.status_get_or_create(point.code).await?;

        let outcome = self.read_modbus(device, read).await;
        let at = Utc::now();
        match outcome {
            Ok(reading) => {
                debug!(point = point.id, "{} -> {}", point.name, reading);
                self.apply_reading(
                    point,
                    &mut status,
                    reading,
                    read.is_reading,
                    read.convert.as_ref(),
                    read.accumulate.as_ref(),
                    at,
                );
            },
            Err(e @ AcqError::ConfigInconsistency(_)) => return Err(e),
            Err(e) => {
                warn!(point = point.id, "Read of {} failed: {}", point.name, e);
                status.record_failure(e.to_string(), at);
            },
        }

        self.inner.store.save_status(&status).await?;
        Ok(())
    }

    /// Read and decode under the device lock
    ///
    /// Uses the managed session when it is connected, otherwise a short-lived
    /// session that is always closed before the lock is released.
    async fn read_modbus(&self, device: &Device, read: &ModbusRead) -> Result<Reading> {
        let function: ReadFunction = read.modbus_function.parse()?;
        let quantity = function.request_quantity(read.length_address);
        let timeout = device.timeout_or(self.inner.connections.default_timeout());

        let mut lease = self
            .inner
            .connections
            .lock_device(device.code)
            .await
            .ok_or_else(|| {
                AcqError::config_inconsistency(format!(
                    "device {} is not under connection management yet",
                    device.code
                ))
            })?;

        let managed = match lease.managed_session().await {
            Some(session) => {
                let result = session
                    .read(read.unit_id, function, read.data_address, quantity)
                    .await;
                Some((result, session.is_open()))
            },
            None => None,
        };

        let raw = match managed {
            Some((Ok(raw), _)) => raw,
            Some((Err(e), still_open)) => {
                if e.is_retryable() && !still_open {
                    lease.invalidate(&e.to_string()).await;
                }
                return Err(e);
            },
            None => {
                let mut session = self.inner.connector.connect(device, timeout).await?;
                let result = session
                    .read(read.unit_id, function, read.data_address, quantity)
                    .await;
                session.close().await;
                result?
            },
        };
        drop(lease);

        Ok(decode(&raw, read.format, read.swap_words, read.swap_bytes)?)
    }

    async fn poll_http(&self, point: &DataPoint, device: &Device, read: &HttpRead) -> Result<()> {
        let timeout = device.timeout_or(self.inner.connections.default_timeout());
        let mut status = self.inner.store.status_get_or_create(point.code).await?;

        let outcome = self.inner.http.fetch(&read.url, timeout).await;
        let at = Utc::now();
        match outcome {
            Ok(Some(reading)) => {
                debug!(point = point.id, "{} -> {}", point.name, reading);
                if let Err(e) = self.inner.store.cache_point_value(point.id, &reading).await {
                    warn!(point = point.id, "Failed to cache value: {}", e);
                }
                self.apply_reading(
                    point,
                    &mut status,
                    reading,
                    read.is_reading,
                    None,
                    read.accumulate.as_ref(),
                    at,
                );
            },
            Ok(None) => status.record_failure("empty response", at),
            Err(e) => {
                warn!(point = point.id, "HTTP read of {} failed: {}", point.name, e);
                status.record_failure(e.to_string(), at);
            },
        }

        self.inner.store.save_status(&status).await?;
        Ok(())
    }

    /// Derive, accumulate and record a successful reading
    ///
    /// A transform failure keeps the raw reading with no derived value and
    /// leaves the error in the status note.
    #[allow(clippy::too_many_arguments)]
    fn apply_reading(
        &self,
        point: &DataPoint,
        status: &mut PointStatus,
        reading: Reading,
        is_reading: bool,
        convert: Option<&ConvertMeta>,
        accumulate: Option<&AccumulateRule>,
        at: DateTime<Utc>,
    ) {
        let (derived, transform_error) = match derive(&reading, is_reading, convert) {
            Ok(value) => (value, None),
            Err(e) => {
                let err = AcqError::from(e);
                warn!(point = point.id, "{}", err);
                (None, Some(err.to_string()))
            },
        };

        let accumulated = accumulate.and_then(|rule| {
            let accumulator = &self.inner.accumulator;
            match derived.or_else(|| reading.as_f64()) {
                Some(value) => accumulator.apply(point.code, rule, value, at),
                None => accumulator.current(point.code, rule.window, at),
            }
        });

        status.record_success(reading, derived, at);
        status.accumulated = accumulated;
        if transform_error.is_some() {
            status.note = transform_error;
        }
    }
}
