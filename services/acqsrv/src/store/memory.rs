//! In-memory configuration store

use std::sync::atomic::{AtomicUsize, Ordering};

use acq_model::{DataPoint, Device, DeviceCode, PointCode, PointId, PointStatus, Reading};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::ConfigStore;

/// DashMap-backed store, edited directly by tests and tools
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: DashMap<DeviceCode, Device>,
    points: DashMap<PointId, DataPoint>,
    statuses: DashMap<PointCode, PointStatus>,
    status_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_device(&self, device: Device) {
        self.devices.insert(device.code, device);
    }

    pub fn remove_device(&self, code: DeviceCode) {
        self.devices.remove(&code);
    }

    pub fn upsert_point(&self, point: DataPoint) {
        self.points.insert(point.id, point);
    }

    pub fn remove_point(&self, id: PointId) {
        self.points.remove(&id);
    }

    /// Flip `is_active` of a point, returning false if it does not exist
    pub fn set_point_active(&self, id: PointId, active: bool) -> bool {
        match self.points.get_mut(&id) {
            Some(mut point) => {
                point.is_active = active;
                true
            },
            None => false,
        }
    }

    pub fn set_device_active(&self, code: DeviceCode, active: bool) -> bool {
        match self.devices.get_mut(&code) {
            Some(mut device) => {
                device.is_active = active;
                true
            },
            None => false,
        }
    }

    /// Number of `save_status` calls so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn active_devices(&self) -> Result<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|d| d.is_active)
            .map(|d| d.clone())
            .collect();
        devices.sort_by_key(|d| d.code);
        Ok(devices)
    }

    async fn device(&self, code: DeviceCode) -> Result<Option<Device>> {
        Ok(self.devices.get(&code).map(|d| d.clone()))
    }

    async fn record_device_connect(&self, code: DeviceCode, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut device) = self.devices.get_mut(&code) {
            device.last_connect = Some(at);
        }
        Ok(())
    }

    async fn active_points(&self) -> Result<Vec<DataPoint>> {
        let mut points: Vec<DataPoint> = self
            .points
            .iter()
            .filter(|p| p.is_active)
            .map(|p| p.clone())
            .collect();
        points.sort_by_key(|p| p.id);
        Ok(points)
    }

    async fn all_points(&self) -> Result<Vec<DataPoint>> {
        let mut points: Vec<DataPoint> = self.points.iter().map(|p| p.clone()).collect();
        points.sort_by_key(|p| p.id);
        Ok(points)
    }

    async fn point(&self, id: PointId) -> Result<Option<DataPoint>> {
        Ok(self.points.get(&id).map(|p| p.clone()))
    }

    async fn cache_point_value(&self, id: PointId, value: &Reading) -> Result<()> {
        let mut point = self
            .points
            .get_mut(&id)
            .ok_or_else(|| anyhow!("data point {id} not found"))?;
        point.cached_last_value = Some(value.clone());
        Ok(())
    }

    async fn status_get_or_create(&self, point: PointCode) -> Result<PointStatus> {
        Ok(self
            .statuses
            .entry(point)
            .or_insert_with(|| PointStatus::new(point))
            .clone())
    }

    async fn status(&self, point: PointCode) -> Result<Option<PointStatus>> {
        Ok(self.statuses.get(&point).map(|s| s.clone()))
    }

    async fn save_status(&self, status: &PointStatus) -> Result<()> {
        self.statuses.insert(status.point_code, status.clone());
        self.status_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use acq_model::{DeviceMeta, PointMeta};

    fn device(code: DeviceCode, active: bool) -> Device {
        Device {
            code,
            name: format!("dev-{code}"),
            is_active: active,
            timeout: None,
            meta: DeviceMeta::Http {
                url: "http://localhost".into(),
            },
            last_connect: None,
        }
    }

    #[tokio::test]
    async fn test_active_filter() {
        let store = MemoryStore::new();
        store.upsert_device(device(1, true));
        store.upsert_device(device(2, false));

        let active = store.active_devices().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].code, 1);
        assert!(store.device(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_status_get_or_create() {
        let store = MemoryStore::new();
        assert!(store.status(9).await.unwrap().is_none());

        let mut status = store.status_get_or_create(9).await.unwrap();
        assert_eq!(status.point_code, 9);
        status.failure_count = 3;
        store.save_status(&status).await.unwrap();

        assert_eq!(store.status_get_or_create(9).await.unwrap().failure_count, 3);
        assert_eq!(store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_cache_point_value() {
        let store = MemoryStore::new();
        store.upsert_point(DataPoint {
            id: 1,
            code: 100,
            device_code: 1,
            name: "p".into(),
            is_active: true,
            scheduler_interval: 1,
            meta: PointMeta::Unsupported,
            cached_last_value: None,
        });

        store.cache_point_value(1, &Reading::Integer(4)).await.unwrap();
        let point = store.point(1).await.unwrap().unwrap();
        assert_eq!(point.cached_last_value, Some(Reading::Integer(4)));
        assert!(store.cache_point_value(2, &Reading::Integer(4)).await.is_err());
    }
}
