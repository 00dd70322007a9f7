//! Device registry with a TTL snapshot cache
//!
//! The registry is the long-lived store keyed by IP; reads and writes
//! serialize through a reader-writer lock, giving linearizable
//! read-after-write per key. The cache is separate: one atomic snapshot
//! taken at scan end, valid as a whole until a single expiry instant.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::models::{Device, ProtocolKind};

#[derive(Debug, Default)]
struct CacheSnapshot {
    devices: Vec<Device>,
    expires_at: Option<DateTime<Utc>>,
    last_scan: Option<DateTime<Utc>>,
}

/// Thread-safe registry of discovered devices
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
    cache: Mutex<CacheSnapshot>,
    cache_ttl: Duration,
}

impl DeviceRegistry {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            cache: Mutex::new(CacheSnapshot::default()),
            cache_ttl,
        }
    }

    /// Insert a device, or merge it into the existing entry for its IP.
    /// `last_seen` always advances to now.
    pub async fn add_device(&self, device: Device) {
        let mut devices = self.devices.write().await;
        let now = Utc::now();
        match devices.get_mut(&device.ip) {
            Some(existing) => {
                existing.merge_from(&device);
                existing.last_seen = now;
            }
            None => {
                devices.insert(device.ip.clone(), device);
            }
        }
    }

    pub async fn get_device(&self, ip: &str) -> Option<Device> {
        self.devices.read().await.get(ip).cloned()
    }

    pub async fn all_devices(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn remove_device(&self, ip: &str) -> bool {
        self.devices.write().await.remove(ip).is_some()
    }

    /// Apply `update` to the device at `ip`; bumps `last_seen` and reports
    /// whether the device existed.
    pub async fn update_device<F>(&self, ip: &str, update: F) -> bool
    where
        F: FnOnce(&mut Device),
    {
        let mut devices = self.devices.write().await;
        match devices.get_mut(ip) {
            Some(device) => {
                update(device);
                device.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn clear(&self) {
        self.devices.write().await.clear();
    }

    /// Devices matching a predicate
    pub async fn filter<F>(&self, predicate: F) -> Vec<Device>
    where
        F: Fn(&Device) -> bool,
    {
        self.devices
            .read()
            .await
            .values()
            .filter(|device| predicate(device))
            .cloned()
            .collect()
    }

    /// Devices exposing the given protocol family
    pub async fn devices_by_protocol(&self, kind: ProtocolKind) -> Vec<Device> {
        self.filter(|device| device.has_protocol(kind)).await
    }

    /// Devices with at least one verified RTSP stream
    pub async fn devices_with_rtsp_streams(&self) -> Vec<Device> {
        self.filter(|device| !device.rtsp_streams.is_empty()).await
    }

    /// Replace the cache with a fresh snapshot of `devices`, all stamped
    /// with one expiry instant.
    pub async fn save_snapshot(&self, devices: Vec<Device>) {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(0));
        let mut cache = self.cache.lock().await;
        cache.devices = devices;
        cache.last_scan = Some(now);
        cache.expires_at = Some(now + ttl);
    }

    /// The cached scan results, or `None` once the snapshot expired.
    /// Expiry is all-or-nothing: only `expires_at` decides absence, so a
    /// saved scan that found nothing still reads as a valid (empty) result.
    pub async fn snapshot(&self) -> Option<Vec<Device>> {
        let cache = self.cache.lock().await;
        let expires_at = cache.expires_at?;
        if Utc::now() >= expires_at {
            return None;
        }
        Some(cache.devices.clone())
    }

    pub async fn clear_cache(&self) {
        let mut cache = self.cache.lock().await;
        *cache = CacheSnapshot::default();
    }

    pub async fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.cache.lock().await.last_scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Protocol, RtspStreamInfo};

    fn device_with(ip: &str, kind: ProtocolKind, port: u16) -> Device {
        let mut device = Device::new(ip);
        device.add_protocol(Protocol::new(kind, port, format!("{kind}://{ip}:{port}")));
        device
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));
        registry
            .add_device(device_with("10.0.0.5", ProtocolKind::Rtsp, 554))
            .await;

        let device = registry.get_device("10.0.0.5").await.unwrap();
        assert_eq!(device.ip, "10.0.0.5");
        assert_eq!(registry.device_count().await, 1);
        assert!(registry.get_device("10.0.0.6").await.is_none());
    }

    #[tokio::test]
    async fn re_adding_merges_and_advances_last_seen() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));
        registry
            .add_device(device_with("10.0.0.5", ProtocolKind::Rtsp, 554))
            .await;
        let before = registry.get_device("10.0.0.5").await.unwrap();

        registry
            .add_device(device_with("10.0.0.5", ProtocolKind::Onvif, 80))
            .await;
        let after = registry.get_device("10.0.0.5").await.unwrap();

        assert_eq!(after.protocols.len(), 2);
        assert!(after.last_seen >= before.last_seen);
        assert!(after.discovered_at <= after.last_seen);
        assert_eq!(registry.device_count().await, 1);
    }

    #[tokio::test]
    async fn protocol_filter() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));
        registry
            .add_device(device_with("10.0.0.5", ProtocolKind::Rtsp, 554))
            .await;
        registry
            .add_device(device_with("10.0.0.9", ProtocolKind::Upnp, 49152))
            .await;

        let rtsp = registry.devices_by_protocol(ProtocolKind::Rtsp).await;
        assert_eq!(rtsp.len(), 1);
        assert_eq!(rtsp[0].ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn rtsp_stream_filter() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));

        let mut camera = device_with("10.0.0.5", ProtocolKind::Rtsp, 554);
        camera.rtsp_streams.push(RtspStreamInfo {
            url: "rtsp://10.0.0.5/stream1".to_string(),
            available: true,
            ..RtspStreamInfo::default()
        });
        registry.add_device(camera).await;
        registry
            .add_device(device_with("10.0.0.6", ProtocolKind::Rtsp, 554))
            .await;

        let with_streams = registry.devices_with_rtsp_streams().await;
        assert_eq!(with_streams.len(), 1);
        assert_eq!(with_streams[0].ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn update_device_bumps_last_seen() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));
        registry
            .add_device(device_with("10.0.0.5", ProtocolKind::Rtsp, 554))
            .await;

        let updated = registry
            .update_device("10.0.0.5", |device| {
                device.model = "DS-2CD2042".to_string();
            })
            .await;
        assert!(updated);
        assert_eq!(
            registry.get_device("10.0.0.5").await.unwrap().model,
            "DS-2CD2042"
        );
        assert!(!registry.update_device("10.0.0.99", |_| {}).await);
    }

    #[tokio::test]
    async fn snapshot_expires_as_a_whole() {
        let registry = DeviceRegistry::new(Duration::from_millis(40));
        registry
            .save_snapshot(vec![
                device_with("10.0.0.5", ProtocolKind::Rtsp, 554),
                device_with("10.0.0.9", ProtocolKind::Upnp, 49152),
            ])
            .await;

        let cached = registry.snapshot().await.unwrap();
        assert_eq!(cached.len(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn empty_cache_reads_absent() {
        let registry = DeviceRegistry::new(Duration::from_secs(60));
        assert!(registry.snapshot().await.is_none());
        assert!(registry.last_scan_at().await.is_none());

        registry.save_snapshot(vec![device_with("10.0.0.5", ProtocolKind::Rtsp, 554)]).await;
        assert!(registry.last_scan_at().await.is_some());

        registry.clear_cache().await;
        assert!(registry.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn empty_but_unexpired_snapshot_reads_present() {
        // A scan that found no devices is still a valid cached result;
        // absence is decided by the expiry instant alone.
        let registry = DeviceRegistry::new(Duration::from_millis(40));
        registry.save_snapshot(Vec::new()).await;

        let cached = registry.snapshot().await;
        assert!(matches!(cached, Some(ref devices) if devices.is_empty()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(registry.snapshot().await.is_none());
    }
}
