//! Discovery orchestration
//!
//! The [`Detector`] fans out the TCP sweep and the two multicast
//! discoverers as concurrent tasks, funnels their devices through one
//! merge map keyed by IP, and returns the merged list. Individual path
//! failures degrade to partial results.

mod onvif;
mod probe;
mod sweep;
mod upnp;

pub use probe::is_open;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::cancel::CancelToken;
use crate::config::{RtspConfig, ScanConfig};
use crate::error::Result;
use crate::models::Device;

/// Shared merge map; the mutex is held only for the duration of one merge
type MergeMap = Arc<Mutex<HashMap<String, Device>>>;

/// Coordinates all discovery paths for one scan
pub struct Detector {
    scan: ScanConfig,
    rtsp: RtspConfig,
}

impl Detector {
    pub fn new(scan: ScanConfig, rtsp: RtspConfig) -> Self {
        Self { scan, rtsp }
    }

    /// Scan with a self-imposed overall deadline: the widest of the
    /// configured timeouts plus a margin. Hitting the deadline cancels
    /// in-flight work and returns whatever merged so far.
    pub async fn scan_with_timeout(&self, subnet: &str) -> Result<Vec<Device>> {
        let cancel = CancelToken::new();
        let deadline = self.overall_deadline();
        let trigger = cancel.clone();
        let guard = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(deadline = ?deadline, "Overall scan deadline hit, cancelling");
            trigger.cancel();
        });

        let result = self.scan(subnet, cancel).await;
        guard.abort();
        result
    }

    fn overall_deadline(&self) -> std::time::Duration {
        let widest = self
            .scan
            .port_timeout()
            .max(self.scan.discovery_timeout())
            .max(self.rtsp.timeout());
        widest + std::time::Duration::from_secs(30)
    }

    /// Scan `subnet` with every enabled discovery path and return the
    /// merged device list. Cancellation aborts pending work at the next
    /// dispatch or I/O boundary; whatever merged so far is returned.
    pub async fn scan(&self, subnet: &str, cancel: CancelToken) -> Result<Vec<Device>> {
        // A malformed subnet is fatal; anything after this point degrades
        // to partial results instead.
        crate::net::parse_subnet(subnet)?;

        tracing::info!(subnet = %subnet, "Starting comprehensive scan");

        let merged: MergeMap = Arc::new(Mutex::new(HashMap::new()));
        let semaphore = Arc::new(Semaphore::new(self.scan.max_concurrency));
        let mut tasks = Vec::new();

        {
            let scan = self.scan.clone();
            let rtsp = self.rtsp.clone();
            let subnet = subnet.to_string();
            let merged = merged.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                match sweep::sweep_subnet(&scan, &rtsp, &subnet, semaphore, cancel).await {
                    Ok(devices) => {
                        merge_all(&merged, devices).await;
                        Ok(())
                    }
                    Err(e) => Err(format!("network sweep failed: {e}")),
                }
            }));
        }

        if self.scan.enable_onvif && !cancel.is_cancelled() {
            let scan = self.scan.clone();
            let merged = merged.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                match onvif::discover(&scan, cancel).await {
                    Ok(devices) => {
                        merge_all(&merged, devices).await;
                        Ok(())
                    }
                    Err(e) => Err(format!("ONVIF discovery failed: {e}")),
                }
            }));
        }

        if self.scan.enable_upnp && !cancel.is_cancelled() {
            let scan = self.scan.clone();
            let merged = merged.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                match upnp::discover(&scan, cancel).await {
                    Ok(devices) => {
                        merge_all(&merged, devices).await;
                        Ok(())
                    }
                    Err(e) => Err(format!("UPnP discovery failed: {e}")),
                }
            }));
        }

        // A failed path costs its results, never the scan
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(warning)) => tracing::warn!("{warning}"),
                Err(e) => tracing::warn!(error = %e, "Discovery task panicked"),
            }
        }

        let devices: Vec<Device> = {
            let map = merged.lock().await;
            map.values().cloned().collect()
        };

        tracing::info!(devices = devices.len(), "Comprehensive scan complete");
        Ok(devices)
    }
}

/// Merge a batch of devices into the shared map, keyed by IP
async fn merge_all(merged: &MergeMap, devices: Vec<Device>) {
    let mut map = merged.lock().await;
    for device in devices {
        match map.get_mut(&device.ip) {
            Some(existing) => existing.merge_from(&device),
            None => {
                map.insert(device.ip.clone(), device);
            }
        }
    }
}
