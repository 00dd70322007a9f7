//! TCP sweep: host enumeration, port probing and protocol confirmation

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::cancel::CancelToken;
use crate::config::{RtspConfig, ScanConfig};
use crate::error::Result;
use crate::models::{Device, Protocol, ProtocolKind};
use crate::net;
use crate::protocols::{self, ProtocolDetector};
use crate::rtsp::Checker;

use super::probe;

/// Ports treated as web-served: the HTTP-carried detectors run there, and
/// an unconfirmed open port falls back to the HTTP tag.
const WEB_PORTS: &[u16] = &[80, 443, 8000, 8080, 8443];
const RTSP_PORTS: &[u16] = &[554, 8554];
const RTMP_PORTS: &[u16] = &[1935];

/// Sweep every host in `subnet`: probe the configured ports, confirm
/// protocols on the open ones and return one device per responsive host.
///
/// Ports on one host scan in parallel; every port probe draws a permit
/// from the caller's semaphore, so the sum of in-flight probes across all
/// hosts stays within the global `max_concurrency` bound.
pub async fn sweep_subnet(
    config: &ScanConfig,
    rtsp_config: &RtspConfig,
    subnet: &str,
    semaphore: Arc<Semaphore>,
    cancel: CancelToken,
) -> Result<Vec<Device>> {
    let hosts = net::subnet_hosts(subnet)?;
    tracing::info!(subnet = %subnet, hosts = hosts.len(), "Starting TCP sweep");

    let detectors: Arc<Vec<Box<dyn ProtocolDetector>>> = Arc::new(protocols::all_detectors());
    let mut handles = Vec::with_capacity(hosts.len());

    for ip in hosts {
        if cancel.is_cancelled() {
            tracing::warn!("Sweep cancelled before dispatch completed");
            break;
        }

        let config = config.clone();
        let rtsp_config = rtsp_config.clone();
        let detectors = detectors.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            scan_host(&config, &rtsp_config, ip, detectors, semaphore, &cancel).await
        }));
    }

    let mut devices = Vec::new();
    for handle in handles {
        if let Ok(Some(device)) = handle.await {
            devices.push(device);
        }
    }

    tracing::info!(devices = devices.len(), "TCP sweep complete");
    Ok(devices)
}

/// Scan one host with one concurrent task per configured port, each
/// holding a permit from the shared semaphore for the duration of its
/// probe and confirmation. Returns `None` when no port yields a protocol,
/// so a device only ever exists with a non-empty protocol list.
async fn scan_host(
    config: &ScanConfig,
    rtsp_config: &RtspConfig,
    ip: Ipv4Addr,
    detectors: Arc<Vec<Box<dyn ProtocolDetector>>>,
    semaphore: Arc<Semaphore>,
    cancel: &CancelToken,
) -> Option<Device> {
    let port_timeout = config.port_timeout();
    let mut port_handles = Vec::with_capacity(config.ports.len());

    for &port in &config.ports {
        if cancel.is_cancelled() {
            break;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let detectors = detectors.clone();
        let cancel = cancel.clone();

        port_handles.push(tokio::spawn(async move {
            let protocols = if probe::is_open(ip, port, port_timeout).await {
                confirm_port(ip, port, port_timeout, &detectors, &cancel).await
            } else {
                Vec::new()
            };
            drop(permit);
            protocols
        }));
    }

    let mut device = Device::new(ip.to_string());
    for handle in port_handles {
        if let Ok(protocols) = handle.await {
            for protocol in protocols {
                device.add_protocol(protocol);
            }
        }
    }

    if device.protocols.is_empty() {
        return None;
    }

    if let Some(hostname) = net::reverse_hostname(ip).await {
        device.hostname = hostname;
    }

    if config.check_rtsp && device.has_protocol(ProtocolKind::Rtsp) {
        let checker = Checker::new(rtsp_config.clone());
        for port in device.ports_for(ProtocolKind::Rtsp) {
            let streams = checker.discover_streams(ip, port, "", "").await;
            for stream in streams {
                if !device.rtsp_streams.iter().any(|s| s.url == stream.url) {
                    device.rtsp_streams.push(stream);
                }
            }
        }
    }

    tracing::info!(
        ip = %ip,
        protocols = device.protocols.len(),
        "Host scanned"
    );
    Some(device)
}

/// Run every detector matching `port`. Multiple detectors may confirm on
/// the same port (a web port can carry HLS, DASH, MJPEG and WebRTC at
/// once); an unrecognized port gets the full detector set. When nothing
/// confirms, fall back to labeling the open port by its family so it
/// still surfaces in the results.
async fn confirm_port(
    ip: Ipv4Addr,
    port: u16,
    io_timeout: Duration,
    detectors: &[Box<dyn ProtocolDetector>],
    cancel: &CancelToken,
) -> Vec<Protocol> {
    let mut confirmed = Vec::new();

    for detector in matching_detectors(port, detectors) {
        if cancel.is_cancelled() {
            break;
        }
        match detector.detect(ip, port, io_timeout).await {
            Ok(protocol) => {
                tracing::info!(
                    ip = %ip,
                    port = port,
                    protocol = detector.name(),
                    "Protocol detected"
                );
                confirmed.push(protocol);
            }
            Err(e) => {
                tracing::debug!(
                    ip = %ip,
                    port = port,
                    protocol = detector.name(),
                    error = %e,
                    "Not detected"
                );
            }
        }
    }

    if confirmed.is_empty() {
        confirmed.push(fallback_protocol(ip, port));
    }
    confirmed
}

fn matching_detectors<'a>(
    port: u16,
    detectors: &'a [Box<dyn ProtocolDetector>],
) -> Vec<&'a dyn ProtocolDetector> {
    let known_port =
        RTSP_PORTS.contains(&port) || RTMP_PORTS.contains(&port) || WEB_PORTS.contains(&port);

    detectors
        .iter()
        .filter(|d| {
            if !known_port {
                return true;
            }
            match d.name() {
                "RTSP" => RTSP_PORTS.contains(&port),
                "RTMP" => RTMP_PORTS.contains(&port),
                _ => WEB_PORTS.contains(&port),
            }
        })
        .map(|d| d.as_ref())
        .collect()
}

fn fallback_protocol(ip: Ipv4Addr, port: u16) -> Protocol {
    if WEB_PORTS.contains(&port) {
        Protocol::new(ProtocolKind::Http, port, format!("http://{ip}:{port}"))
    } else {
        Protocol::new(ProtocolKind::Unknown, port, format!("tcp://{ip}:{port}"))
    }
}
