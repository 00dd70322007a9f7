//! UPnP / SSDP discovery over UDP multicast

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::models::{Device, Protocol, ProtocolKind};
use crate::protocols::USER_AGENT;

const SSDP_ADDR: &str = "239.255.255.250:1900";

const SEARCH_TARGETS: &[&str] = &[
    "urn:schemas-upnp-org:device:MediaServer:1",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
    "urn:schemas-upnp-org:device:InternetGatewayDevice:1",
    "upnp:rootdevice",
    "ssdp:all",
];

/// Brands recognized in SERVER headers
const KNOWN_VENDORS: &[&str] = &[
    "Samsung", "LG", "Sony", "Panasonic", "TP-Link", "D-Link", "Netgear", "Hikvision", "Dahua",
    "Axis",
];

/// Send M-SEARCH requests for the camera-relevant device types and collect
/// responses until the discovery window closes.
pub async fn discover(config: &ScanConfig, cancel: CancelToken) -> Result<Vec<Device>> {
    tracing::info!("Starting UPnP/SSDP discovery");

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let multicast: SocketAddr = SSDP_ADDR
        .parse()
        .map_err(|e| Error::Internal(format!("bad multicast address: {e}")))?;

    for target in SEARCH_TARGETS {
        let request = build_msearch(target);
        if let Err(e) = socket.send_to(request.as_bytes(), multicast).await {
            // One failed send leaves the remaining targets in play
            tracing::warn!(target = %target, error = %e, "Failed to send M-SEARCH");
            continue;
        }
        tracing::debug!(target = %target, "Sent M-SEARCH");
    }

    let window = config.discovery_timeout();
    let started = Instant::now();
    let mut devices: HashMap<String, Device> = HashMap::new();
    let mut buf = vec![0u8; 4096];

    while started.elapsed() < window {
        if cancel.is_cancelled() {
            tracing::debug!("UPnP discovery cancelled");
            break;
        }

        let remaining = window
            .saturating_sub(started.elapsed())
            .min(Duration::from_secs(1));
        let (n, source) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Error reading SSDP response");
                continue;
            }
            Err(_) => continue,
        };

        let payload = String::from_utf8_lossy(&buf[..n]);
        if let Some(device) = parse_ssdp_response(&payload, &source.ip().to_string()) {
            match devices.get_mut(&device.ip) {
                Some(existing) => existing.merge_from(&device),
                None => {
                    tracing::debug!(ip = %device.ip, "Found UPnP device");
                    devices.insert(device.ip.clone(), device);
                }
            }
        }
    }

    let found: Vec<Device> = devices.into_values().collect();
    tracing::info!(devices = found.len(), "UPnP/SSDP discovery complete");
    Ok(found)
}

fn build_msearch(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 3\r\n\
         ST: {search_target}\r\n\
         USER-AGENT: {USER_AGENT}\r\n\
         \r\n"
    )
}

/// Parse an SSDP response (HTTP-over-UDP headers) into a device
pub(super) fn parse_ssdp_response(payload: &str, source_ip: &str) -> Option<Device> {
    if !payload.starts_with("HTTP/1.1") && !payload.starts_with("HTTP/1.0") {
        return None;
    }

    let location = header_value(payload, "LOCATION").unwrap_or_default();
    let server = header_value(payload, "SERVER").unwrap_or_default();

    let (ip, port) = location_ip_port(&location)
        .unwrap_or_else(|| (source_ip.to_string(), 80));

    let mut device = Device::new(ip);
    device.add_protocol(Protocol::new(ProtocolKind::Upnp, port, location));

    if let Some(vendor) = vendor_from_server(&server) {
        device.manufacturer = vendor.to_string();
    }

    Some(device)
}

/// Case-insensitive SSDP header lookup
fn header_value(payload: &str, name: &str) -> Option<String> {
    for line in payload.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(name) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn location_ip_port(location: &str) -> Option<(String, u16)> {
    let (default_port, rest) = if let Some(rest) = location.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = location.strip_prefix("http://") {
        (80, rest)
    } else {
        return None;
    };

    let host_port = rest.split('/').next()?;
    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (host_port, default_port),
    };

    host.parse::<std::net::Ipv4Addr>().ok()?;
    Some((host.to_string(), port))
}

/// Match the SERVER header (e.g. "Linux/3.14 UPnP/1.0 Samsung/1.0")
/// against the known brand list.
fn vendor_from_server(server: &str) -> Option<&'static str> {
    let lower = server.to_lowercase();
    KNOWN_VENDORS
        .iter()
        .find(|vendor| lower.contains(&vendor.to_lowercase()))
        .copied()
}
