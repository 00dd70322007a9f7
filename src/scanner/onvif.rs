//! ONVIF WS-Discovery over UDP multicast

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::time::timeout;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::models::{Device, Protocol, ProtocolKind};

const WS_DISCOVERY_ADDR: &str = "239.255.255.250:3702";

const NAME_SCOPE_PREFIX: &str = "onvif://www.onvif.org/name/";
const HARDWARE_SCOPE_PREFIX: &str = "onvif://www.onvif.org/hardware/";

/// Send one WS-Discovery Probe for network video transmitters and collect
/// ProbeMatches until the discovery window closes.
pub async fn discover(config: &ScanConfig, cancel: CancelToken) -> Result<Vec<Device>> {
    tracing::info!("Starting ONVIF WS-Discovery");

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let multicast: SocketAddr = WS_DISCOVERY_ADDR
        .parse()
        .map_err(|e| Error::Internal(format!("bad multicast address: {e}")))?;

    let probe = build_probe_message(&Uuid::new_v4().to_string());
    socket.send_to(probe.as_bytes(), multicast).await?;
    tracing::debug!("Sent WS-Discovery Probe");

    let window = config.discovery_timeout();
    let started = Instant::now();
    let mut devices: HashMap<String, Device> = HashMap::new();
    let mut buf = vec![0u8; 8192];

    while started.elapsed() < window {
        if cancel.is_cancelled() {
            tracing::debug!("ONVIF discovery cancelled");
            break;
        }

        let remaining = window
            .saturating_sub(started.elapsed())
            .min(Duration::from_secs(1));
        let (n, source) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Error reading WS-Discovery response");
                continue;
            }
            Err(_) => continue,
        };

        let payload = String::from_utf8_lossy(&buf[..n]);
        match parse_probe_match(&payload, &source.ip().to_string()) {
            Some(device) => match devices.get_mut(&device.ip) {
                Some(existing) => existing.merge_from(&device),
                None => {
                    tracing::debug!(ip = %device.ip, "Found ONVIF device");
                    devices.insert(device.ip.clone(), device);
                }
            },
            None => {
                tracing::debug!(source = %source, "Ignoring non-ProbeMatch datagram");
            }
        }
    }

    let found: Vec<Device> = devices.into_values().collect();
    tracing::info!(devices = found.len(), "ONVIF WS-Discovery complete");
    Ok(found)
}

/// SOAP 1.2 Probe envelope; the MessageID must be unique per scan
fn build_probe_message(message_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"
            xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery"
            xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
    <s:Header>
        <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
        <a:MessageID>urn:uuid:{message_id}</a:MessageID>
        <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
    </s:Header>
    <s:Body>
        <d:Probe>
            <d:Types>dn:NetworkVideoTransmitter</d:Types>
        </d:Probe>
    </s:Body>
</s:Envelope>"#
    )
}

/// Parse a ProbeMatches envelope into a device. SOAP responses vary wildly
/// in namespace prefixes, so extraction scans for local tag names instead
/// of full XML decoding.
pub(super) fn parse_probe_match(payload: &str, source_ip: &str) -> Option<Device> {
    if !payload.contains("ProbeMatch") {
        return None;
    }

    let xaddrs = extract_tag_text(payload, "XAddrs")?;
    let endpoint = xaddrs.split_whitespace().next()?;

    let (ip, port) = endpoint_ip_port(endpoint)
        .unwrap_or_else(|| (source_ip.to_string(), 80));

    let mut device = Device::new(ip);
    device.add_protocol(Protocol::new(ProtocolKind::Onvif, port, endpoint));

    if let Some(scopes) = extract_tag_text(payload, "Scopes") {
        apply_scopes(&mut device, &scopes);
    }

    Some(device)
}

/// Text of the first element whose local name is `tag`, prefix-agnostic
fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let needle = format!("{tag}>");
    let mut search_from = 0;

    while let Some(rel) = xml[search_from..].find(&needle) {
        let at = search_from + rel;
        search_from = at + needle.len();

        let Some(lt) = xml[..at].rfind('<') else {
            continue;
        };
        let head = &xml[lt + 1..at];
        // An opening tag reads "<Tag>" or "<prefix:Tag>"
        let opens = head.is_empty()
            || (head.ends_with(':')
                && head[..head.len() - 1]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        if !opens {
            continue;
        }

        let content_start = at + needle.len();
        let end = xml[content_start..].find("</")? + content_start;
        let text = xml[content_start..end].trim();
        if text.is_empty() {
            return None;
        }
        return Some(text.to_string());
    }
    None
}

/// IP and port of an XAddrs endpoint URL; defaults follow the scheme
fn endpoint_ip_port(endpoint: &str) -> Option<(String, u16)> {
    let (default_port, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
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

/// Scopes carry the advertised model and hardware identifiers
fn apply_scopes(device: &mut Device, scopes: &str) {
    for scope in scopes.split_whitespace() {
        if let Some(name) = scope.strip_prefix(NAME_SCOPE_PREFIX) {
            if device.model.is_empty() {
                if let Some(first) = name.split('/').next() {
                    device.model = url_decode(first);
                }
            }
        } else if let Some(hardware) = scope.strip_prefix(HARDWARE_SCOPE_PREFIX) {
            if device.manufacturer.is_empty() {
                if let Some(first) = hardware.split('/').next() {
                    device.manufacturer = url_decode(first);
                }
            }
        }
    }
}

/// Minimal percent-decoding; scope values often escape spaces as %20
fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&value[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}
