//! WebRTC confirmation probe
//!
//! WebRTC has no single wire endpoint to knock on; the probe looks for
//! signaling traces in the device web interface, a published ICE
//! configuration, or a reachable STUN/TURN service.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use super::{probe_client, read_prefix, ProtocolDetector};
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

const PAGE_PATHS: &[&str] = &["", "/", "/index.html", "/live.html", "/stream.html", "/webrtc.html"];

const SCRIPT_PATHS: &[&str] = &["/js/webrtc.js", "/webrtc.js", "/js/stream.js", "/stream.js"];

const CONFIG_PATHS: &[&str] = &["/api/webrtc/config", "/config/webrtc.json", "/webrtc/config"];

const KEYWORDS: &[&str] = &[
    "webrtc",
    "rtcpeerconnection",
    "getusermedia",
    "mediastream",
    "rtcicecandidate",
    "stun:",
    "turn:",
];

const STUN_PORTS: &[u16] = &[3478, 5349];

pub struct WebRtcDetector;

#[async_trait]
impl ProtocolDetector for WebRtcDetector {
    fn name(&self) -> &'static str {
        "WebRTC"
    }

    fn default_port(&self) -> u16 {
        80
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let client = probe_client(ip.to_string(), io_timeout)?;

        if scan_pages(&client, ip, port).await
            || scan_ice_config(&client, ip, port).await
            || scan_stun_turn(ip, io_timeout).await
        {
            return Ok(Protocol::new(
                ProtocolKind::WebRtc,
                port,
                format!("http://{ip}:{port}"),
            ));
        }

        Err(Error::NotDetected(format!("no WebRTC signaling on {ip}:{port}")))
    }
}

async fn scan_pages(client: &reqwest::Client, ip: Ipv4Addr, port: u16) -> bool {
    for scheme in ["http", "https"] {
        for path in PAGE_PATHS.iter().chain(SCRIPT_PATHS) {
            let url = format!("{scheme}://{ip}:{port}{path}");
            let Ok(response) = client.get(&url).send().await else {
                continue;
            };
            if response.status() != reqwest::StatusCode::OK {
                continue;
            }
            let body = read_prefix(response, 16 * 1024).await;
            let lower = String::from_utf8_lossy(&body).to_lowercase();
            if KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                return true;
            }
        }
    }
    false
}

async fn scan_ice_config(client: &reqwest::Client, ip: Ipv4Addr, port: u16) -> bool {
    for path in CONFIG_PATHS {
        let url = format!("http://{ip}:{port}{path}");
        let Ok(response) = client.get(&url).send().await else {
            continue;
        };
        if response.status() != reqwest::StatusCode::OK {
            continue;
        }
        let body = read_prefix(response, 4096).await;
        let Ok(config) = serde_json::from_slice::<serde_json::Value>(&body) else {
            continue;
        };

        let non_empty_str = |key: &str| {
            config
                .get(key)
                .and_then(|v| v.as_str())
                .is_some_and(|s| !s.is_empty())
        };
        if non_empty_str("stun") || non_empty_str("turn") {
            return true;
        }
        if config
            .get("iceServers")
            .and_then(|v| v.as_array())
            .is_some_and(|servers| !servers.is_empty())
        {
            return true;
        }
    }
    false
}

/// Secondary signal: a STUN/TURN service answering on the well-known ports.
/// A bare UDP "connect" succeeds against anything, so the UDP leg requires
/// an actual answer to a minimal binding request.
async fn scan_stun_turn(ip: Ipv4Addr, io_timeout: Duration) -> bool {
    let probe_timeout = io_timeout.min(Duration::from_secs(2));

    for &port in STUN_PORTS {
        let addr = SocketAddr::new(ip.into(), port);

        if stun_binding_answered(addr, probe_timeout).await {
            return true;
        }

        if let Ok(Ok(_)) = timeout(probe_timeout, TcpStream::connect(addr)).await {
            return true;
        }
    }
    false
}

async fn stun_binding_answered(addr: SocketAddr, probe_timeout: Duration) -> bool {
    let Ok(socket) = UdpSocket::bind("0.0.0.0:0").await else {
        return false;
    };

    // Binding Request: type 0x0001, zero length, magic cookie, transaction id
    let mut request = [0u8; 20];
    request[0] = 0x00;
    request[1] = 0x01;
    request[4..8].copy_from_slice(&0x2112_A442u32.to_be_bytes());
    let txn = uuid::Uuid::new_v4();
    request[8..20].copy_from_slice(&txn.as_bytes()[..12]);

    if socket.send_to(&request, addr).await.is_err() {
        return false;
    }

    let mut buf = [0u8; 128];
    matches!(
        timeout(probe_timeout, socket.recv_from(&mut buf)).await,
        Ok(Ok((n, _))) if n >= 20
    )
}
