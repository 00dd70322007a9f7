//! Protocol confirmation probes
//!
//! One detector per media protocol. Detectors hold no state across
//! invocations and are safe to run in parallel; a probe that cannot
//! positively confirm returns [`Error::NotDetected`] and the caller treats
//! that as the "not detected" signal.

mod dash;
mod hls;
mod http;
mod mjpeg;
mod rtmp;
mod rtsp;
mod webrtc;

pub use dash::DashDetector;
pub use hls::HlsDetector;
pub use mjpeg::MjpegDetector;
pub use rtmp::RtmpDetector;
pub use rtsp::RtspDetector;
pub use webrtc::WebRtcDetector;

pub(crate) use http::{content_type, probe_client, read_prefix};
pub(crate) use rtsp::USER_AGENT;

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Protocol;

/// Confirmation probe for one protocol family
#[async_trait]
pub trait ProtocolDetector: Send + Sync {
    /// Protocol name as it appears in logs and results
    fn name(&self) -> &'static str;

    /// Port probed when the caller has no better candidate
    fn default_port(&self) -> u16;

    /// Confirm the protocol on `ip:port` within `timeout`
    async fn detect(&self, ip: Ipv4Addr, port: u16, timeout: Duration) -> Result<Protocol>;
}

/// All detectors in their fixed probe order
pub fn all_detectors() -> Vec<Box<dyn ProtocolDetector>> {
    vec![
        Box::new(RtspDetector),
        Box::new(RtmpDetector),
        Box::new(HlsDetector),
        Box::new(MjpegDetector),
        Box::new(DashDetector),
        Box::new(WebRtcDetector),
    ]
}

/// Probe every protocol on its default port and collect the confirmed
/// ones. Detection failures read as "not present".
pub async fn detect_all(ip: Ipv4Addr, timeout: Duration) -> Vec<Protocol> {
    let mut confirmed = Vec::new();
    for detector in all_detectors() {
        let port = detector.default_port();
        match detector.detect(ip, port, timeout).await {
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
    confirmed
}

/// Probe one named protocol (as reported by `name()`) on `ip:port`
pub async fn detect_protocol(
    name: &str,
    ip: Ipv4Addr,
    port: u16,
    timeout: Duration,
) -> Result<Protocol> {
    for detector in all_detectors() {
        if detector.name() == name {
            return detector.detect(ip, port, timeout).await;
        }
    }
    Err(crate::error::Error::NotDetected(format!(
        "unknown protocol: {name}"
    )))
}
