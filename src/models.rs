//! Core data model: devices, confirmed protocols and RTSP stream details

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol families a device endpoint can expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "RTSP")]
    Rtsp,
    #[serde(rename = "RTMP")]
    Rtmp,
    #[serde(rename = "HLS")]
    Hls,
    #[serde(rename = "MPEG-DASH")]
    MpegDash,
    #[serde(rename = "MJPEG")]
    Mjpeg,
    #[serde(rename = "WebRTC")]
    WebRtc,
    #[serde(rename = "ONVIF")]
    Onvif,
    #[serde(rename = "UPnP")]
    Upnp,
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProtocolKind::Rtsp => "RTSP",
            ProtocolKind::Rtmp => "RTMP",
            ProtocolKind::Hls => "HLS",
            ProtocolKind::MpegDash => "MPEG-DASH",
            ProtocolKind::Mjpeg => "MJPEG",
            ProtocolKind::WebRtc => "WebRTC",
            ProtocolKind::Onvif => "ONVIF",
            ProtocolKind::Upnp => "UPnP",
            ProtocolKind::Http => "HTTP",
            ProtocolKind::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A confirmed protocol endpoint on a device.
///
/// Identity within a device is the (kind, port) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    #[serde(rename = "type")]
    pub kind: ProtocolKind,
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub available: bool,
    pub detected_at: DateTime<Utc>,
}

impl Protocol {
    pub fn new(kind: ProtocolKind, port: u16, url: impl Into<String>) -> Self {
        Self {
            kind,
            port,
            url: url.into(),
            available: true,
            detected_at: Utc::now(),
        }
    }
}

/// A single media stream described by SDP or probed by ffprobe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RtspStreamInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub codec: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resolution: String,
    #[serde(default)]
    pub fps: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub bitrate: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audio_codec: String,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub channels: u8,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}

/// A network endpoint believed to expose one or more video protocols.
///
/// The IPv4 address in string form is the unique key everywhere the device
/// travels (merge map, registry, cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub protocols: Vec<Protocol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rtsp_streams: Vec<RtspStreamInfo>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Device {
    pub fn new(ip: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            ip: ip.into(),
            mac: String::new(),
            hostname: String::new(),
            manufacturer: String::new(),
            model: String::new(),
            protocols: Vec::new(),
            rtsp_streams: Vec::new(),
            discovered_at: now,
            last_seen: now,
        }
    }

    /// Append a protocol unless the same (kind, port) pair is already present
    pub fn add_protocol(&mut self, protocol: Protocol) {
        let dup = self
            .protocols
            .iter()
            .any(|p| p.kind == protocol.kind && p.port == protocol.port);
        if !dup {
            self.protocols.push(protocol);
        }
    }

    /// True when the device exposes the given protocol family on any port
    pub fn has_protocol(&self, kind: ProtocolKind) -> bool {
        self.protocols.iter().any(|p| p.kind == kind)
    }

    /// Ports on which the given protocol family was confirmed
    pub fn ports_for(&self, kind: ProtocolKind) -> Vec<u16> {
        self.protocols
            .iter()
            .filter(|p| p.kind == kind)
            .map(|p| p.port)
            .collect()
    }

    /// Merge another observation of the same IP into this device.
    ///
    /// Protocol lists union, deduplicated by (kind, port) with the existing
    /// entry winning. Scalar attributes keep the first non-empty value.
    /// `discovered_at` takes the minimum, `last_seen` the maximum, so the
    /// merge stays commutative and idempotent regardless of which discovery
    /// path reported first.
    pub fn merge_from(&mut self, other: &Device) {
        for protocol in &other.protocols {
            self.add_protocol(protocol.clone());
        }

        for stream in &other.rtsp_streams {
            if !self.rtsp_streams.iter().any(|s| s.url == stream.url) {
                self.rtsp_streams.push(stream.clone());
            }
        }

        if self.mac.is_empty() && !other.mac.is_empty() {
            self.mac = other.mac.clone();
        }
        if self.hostname.is_empty() && !other.hostname.is_empty() {
            self.hostname = other.hostname.clone();
        }
        if self.manufacturer.is_empty() && !other.manufacturer.is_empty() {
            self.manufacturer = other.manufacturer.clone();
        }
        if self.model.is_empty() && !other.model.is_empty() {
            self.model = other.model.clone();
        }

        if other.discovered_at < self.discovered_at {
            self.discovered_at = other.discovered_at;
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
    }
}
