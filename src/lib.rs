//! camscout — IP camera and video-endpoint discovery
//!
//! This crate scans a local IPv4 subnet and classifies each responsive
//! host by the media-delivery protocols it exposes:
//! - TCP sweep with bounded concurrency and per-port protocol confirmation
//! - Protocol probes for RTSP, RTMP, HLS, MPEG-DASH, MJPEG and WebRTC
//! - ONVIF WS-Discovery and UPnP/SSDP multicast discovery
//! - RTSP session client with Basic/Digest auth and SDP stream decoding
//! - Device registry with merge-by-IP and a TTL result cache

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod net;
pub mod protocols;
pub mod registry;
pub mod rtsp;
pub mod scanner;

pub use cancel::CancelToken;
pub use config::{AppConfig, LogConfig, NetworkConfig, RtspConfig, ScanConfig};
pub use error::{Error, Result};
pub use models::{Device, Protocol, ProtocolKind, RtspStreamInfo};
pub use registry::DeviceRegistry;
pub use rtsp::{Checker, RtspClient};
pub use scanner::Detector;
