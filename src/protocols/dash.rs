//! MPEG-DASH confirmation probe (MPD manifest fetch)

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use super::{content_type, probe_client, read_prefix, ProtocolDetector};
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

const MANIFEST_PATHS: &[&str] = &[
    "/dash/stream.mpd",
    "/stream.mpd",
    "/manifest.mpd",
    "/playlist.mpd",
    "/video.mpd",
    "/live.mpd",
    "/dash/manifest.mpd",
];

const PAGE_PATHS: &[&str] = &["", "/", "/index.html", "/live.html", "/stream.html", "/dash.html"];

pub struct DashDetector;

#[async_trait]
impl ProtocolDetector for DashDetector {
    fn name(&self) -> &'static str {
        "MPEG-DASH"
    }

    fn default_port(&self) -> u16 {
        80
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let client = probe_client(ip.to_string(), io_timeout)?;

        for scheme in ["http", "https"] {
            for path in MANIFEST_PATHS {
                let url = format!("{scheme}://{ip}:{port}{path}");
                if check_manifest(&client, &url).await {
                    return Ok(Protocol::new(ProtocolKind::MpegDash, port, url));
                }
            }
        }

        for scheme in ["http", "https"] {
            for path in PAGE_PATHS {
                let url = format!("{scheme}://{ip}:{port}{path}");
                let Ok(response) = client.get(&url).send().await else {
                    continue;
                };
                if response.status() != reqwest::StatusCode::OK {
                    continue;
                }
                let body = read_prefix(response, 8192).await;
                let text = String::from_utf8_lossy(&body);
                let lower = text.to_lowercase();
                if text.contains(".mpd") || lower.contains("mpeg-dash") {
                    return Ok(Protocol::new(
                        ProtocolKind::MpegDash,
                        port,
                        format!("http://{ip}:{port}"),
                    ));
                }
            }
        }

        Err(Error::NotDetected(format!("no DASH manifest on {ip}:{port}")))
    }
}

async fn check_manifest(client: &reqwest::Client, url: &str) -> bool {
    let Ok(response) = client.get(url).send().await else {
        return false;
    };
    if response.status() != reqwest::StatusCode::OK {
        return false;
    }

    let ctype = content_type(&response);
    let type_ok = ctype.contains("application/dash+xml")
        || ctype.contains("application/xml")
        || ctype.contains("text/xml");
    if !type_ok {
        return false;
    }

    let body = read_prefix(response, 2048).await;
    let text = String::from_utf8_lossy(&body);
    text.contains("<?xml")
        && (text.contains("<MPD")
            || text.contains("<MediaPresentationDescription")
            || text.contains("type=\"dynamic\"")
            || text.contains("type=\"static\""))
}
