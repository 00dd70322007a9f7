//! MJPEG confirmation probe (multipart stream or JPEG snapshot)

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use super::{content_type, probe_client, read_prefix, ProtocolDetector};
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

const STREAM_PATHS: &[&str] = &[
    "/mjpeg",
    "/mjpg",
    "/video",
    "/stream",
    "/cam",
    "/camera",
    "/live",
    "/img/video.mjpeg",
    "/axis-cgi/mjpg/video.cgi",
    "/cgi-bin/mjpeg",
    "/snapshot.cgi",
];

const PAGE_PATHS: &[&str] = &["", "/", "/index.html", "/video.html", "/stream.html"];

const PAGE_KEYWORDS: &[&str] = &["mjpeg", "mjpg", "multipart/x-mixed-replace", "motion-jpeg"];

pub struct MjpegDetector;

#[async_trait]
impl ProtocolDetector for MjpegDetector {
    fn name(&self) -> &'static str {
        "MJPEG"
    }

    fn default_port(&self) -> u16 {
        80
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let client = probe_client(ip.to_string(), io_timeout)?;

        for scheme in ["http", "https"] {
            for path in STREAM_PATHS {
                let url = format!("{scheme}://{ip}:{port}{path}");
                if check_stream(&client, &url).await {
                    return Ok(Protocol::new(ProtocolKind::Mjpeg, port, url));
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
                let lower = String::from_utf8_lossy(&body).to_lowercase();
                if PAGE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                    return Ok(Protocol::new(
                        ProtocolKind::Mjpeg,
                        port,
                        format!("http://{ip}:{port}"),
                    ));
                }
            }
        }

        Err(Error::NotDetected(format!("no MJPEG endpoint on {ip}:{port}")))
    }
}

async fn check_stream(client: &reqwest::Client, url: &str) -> bool {
    let Ok(response) = client.get(url).send().await else {
        return false;
    };
    if response.status() != reqwest::StatusCode::OK {
        return false;
    }

    let ctype = content_type(&response);

    if ctype.starts_with("multipart/x-mixed-replace") || ctype.contains("video/x-motion-jpeg") {
        // The first part must carry a JPEG start-of-image marker
        let body = read_prefix(response, 512).await;
        return find_jpeg_soi(&body);
    }

    if ctype.contains("image/jpeg") {
        let body = read_prefix(response, 4).await;
        return body.len() >= 2 && body[0] == 0xFF && body[1] == 0xD8;
    }

    false
}

fn find_jpeg_soi(body: &[u8]) -> bool {
    body.windows(3).any(|w| w == [0xFF, 0xD8, 0xFF])
}
