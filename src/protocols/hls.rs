//! HLS confirmation probe (M3U8 playlist fetch)

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;

use super::{content_type, probe_client, read_prefix, ProtocolDetector};
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

const PLAYLIST_PATHS: &[&str] = &[
    "/hls/stream.m3u8",
    "/live/stream.m3u8",
    "/stream.m3u8",
    "/index.m3u8",
    "/playlist.m3u8",
    "/video.m3u8",
    "/live.m3u8",
];

const PAGE_PATHS: &[&str] = &["", "/", "/index.html", "/live.html", "/stream.html"];

pub struct HlsDetector;

#[async_trait]
impl ProtocolDetector for HlsDetector {
    fn name(&self) -> &'static str {
        "HLS"
    }

    fn default_port(&self) -> u16 {
        80
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let client = probe_client(ip.to_string(), io_timeout)?;

        for scheme in ["http", "https"] {
            for path in PLAYLIST_PATHS {
                let url = format!("{scheme}://{ip}:{port}{path}");
                if check_playlist(&client, &url).await {
                    return Ok(Protocol::new(ProtocolKind::Hls, port, url));
                }
            }
        }

        // Fallback: the web interface references a playlist even though none
        // of the well-known paths answered.
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
                if String::from_utf8_lossy(&body).contains(".m3u8") {
                    return Ok(Protocol::new(
                        ProtocolKind::Hls,
                        port,
                        format!("http://{ip}:{port}"),
                    ));
                }
            }
        }

        Err(Error::NotDetected(format!("no HLS playlist on {ip}:{port}")))
    }
}

async fn check_playlist(client: &reqwest::Client, url: &str) -> bool {
    let Ok(response) = client.get(url).send().await else {
        return false;
    };
    if response.status() != reqwest::StatusCode::OK {
        return false;
    }

    let ctype = content_type(&response);
    let type_ok = ctype.contains("application/vnd.apple.mpegurl")
        || ctype.contains("application/x-mpegURL")
        || ctype.contains("text/plain");
    if !type_ok {
        return false;
    }

    let body = read_prefix(response, 1024).await;
    let text = String::from_utf8_lossy(&body);
    text.contains("#EXTM3U") || text.contains("#EXT-X-VERSION") || text.contains("#EXTINF")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server that keeps answering until the test ends
    async fn http_server(responses: Vec<(&'static str, String)>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let responses = responses.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let Ok(n) = socket.read(&mut buf).await else {
                        return;
                    };
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    let reply = responses
                        .iter()
                        .find(|(p, _)| *p == path)
                        .map(|(_, r)| r.clone())
                        .unwrap_or_else(|| {
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string()
                        });
                    let _ = socket.write_all(reply.as_bytes()).await;
                });
            }
        });
        port
    }

    fn playlist_response(content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn confirms_valid_playlist() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:4.0,\nseg0.ts\n";
        let port = http_server(vec![(
            "/stream.m3u8",
            playlist_response("application/vnd.apple.mpegurl", body),
        )])
        .await;

        let protocol = HlsDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(protocol.kind, ProtocolKind::Hls);
        assert_eq!(protocol.url, format!("http://127.0.0.1:{port}/stream.m3u8"));
    }

    #[tokio::test]
    async fn rejects_playlist_with_wrong_content_type() {
        let port = http_server(vec![(
            "/stream.m3u8",
            playlist_response("text/html", "#EXTM3U\n"),
        )])
        .await;

        let result = HlsDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(Error::NotDetected(_))));
    }

    #[tokio::test]
    async fn falls_back_to_web_page_reference() {
        let page = "<html><video src=\"/media/live.m3u8\"></video></html>";
        let port = http_server(vec![("/", playlist_response("text/html", page))]).await;

        let protocol = HlsDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(protocol.url, format!("http://127.0.0.1:{port}"));
    }
}
