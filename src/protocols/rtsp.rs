//! RTSP confirmation probe

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::ProtocolDetector;
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

pub(crate) const USER_AGENT: &str = concat!("camscout/", env!("CARGO_PKG_VERSION"));

pub struct RtspDetector;

#[async_trait]
impl ProtocolDetector for RtspDetector {
    fn name(&self) -> &'static str {
        "RTSP"
    }

    fn default_port(&self) -> u16 {
        554
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let addr = SocketAddr::new(ip.into(), port);

        let mut stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        let request = format!(
            "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: {USER_AGENT}\r\n\r\n"
        );
        timeout(io_timeout, stream.write_all(request.as_bytes()))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        let mut buf = [0u8; 1024];
        let n = timeout(io_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::NotDetected(format!("{ip}:{port} closed without responding")));
        }

        let response = String::from_utf8_lossy(&buf[..n]);
        let status_line = response.lines().next().unwrap_or("");
        let code = parse_rtsp_status(status_line)
            .ok_or_else(|| Error::NotDetected(format!("not an RTSP response: {status_line}")))?;

        // 401 still proves the endpoint speaks RTSP; the auth challenge is
        // handled later by the session client.
        if code == 200 || code == 401 {
            Ok(Protocol::new(
                ProtocolKind::Rtsp,
                port,
                format!("rtsp://{ip}:{port}"),
            ))
        } else {
            Err(Error::NotDetected(format!(
                "RTSP endpoint answered {code} to OPTIONS"
            )))
        }
    }
}

/// Parse the numeric code of an `RTSP/1.0 <code> <reason>` status line.
/// Anything not starting with `RTSP/1.0` (including HTTP responses) is
/// rejected.
pub(crate) fn parse_rtsp_status(line: &str) -> Option<u16> {
    let rest = line.strip_prefix("RTSP/1.0 ")?;
    rest.split_whitespace().next()?.parse().ok()
}
