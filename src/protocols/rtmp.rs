//! RTMP confirmation probe (C0/C1 → S0/S1/S2 → C2 handshake)

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::ProtocolDetector;
use crate::error::{Error, Result};
use crate::models::{Protocol, ProtocolKind};

const HANDSHAKE_LEN: usize = 1536;
const RTMP_VERSION: u8 = 3;

pub struct RtmpDetector;

#[async_trait]
impl ProtocolDetector for RtmpDetector {
    fn name(&self) -> &'static str {
        "RTMP"
    }

    fn default_port(&self) -> u16 {
        1935
    }

    async fn detect(&self, ip: Ipv4Addr, port: u16, io_timeout: Duration) -> Result<Protocol> {
        let addr = SocketAddr::new(ip.into(), port);

        let mut stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        timeout(io_timeout, stream.write_all(&build_c0c1()))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        // S0 + S1 + S2
        let mut reply = [0u8; 1 + 2 * HANDSHAKE_LEN];
        timeout(io_timeout, stream.read_exact(&mut reply))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|_| Error::NotDetected(format!("{ip}:{port} short RTMP handshake reply")))?;

        if reply[0] != RTMP_VERSION {
            return Err(Error::NotDetected(format!(
                "unexpected RTMP version byte {}",
                reply[0]
            )));
        }

        // Echo S1 as C2 to finish the exchange
        let c2 = &reply[1..1 + HANDSHAKE_LEN];
        timeout(io_timeout, stream.write_all(c2))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        Ok(Protocol::new(
            ProtocolKind::Rtmp,
            port,
            format!("rtmp://{ip}:{port}"),
        ))
    }
}

/// C0 (version byte) followed by C1: big-endian timestamp, four zero bytes,
/// then deterministic filler. Servers only echo C1, so randomness buys
/// nothing here.
fn build_c0c1() -> Vec<u8> {
    let mut packet = Vec::with_capacity(1 + HANDSHAKE_LEN);
    packet.push(RTMP_VERSION);

    let timestamp = chrono::Utc::now().timestamp() as u32;
    packet.extend_from_slice(&timestamp.to_be_bytes());
    packet.extend_from_slice(&[0u8; 4]);
    for i in 8..HANDSHAKE_LEN {
        packet.push((i % 256) as u8);
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn c0c1_layout() {
        let packet = build_c0c1();
        assert_eq!(packet.len(), 1 + HANDSHAKE_LEN);
        assert_eq!(packet[0], 3);
        assert_eq!(&packet[5..9], &[0, 0, 0, 0]);
        assert_eq!(packet[9], (8 % 256) as u8);
        assert_eq!(packet[1536], (1535 % 256) as u8);
    }

    async fn rtmp_server(version: u8) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut c0c1 = vec![0u8; 1 + HANDSHAKE_LEN];
                if socket.read_exact(&mut c0c1).await.is_err() {
                    return;
                }
                // S0 + S1 + S2 (S2 echoes C1)
                let mut reply = vec![version];
                reply.extend_from_slice(&c0c1[1..]);
                reply.extend_from_slice(&c0c1[1..]);
                let _ = socket.write_all(&reply).await;
                let mut c2 = vec![0u8; HANDSHAKE_LEN];
                let _ = socket.read_exact(&mut c2).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn full_handshake_confirms_rtmp() {
        let port = rtmp_server(3).await;
        let protocol = RtmpDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(protocol.kind, ProtocolKind::Rtmp);
        assert_eq!(protocol.url, format!("rtmp://127.0.0.1:{port}"));
    }

    #[tokio::test]
    async fn wrong_version_byte_is_rejected() {
        let port = rtmp_server(6).await;
        let result = RtmpDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_secs(2))
            .await;
        assert!(matches!(result, Err(Error::NotDetected(_))));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _keep_open = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = RtmpDetector
            .detect(Ipv4Addr::LOCALHOST, port, Duration::from_millis(300))
            .await;
        assert!(result.is_err());
    }
}
