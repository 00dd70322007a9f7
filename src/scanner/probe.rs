//! TCP connect probe

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// True when a TCP connection to `ip:port` succeeds within `io_timeout`.
/// The connection closes immediately; refusal, timeout and unreachable all
/// read as closed.
pub async fn is_open(ip: Ipv4Addr, port: u16, io_timeout: Duration) -> bool {
    let addr = SocketAddr::new(ip.into(), port);
    matches!(timeout(io_timeout, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
