//! Network utilities: CIDR expansion, interface enumeration, reverse DNS

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{Error, Result};

/// An active IPv4 interface
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub prefix_len: u8,
}

impl InterfaceInfo {
    /// CIDR of the network this interface sits on, e.g. "192.168.1.0/24"
    pub fn network_cidr(&self) -> Result<String> {
        let net = Ipv4Net::new(self.ip, self.prefix_len)
            .map_err(|e| Error::InvalidSubnet(e.to_string()))?;
        Ok(format!("{}/{}", net.network(), net.prefix_len()))
    }
}

/// Expand a CIDR into its host addresses, excluding the network and
/// broadcast addresses.
///
/// A bare address expands as its /24 network. By convention /31 yields no
/// hosts and /32 yields the single address.
pub fn subnet_hosts(subnet: &str) -> Result<Vec<Ipv4Addr>> {
    let net = parse_subnet(subnet)?;

    if net.prefix_len() == 32 {
        return Ok(vec![net.addr()]);
    }

    let network = net.network();
    let broadcast = net.broadcast();
    Ok(net
        .hosts()
        .filter(|ip| *ip != network && *ip != broadcast)
        .collect())
}

/// Parse a CIDR string; a bare IPv4 address is retried once as /24.
pub fn parse_subnet(subnet: &str) -> Result<Ipv4Net> {
    let subnet = subnet.trim();
    if subnet.is_empty() {
        return Err(Error::InvalidSubnet("empty subnet".into()));
    }

    if let Ok(net) = subnet.parse::<Ipv4Net>() {
        return Ok(net);
    }

    if !subnet.contains('/') {
        if let Ok(addr) = subnet.parse::<Ipv4Addr>() {
            return format!("{addr}/24")
                .parse::<Ipv4Net>()
                .map_err(|e| Error::InvalidSubnet(format!("{subnet}: {e}")));
        }
    }

    Err(Error::InvalidSubnet(subnet.to_string()))
}

/// Enumerate active, non-loopback interfaces carrying an IPv4 address
pub fn interfaces() -> Result<Vec<InterfaceInfo>> {
    let addrs = if_addrs::get_if_addrs()?;

    let mut result = Vec::new();
    for iface in addrs {
        if iface.is_loopback() {
            continue;
        }
        if let if_addrs::IfAddr::V4(v4) = &iface.addr {
            if v4.ip.is_unspecified() || v4.ip.is_link_local() {
                continue;
            }
            result.push(InterfaceInfo {
                name: iface.name.clone(),
                ip: v4.ip,
                netmask: v4.netmask,
                prefix_len: prefix_from_netmask(v4.netmask),
            });
        }
    }

    Ok(result)
}

/// Pick the subnet to scan: the named interface when given, otherwise the
/// first active one.
pub fn auto_detect_subnet(interface: &str) -> Result<String> {
    let candidates = interfaces()?;

    let chosen = if interface.is_empty() {
        candidates.into_iter().next()
    } else {
        candidates.into_iter().find(|i| i.name == interface)
    };

    match chosen {
        Some(iface) => iface.network_cidr(),
        None => Err(Error::InvalidSubnet(
            "no active IPv4 interface found for subnet auto-detection".into(),
        )),
    }
}

/// Log the active interfaces at scan start
pub fn log_interfaces() {
    match interfaces() {
        Ok(list) => {
            tracing::info!(count = list.len(), "Active network interfaces");
            for iface in &list {
                tracing::info!(
                    name = %iface.name,
                    ip = %iface.ip,
                    prefix = iface.prefix_len,
                    "Interface"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to enumerate interfaces"),
    }
}

/// Best-effort reverse DNS. Failures and self-referential answers map to
/// `None`; this must never fail the enclosing scan.
pub async fn reverse_hostname(ip: Ipv4Addr) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || {
        dns_lookup::lookup_addr(&std::net::IpAddr::V4(ip)).ok()
    })
    .await
    .ok()
    .flatten()?;

    let hostname = result.trim_end_matches('.').to_string();
    if hostname.is_empty() || hostname == ip.to_string() {
        None
    } else {
        Some(hostname)
    }
}

/// Local IP used to reach the outside world; best-effort.
///
/// A connected UDP socket never sends anything, it just asks the kernel
/// which source address routing would pick.
pub async fn local_ip() -> Option<Ipv4Addr> {
    let socket = tokio::net::UdpSocket::bind("0.0.0.0:0").await.ok()?;
    socket.connect("8.8.8.8:80").await.ok()?;
    match socket.local_addr().ok()? {
        std::net::SocketAddr::V4(addr) => Some(*addr.ip()),
        std::net::SocketAddr::V6(_) => None,
    }
}

/// True when `ip` falls inside `subnet`
pub fn ip_in_subnet(ip: Ipv4Addr, subnet: &str) -> Result<bool> {
    Ok(parse_subnet(subnet)?.contains(&ip))
}

/// Dotted-quad netmask of a subnet, e.g. "255.255.255.0"
pub fn subnet_mask(subnet: &str) -> Result<String> {
    Ok(parse_subnet(subnet)?.netmask().to_string())
}

/// Network address of a subnet
pub fn network_address(subnet: &str) -> Result<Ipv4Addr> {
    Ok(parse_subnet(subnet)?.network())
}

/// Broadcast address of a subnet
pub fn broadcast_address(subnet: &str) -> Result<Ipv4Addr> {
    Ok(parse_subnet(subnet)?.broadcast())
}

fn prefix_from_netmask(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}
