//! Resolution of the host address advertised in every record.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};

use log::{info, warn};

/// Resolves the address records should point at.
///
/// Called once at startup; the result is never refreshed.
pub fn resolve_host_ip(override_ip: Option<IpAddr>) -> IpAddr {
    if let Some(ip) = override_ip {
        info!("Using configured host IP {}", ip);
        return ip;
    }

    match primary_ip() {
        Ok(ip) => return ip,
        Err(e) => warn!("Failed to get host IP via socket: {}", e),
    }

    match hostname_ip() {
        Some(ip) => ip,
        None => {
            warn!("Could not determine host IP, falling back to loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Address of the interface holding the default route.  Connecting a UDP
/// socket sends no packets.
fn primary_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

fn hostname_ip() -> Option<IpAddr> {
    let name = hostname::get().ok()?.into_string().ok()?;
    (name.as_str(), 0)
        .to_socket_addrs()
        .ok()?
        .map(|addr| addr.ip())
        .find(IpAddr::is_ipv4)
}
