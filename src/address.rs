//! Canonical socket address formatting
//!
//! Every connection source renders addresses through here so the table and
//! the filter see the same text regardless of where a connection came from.

use std::net::{IpAddr, SocketAddr};

/// Format a socket address as `ip:port` (IPv4) or `[ip]:port` (IPv6).
pub fn format_socket_addr(addr: &SocketAddr) -> String {
    format_ip_port(&addr.ip(), addr.port())
}

pub fn format_ip_port(ip: &IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, port),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, port),
    }
}

/// Format a remote address, rendering the unspecified peer of a listening
/// socket (`0.0.0.0:0` / `[::]:0`) as the empty string.
pub fn format_remote_addr(addr: &SocketAddr) -> String {
    if addr.ip().is_unspecified() && addr.port() == 0 {
        String::new()
    } else {
        format_socket_addr(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_format() {
        let addr: SocketAddr = "192.168.1.10:443".parse().unwrap();
        assert_eq!(format_socket_addr(&addr), "192.168.1.10:443");
    }

    #[test]
    fn test_ipv6_format_is_bracketed() {
        let addr: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(format_socket_addr(&addr), "[::1]:8080");

        let addr: SocketAddr = "[fe80::1cd4:a0ff:fed4:aa2a]:22".parse().unwrap();
        assert_eq!(format_socket_addr(&addr), "[fe80::1cd4:a0ff:fed4:aa2a]:22");
    }

    #[test]
    fn test_listening_remote_is_empty() {
        let v4: SocketAddr = "0.0.0.0:0".parse().unwrap();
        let v6: SocketAddr = "[::]:0".parse().unwrap();
        assert_eq!(format_remote_addr(&v4), "");
        assert_eq!(format_remote_addr(&v6), "");
    }

    #[test]
    fn test_wildcard_local_is_kept() {
        let addr: SocketAddr = "0.0.0.0:22".parse().unwrap();
        assert_eq!(format_remote_addr(&addr), "0.0.0.0:22");
    }
}
