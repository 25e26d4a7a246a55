//! Port probing.

use std::net::TcpListener;

use crate::error::ServerError;

/// Ports tried above the starting port before giving up.
pub const PORT_SCAN_RANGE: u16 = 100;

/// `true` if a listener can bind `host:port` right now.
pub fn is_bindable(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// First port in `start..start + PORT_SCAN_RANGE` that `taken` rejects
/// neither in the registry nor at the OS.
pub fn scan(host: &str, start: u16, taken: impl Fn(u16) -> bool) -> Result<u16, ServerError> {
    let start = start.max(1);
    let end = start.saturating_add(PORT_SCAN_RANGE - 1);
    (start..=end)
        .find(|&port| !taken(port) && is_bindable(host, port))
        .ok_or_else(|| ServerError::NoFreePort {
            host: host.to_string(),
            start,
            end,
        })
}

/// `host:port`, bracketing IPv6 literals.
pub fn bind_addr(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_bound_ports() {
        let held = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = held.local_addr().unwrap().port();
        let found = scan("127.0.0.1", port, |_| false).unwrap();
        assert_ne!(found, port);
        assert!(found > port);
    }

    #[test]
    fn skips_registry_ports() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let found = scan("127.0.0.1", port, |p| p == port).unwrap();
        assert_ne!(found, port);
    }

    #[test]
    fn scan_is_bounded() {
        let err = scan("127.0.0.1", 20000, |_| true).unwrap_err();
        assert!(matches!(err, ServerError::NoFreePort { start: 20000, end: 20099, .. }));
    }

    #[test]
    fn scan_stops_at_u16_max() {
        let err = scan("127.0.0.1", 65500, |_| true).unwrap_err();
        assert!(matches!(err, ServerError::NoFreePort { end: 65535, .. }));
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        assert_eq!(bind_addr("127.0.0.1", 8000), "127.0.0.1:8000");
        assert_eq!(bind_addr("::1", 8000), "[::1]:8000");
        assert_eq!(bind_addr("localhost", 80), "localhost:80");
    }
}
