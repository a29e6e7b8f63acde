//! Device identity used in every message
//!
//! Nodes identify themselves by the hostname they joined with, the
//! `ESP_XXXXXX` form derived from the station MAC. A configured mimic name
//! replaces it so a spare board can stand in for one that failed without
//! the collector noticing.

use core::fmt::Write as _;

use heapless::String;

use crate::config::NAME_MAX;
use crate::join::ConnectionInfo;

/// The `dev_id` carried by reports and statuses
pub type DeviceId = String<NAME_MAX>;

/// Hostname a station registers with when the stack assigns none
///
/// `ESP_` followed by the last three MAC bytes in upper-case hex.
pub fn default_hostname(mac: &[u8; 6]) -> DeviceId {
    let mut name = DeviceId::new();
    // 10 bytes always fit
    let _ = write!(name, "ESP_{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
    name
}

/// Pick the identity for this run
pub fn device_id(conn: &ConnectionInfo, mimic: Option<&str>) -> DeviceId {
    if let Some(mimic) = mimic.filter(|m| !m.is_empty()) {
        let mut id = DeviceId::new();
        if id.push_str(mimic).is_ok() {
            info!("reporting as {} instead of {}", id, conn.hostname);
            return id;
        }
        warn!("mimic name too long, keeping {}", conn.hostname);
    }

    if conn.hostname.is_empty() {
        return default_hostname(&conn.mac);
    }
    let mut id = DeviceId::new();
    match id.push_str(&conn.hostname) {
        Ok(()) => id,
        Err(_) => default_hostname(&conn.mac),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::Ipv4Addr;

    fn conn(hostname: &str) -> ConnectionInfo {
        let mut h = String::new();
        h.push_str(hostname).unwrap();
        ConnectionInfo {
            ip: Ipv4Addr::new(192, 168, 1, 42),
            mac: [0x5c, 0xcf, 0x7f, 0x29, 0x07, 0x67],
            hostname: h,
            rssi: -60,
            ssid: String::new(),
            attempts: 1,
            time_to_connect_ms: 0,
        }
    }

    #[test]
    fn test_default_hostname_from_mac() {
        let name = default_hostname(&[0x5c, 0xcf, 0x7f, 0x0a, 0x1b, 0x2c]);
        assert_eq!(name.as_str(), "ESP_0A1B2C");
    }

    #[test]
    fn test_hostname_is_identity() {
        assert_eq!(device_id(&conn("ESP_290767"), None).as_str(), "ESP_290767");
    }

    #[test]
    fn test_mimic_replaces_hostname() {
        let id = device_id(&conn("ESP_290767"), Some("ESP_49ECCD"));
        assert_eq!(id.as_str(), "ESP_49ECCD");
    }

    #[test]
    fn test_empty_mimic_ignored() {
        assert_eq!(device_id(&conn("ESP_290767"), Some("")).as_str(), "ESP_290767");
    }

    #[test]
    fn test_missing_hostname_falls_back_to_mac() {
        assert_eq!(device_id(&conn(""), None).as_str(), "ESP_290767");
    }
}
