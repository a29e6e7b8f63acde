//! Node configuration
//!
//! Plain structs with `Default` impls carrying the field defaults, loaded
//! from a single JSON document with `serde-json-core` (no allocation). A
//! document only needs the fields it overrides:
//!
//! ```json
//! {
//!   "app": { "name": "porch", "debug_mute": false },
//!   "wifi": { "access_points": [ { "ssid": "home", "pass": "secret" } ] },
//!   "client": { "servers": [ { "label": "udp1", "addr": "192.168.1.10", "port": 48431 } ] },
//!   "multicast": { "addr": "224.0.0.1", "port": 54321 },
//!   "sensor": { "scale": "C", "interval": 10000, "report": "CHG", "delta_t": 5 },
//!   "update": { "otadur": 120000 },
//!   "discovery": { "enabled": false }
//! }
//! ```
//!
//! Loading rejects non-positive intervals, thresholds and window durations;
//! the engine assumes they hold.

use core::net::{Ipv4Addr, SocketAddrV4};
use core::str::FromStr;

use heapless::{String, Vec};
use serde::Deserialize;

use sensor_node_hal::{SessionOptions, TemperatureScale};

use crate::error::ConfigError;

/// Access points that can be configured
pub const MAX_ACCESS_POINTS: usize = 4;
/// Longest SSID allowed by 802.11
pub const SSID_MAX: usize = 32;
/// Longest WPA passphrase
pub const PASSPHRASE_MAX: usize = 64;
/// Labelled peer endpoints that can be configured
pub const MAX_PEERS: usize = 4;
/// Peer label length (`udp1`, `udpx`, ...)
pub const LABEL_MAX: usize = 8;
/// Dotted-quad text, `255.255.255.255`
pub const ADDR_TEXT_MAX: usize = 15;
/// Application name, hostname and device id length
pub const NAME_MAX: usize = 32;
/// Update session password length
pub const PASSWORD_MAX: usize = 32;
/// Discovery query literal length
pub const QUERY_MAX: usize = 16;

/// Copy `s` into a fixed-capacity string
pub(crate) fn bounded<const N: usize>(s: &str) -> Result<String<N>, ConfigError> {
    let mut out = String::new();
    out.push_str(s).map_err(|_| ConfigError::TooLong)?;
    Ok(out)
}

/// Fixed-capacity copy of a literal known to fit
fn literal<const N: usize>(s: &str) -> String<N> {
    bounded(s).unwrap_or_default()
}

fn parse_ip(text: &str) -> Result<Ipv4Addr, ConfigError> {
    Ipv4Addr::from_str(text).map_err(|_| ConfigError::InvalidAddress)
}

/// Application-level settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String<NAME_MAX>,
    /// Suppress verbose per-sample and per-packet diagnostics
    pub debug_mute: bool,
    /// Identity to report as instead of the joined hostname
    pub mimic: Option<String<NAME_MAX>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: literal("sensor-node"),
            debug_mute: true,
            mimic: None,
        }
    }
}

/// One wireless network, identifier plus credential
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessPoint {
    pub ssid: String<SSID_MAX>,
    pub pass: String<PASSPHRASE_MAX>,
}

impl AccessPoint {
    pub fn new(ssid: &str, pass: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            ssid: bounded(ssid)?,
            pass: bounded(pass)?,
        })
    }
}

/// Access points in preference order
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub access_points: Vec<AccessPoint, MAX_ACCESS_POINTS>,
}

/// A labelled reporting endpoint as written in the configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerConfig {
    pub label: String<LABEL_MAX>,
    pub addr: String<ADDR_TEXT_MAX>,
    pub port: u16,
}

impl PeerConfig {
    pub fn new(label: &str, addr: &str, port: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            label: bounded(label)?,
            addr: bounded(addr)?,
            port,
        })
    }
}

/// Reporting endpoints and the local datagram port
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub servers: Vec<PeerConfig, MAX_PEERS>,
    /// Label of the endpoint used when discovery is disabled
    pub default_peer: String<LABEL_MAX>,
    /// Local port to bind, 0 lets the stack choose
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            default_peer: literal("udp1"),
            port: 0,
        }
    }
}

impl ClientConfig {
    pub fn server(&self, label: &str) -> Option<&PeerConfig> {
        self.servers.iter().find(|s| s.label == label)
    }

    pub fn default_server(&self) -> Option<&PeerConfig> {
        self.server(&self.default_peer)
    }
}

/// Multicast group for status broadcasts
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    /// Group address, broadcasts are skipped when absent
    pub addr: Option<String<ADDR_TEXT_MAX>>,
    pub port: u16,
}

impl MulticastConfig {
    pub fn new(addr: &str, port: u16) -> Result<Self, ConfigError> {
        Ok(Self {
            addr: Some(bounded(addr)?),
            port,
        })
    }

    /// Parsed group endpoint, `None` when not configured or unparsable
    pub fn group(&self) -> Option<SocketAddrV4> {
        let ip = parse_ip(self.addr.as_deref()?).ok()?;
        Some(SocketAddrV4::new(ip, self.port))
    }
}

/// When a valid sample is worth sending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportMode {
    /// Report every valid sample
    #[default]
    Always,
    /// Report only when temperature or humidity moved past its threshold
    OnChange,
}

impl ReportMode {
    /// `"CHG"` selects on-change reporting; any other label reports always
    pub fn from_label(label: &str) -> Self {
        if label == "CHG" {
            Self::OnChange
        } else {
            Self::Always
        }
    }
}

impl<'de> Deserialize<'de> for ReportMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct LabelVisitor;

        impl serde::de::Visitor<'_> for LabelVisitor {
            type Value = ReportMode;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str("a report mode label")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(ReportMode::from_label(v))
            }
        }

        deserializer.deserialize_str(LabelVisitor)
    }
}

/// Sampling and reporting policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub scale: TemperatureScale,
    /// Milliseconds between samples
    pub interval: u32,
    /// Milliseconds before retrying after an invalid reading
    pub error_interval: u32,
    pub report: ReportMode,
    /// Temperature change threshold in tenths of a degree
    pub delta_t: u16,
    /// Humidity change threshold in tenths of a percent
    pub delta_h: u16,
    /// Milliseconds to let the sensor settle before the first sample
    pub warmup: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            scale: TemperatureScale::Fahrenheit,
            interval: 5000,
            error_interval: 5000,
            report: ReportMode::Always,
            delta_t: 1,
            delta_h: 1,
            warmup: 30_000,
        }
    }
}

impl SensorConfig {
    pub fn temperature_threshold(&self) -> f32 {
        f32::from(self.delta_t) / 10.0
    }

    pub fn humidity_threshold(&self) -> f32 {
        f32::from(self.delta_h) / 10.0
    }
}

/// Remote update window and session options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub port: Option<u16>,
    pub host: Option<String<NAME_MAX>>,
    pub passw: Option<String<PASSWORD_MAX>>,
    /// Window duration in milliseconds
    pub otadur: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            port: None,
            host: None,
            passw: None,
            otadur: 60_000,
        }
    }
}

impl UpdateConfig {
    /// Session options; a zero port or empty text means platform default
    pub fn session_options(&self) -> SessionOptions<'_> {
        SessionOptions {
            port: self.port.filter(|p| *p > 0),
            hostname: self.host.as_deref().filter(|h| !h.is_empty()),
            password: self.passw.as_deref().filter(|p| !p.is_empty()),
        }
    }
}

/// Peer discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Learn the reporting peer at boot instead of using `default_peer`
    pub enabled: bool,
    pub query: String<QUERY_MAX>,
    /// Local port the reply is expected on
    pub reply_port: u16,
    /// Idle ticks before the query is broadcast again
    pub max_wait: u32,
    pub tick_ms: u32,
    /// Query broadcasts before giving up, `None` retries forever
    pub max_rounds: Option<u32>,
    /// Give up when the radio reports the link down
    pub abort_on_link_loss: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query: literal("REQ_IP"),
            reply_port: 43210,
            max_wait: 8,
            tick_ms: 250,
            max_rounds: None,
            abort_on_link_loss: true,
        }
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub app: AppConfig,
    pub wifi: WifiConfig,
    pub client: ClientConfig,
    pub multicast: MulticastConfig,
    pub sensor: SensorConfig,
    pub update: UpdateConfig,
    pub discovery: DiscoveryConfig,
}

impl NodeConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        let (config, _) =
            serde_json_core::from_slice::<Self>(json).map_err(|_| ConfigError::Malformed)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wifi.access_points.is_empty() {
            return Err(ConfigError::NoAccessPoints);
        }

        let sensor = &self.sensor;
        if sensor.interval == 0 {
            return Err(ConfigError::InvalidInterval("interval"));
        }
        if sensor.error_interval == 0 {
            return Err(ConfigError::InvalidInterval("error_interval"));
        }
        if sensor.delta_t == 0 {
            return Err(ConfigError::InvalidThreshold("delta_t"));
        }
        if sensor.delta_h == 0 {
            return Err(ConfigError::InvalidThreshold("delta_h"));
        }
        if self.update.otadur == 0 {
            return Err(ConfigError::InvalidWindow);
        }
        if self.discovery.tick_ms == 0 {
            return Err(ConfigError::InvalidInterval("tick_ms"));
        }
        if self.discovery.max_wait == 0 {
            return Err(ConfigError::InvalidInterval("max_wait"));
        }

        for server in &self.client.servers {
            parse_ip(&server.addr)?;
        }
        if let Some(addr) = &self.multicast.addr {
            parse_ip(addr)?;
        }
        if !self.discovery.enabled && self.client.default_server().is_none() {
            return Err(ConfigError::UnknownPeer);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &[u8] = br#"{
        "app": { "name": "porch", "debug_mute": false, "mimic": "ESP_123456" },
        "wifi": { "access_points": [
            { "ssid": "home", "pass": "secret" },
            { "ssid": "shop", "pass": "hunter22" }
        ] },
        "client": {
            "servers": [ { "label": "udp1", "addr": "192.168.1.10", "port": 48431 } ],
            "port": 48432
        },
        "multicast": { "addr": "224.0.0.1", "port": 54321 },
        "sensor": { "scale": "C", "interval": 10000, "report": "CHG", "delta_t": 5, "delta_h": 20 },
        "update": { "port": 8266, "passw": "pw", "otadur": 120000 },
        "discovery": { "enabled": false, "max_rounds": 3 }
    }"#;

    fn minimal() -> NodeConfig {
        let mut config = NodeConfig::default();
        config
            .wifi
            .access_points
            .push(AccessPoint::new("home", "secret").unwrap())
            .unwrap();
        config
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert!(config.app.debug_mute);
        assert_eq!(config.client.default_peer.as_str(), "udp1");
        assert_eq!(config.sensor.scale, TemperatureScale::Fahrenheit);
        assert_eq!(config.sensor.interval, 5000);
        assert_eq!(config.sensor.error_interval, 5000);
        assert_eq!(config.sensor.warmup, 30_000);
        assert_eq!(config.sensor.report, ReportMode::Always);
        assert_eq!(config.update.otadur, 60_000);
        assert_eq!(config.discovery.query.as_str(), "REQ_IP");
        assert_eq!(config.discovery.reply_port, 43210);
        assert_eq!(config.discovery.max_wait, 8);
        assert!(config.discovery.max_rounds.is_none());
        assert!(config.multicast.group().is_none());
    }

    #[test]
    fn test_from_json_full_document() {
        let config = NodeConfig::from_json(FULL).unwrap();
        assert_eq!(config.app.name.as_str(), "porch");
        assert!(!config.app.debug_mute);
        assert_eq!(config.app.mimic.as_deref(), Some("ESP_123456"));
        assert_eq!(config.wifi.access_points.len(), 2);
        assert_eq!(config.wifi.access_points[1].ssid.as_str(), "shop");
        assert_eq!(config.client.port, 48432);
        assert_eq!(config.client.default_server().unwrap().port, 48431);
        assert_eq!(
            config.multicast.group(),
            Some(SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 1), 54321))
        );
        assert_eq!(config.sensor.scale, TemperatureScale::Celsius);
        assert_eq!(config.sensor.report, ReportMode::OnChange);
        assert_eq!(config.sensor.temperature_threshold(), 0.5);
        assert_eq!(config.sensor.humidity_threshold(), 2.0);
        // untouched fields keep their defaults
        assert_eq!(config.sensor.error_interval, 5000);
        assert_eq!(config.update.session_options().port, Some(8266));
        assert_eq!(config.update.session_options().password, Some("pw"));
        assert!(config.update.session_options().hostname.is_none());
        assert_eq!(config.discovery.max_rounds, Some(3));
        assert!(config.discovery.abort_on_link_loss);
    }

    #[test]
    fn test_unknown_report_mode_reports_always() {
        assert_eq!(ReportMode::from_label("ALL"), ReportMode::Always);
        assert_eq!(ReportMode::from_label("chg"), ReportMode::Always);
        assert_eq!(ReportMode::from_label("CHG"), ReportMode::OnChange);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert_eq!(
            NodeConfig::from_json(b"{\"sensor\":"),
            Err(ConfigError::Malformed)
        );
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = minimal();
        assert_eq!(config.validate(), Ok(()));

        config.sensor.interval = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidInterval("interval"))
        );

        let mut config = minimal();
        config.sensor.delta_h = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreshold("delta_h"))
        );

        let mut config = minimal();
        config.update.otadur = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidWindow));
    }

    #[test]
    fn test_validate_addresses_and_peers() {
        assert_eq!(
            NodeConfig::default().validate(),
            Err(ConfigError::NoAccessPoints)
        );

        let mut config = minimal();
        config.multicast = MulticastConfig::new("224.0.0.300", 5000).unwrap();
        assert_eq!(config.validate(), Err(ConfigError::InvalidAddress));

        let mut config = minimal();
        config.discovery.enabled = false;
        assert_eq!(config.validate(), Err(ConfigError::UnknownPeer));

        config
            .client
            .servers
            .push(PeerConfig::new("udp1", "10.0.0.5", 48431).unwrap())
            .unwrap();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_bounded_rejects_overflow() {
        assert_eq!(
            AccessPoint::new(&"x".repeat(SSID_MAX + 1), "p"),
            Err(ConfigError::TooLong)
        );
    }
}
