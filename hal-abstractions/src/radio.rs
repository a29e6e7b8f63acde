//! Wireless station interface

use core::net::Ipv4Addr;

use heapless::String;

/// Maximum length of the hostname assigned by the radio stack
pub const HOSTNAME_MAX: usize = 32;

/// Association state reported by the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// Not associated and not trying
    Idle,
    /// Association or DHCP still in progress
    Connecting,
    /// Associated with an IPv4 address
    Connected,
    /// The access point rejected us (bad passphrase, no such SSID)
    Failed,
}

/// Link parameters captured once the station is connected
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    /// Address assigned by DHCP
    pub ip: Ipv4Addr,
    /// Station MAC address
    pub mac: [u8; 6],
    /// Hostname the station registered with
    pub hostname: String<HOSTNAME_MAX>,
    /// Received signal strength in dBm
    pub rssi: i8,
}

/// Station-mode WiFi radio
///
/// `begin` starts an association attempt and returns immediately; the caller
/// polls `status` until the attempt settles.
pub trait WifiRadio {
    /// Driver error type
    type Error: embedded_io::Error;

    /// Start associating with `ssid`
    fn begin(&mut self, ssid: &str, passphrase: &str) -> Result<(), Self::Error>;

    /// Current association state
    fn status(&mut self) -> LinkStatus;

    /// Drop any association or pending attempt
    fn disconnect(&mut self);

    /// Link parameters, `None` unless connected
    fn link_info(&self) -> Option<LinkInfo>;

    /// Whether the station currently holds a connection
    fn is_connected(&mut self) -> bool {
        self.status() == LinkStatus::Connected
    }
}
