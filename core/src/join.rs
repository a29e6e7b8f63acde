//! Wireless network join
//!
//! Walks the configured access points in preference order, making a fixed
//! number of bounded attempts on each, and stops at the first success.
//! Nothing here re-joins after a dropped link; that is up to the
//! application loop.

use core::net::Ipv4Addr;

use embedded_io::Error as _;
use heapless::{String, Vec};

use sensor_node_hal::{Clock, LinkStatus, WifiRadio, HOSTNAME_MAX};

use crate::config::{AccessPoint, MAX_ACCESS_POINTS, SSID_MAX};
use crate::error::JoinError;

/// Attempts made on each access point before moving to the next
pub const ATTEMPTS_PER_ACCESS_POINT: u32 = 5;
/// How long one attempt may stay connecting
pub const ATTEMPT_TIMEOUT_MS: u64 = 5_000;
/// Link status poll period while an attempt is in progress
pub const STATUS_POLL_MS: u32 = 100;

/// Live connection parameters, produced once per successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub ip: Ipv4Addr,
    pub mac: [u8; 6],
    pub hostname: String<HOSTNAME_MAX>,
    /// Signal strength in dBm
    pub rssi: i8,
    /// Access point that accepted us
    pub ssid: String<SSID_MAX>,
    /// Attempts made across all access points, the successful one included
    pub attempts: u32,
    pub time_to_connect_ms: u64,
}

/// Outcome of a single attempt
enum Attempt {
    Connected,
    Refused,
    TimedOut,
}

/// Owns [`ConnectionInfo`]; other components only borrow it
#[derive(Debug, Default)]
pub struct JoinController {
    connection: Option<ConnectionInfo>,
    muted: bool,
}

impl JoinController {
    pub fn new(muted: bool) -> Self {
        Self {
            connection: None,
            muted,
        }
    }

    /// Connection from the last successful join
    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    /// Join the first access point that accepts us
    ///
    /// Any previous connection info is discarded first, so after a failure
    /// [`connection`](Self::connection) is `None`.
    pub fn join<R, C>(
        &mut self,
        radio: &mut R,
        clock: &mut C,
        access_points: &[AccessPoint],
    ) -> Result<&ConnectionInfo, JoinError>
    where
        R: WifiRadio,
        C: Clock,
    {
        self.connection = None;
        let started = clock.now_ms();
        let mut attempts = 0u32;
        let mut attempted: Vec<String<SSID_MAX>, MAX_ACCESS_POINTS> = Vec::new();

        for ap in access_points {
            // entries past capacity are still tried, just not listed on failure
            if attempted.push(ap.ssid.clone()).is_err() {
                warn!("{} will not be listed if the join fails", ap.ssid);
            }

            for n in 1..=ATTEMPTS_PER_ACCESS_POINT {
                attempts += 1;
                info!("joining {} (attempt {} of {})", ap.ssid, n, ATTEMPTS_PER_ACCESS_POINT);

                match self.attempt(radio, clock, ap) {
                    Attempt::Connected => match radio.link_info() {
                        Some(link) => {
                            let info = ConnectionInfo {
                                ip: link.ip,
                                mac: link.mac,
                                hostname: link.hostname,
                                rssi: link.rssi,
                                ssid: ap.ssid.clone(),
                                attempts,
                                time_to_connect_ms: clock.elapsed_since(started),
                            };
                            info!(
                                "joined {} as {} after {} attempts, rssi {} dBm",
                                ap.ssid,
                                info.hostname,
                                attempts,
                                info.rssi
                            );
                            let info: &ConnectionInfo = self.connection.insert(info);
                            return Ok(info);
                        }
                        None => warn!("{} reported connected without link info", ap.ssid),
                    },
                    Attempt::Refused => warn!("{} refused the connection", ap.ssid),
                    Attempt::TimedOut => warn!("{} timed out", ap.ssid),
                }
                radio.disconnect();
            }
        }

        error!("no access point accepted the connection");
        Err(JoinError::Exhausted {
            attempted,
            attempts,
        })
    }

    fn attempt<R, C>(&self, radio: &mut R, clock: &mut C, ap: &AccessPoint) -> Attempt
    where
        R: WifiRadio,
        C: Clock,
    {
        if let Err(e) = radio.begin(&ap.ssid, &ap.pass) {
            warn!("radio refused to start association: {:?}", e.kind());
            return Attempt::Refused;
        }

        let began = clock.now_ms();
        loop {
            match radio.status() {
                LinkStatus::Connected => return Attempt::Connected,
                LinkStatus::Failed => return Attempt::Refused,
                LinkStatus::Idle | LinkStatus::Connecting => {}
            }
            if clock.elapsed_since(began) >= ATTEMPT_TIMEOUT_MS {
                return Attempt::TimedOut;
            }
            diag!(self.muted, "waiting for {}", ap.ssid);
            clock.delay_ms(STATUS_POLL_MS);
        }
    }
}
