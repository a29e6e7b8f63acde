//! Mock WiFi radio with scripted access points

use core::net::Ipv4Addr;
use std::cell::RefCell;
use std::rc::Rc;
use std::string::{String, ToString};
use std::vec::Vec;

use embedded_io::ErrorKind;

use super::MockError;
use crate::radio::{LinkInfo, LinkStatus, WifiRadio};

/// Status polls that never settle
const NEVER: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct Network {
    ssid: String,
    passphrase: String,
    /// Attempts that time out before one succeeds
    stalls_left: u32,
    /// Attempts are refused outright when set
    refuses: bool,
}

#[derive(Debug)]
struct RadioState {
    networks: Vec<Network>,
    status: LinkStatus,
    polls_until_connected: u32,
    connect_polls: u32,
    begins: Vec<String>,
    disconnects: u32,
    fail_begin: bool,
    ip: Ipv4Addr,
    mac: [u8; 6],
    hostname: String,
    rssi: i8,
}

/// Scripted station radio
///
/// Networks are registered up front. `begin` against an unknown SSID leaves
/// the radio connecting forever, a wrong passphrase fails the attempt, and a
/// matching passphrase connects after `connect_polls` status polls.
#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Rc<RefCell<RadioState>>,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RadioState {
                networks: Vec::new(),
                status: LinkStatus::Idle,
                polls_until_connected: NEVER,
                connect_polls: 0,
                begins: Vec::new(),
                disconnects: 0,
                fail_begin: false,
                ip: Ipv4Addr::new(192, 168, 1, 42),
                mac: [0x5c, 0xcf, 0x7f, 0x0a, 0x1b, 0x2c],
                hostname: "ESP_0A1B2C".to_string(),
                rssi: -61,
            })),
        }
    }

    /// Register a reachable network
    pub fn with_network(self, ssid: &str, passphrase: &str) -> Self {
        self.add(ssid, passphrase, 0, false)
    }

    /// Register a network whose first `stalls` attempts time out
    pub fn with_stalling_network(self, ssid: &str, passphrase: &str, stalls: u32) -> Self {
        self.add(ssid, passphrase, stalls, false)
    }

    /// Register a network that refuses every attempt
    pub fn with_refusing_network(self, ssid: &str) -> Self {
        self.add(ssid, "", 0, true)
    }

    /// Status polls spent connecting before an attempt succeeds
    pub fn with_connect_polls(self, polls: u32) -> Self {
        self.state.borrow_mut().connect_polls = polls;
        self
    }

    pub fn with_link(self, ip: Ipv4Addr, mac: [u8; 6], hostname: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.ip = ip;
            state.mac = mac;
            state.hostname = hostname.to_string();
        }
        self
    }

    /// Make every `begin` call return a driver error
    pub fn with_failing_begin(self) -> Self {
        self.state.borrow_mut().fail_begin = true;
        self
    }

    fn add(self, ssid: &str, passphrase: &str, stalls: u32, refuses: bool) -> Self {
        self.state.borrow_mut().networks.push(Network {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
            stalls_left: stalls,
            refuses,
        });
        self
    }

    /// Simulate losing the association
    pub fn drop_link(&self) {
        let mut state = self.state.borrow_mut();
        state.status = LinkStatus::Idle;
        state.polls_until_connected = NEVER;
    }

    /// SSIDs passed to `begin`, in call order
    pub fn attempts(&self) -> Vec<String> {
        self.state.borrow().begins.clone()
    }

    pub fn disconnects(&self) -> u32 {
        self.state.borrow().disconnects
    }
}

impl WifiRadio for MockRadio {
    type Error = MockError;

    fn begin(&mut self, ssid: &str, passphrase: &str) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        state.begins.push(ssid.to_string());
        if state.fail_begin {
            return Err(MockError(ErrorKind::Other));
        }

        let connect_polls = state.connect_polls;
        let outcome = match state.networks.iter_mut().find(|n| n.ssid == ssid) {
            None => (LinkStatus::Connecting, NEVER),
            Some(n) if n.refuses || n.passphrase != passphrase => (LinkStatus::Failed, NEVER),
            Some(n) if n.stalls_left > 0 => {
                n.stalls_left -= 1;
                (LinkStatus::Connecting, NEVER)
            }
            Some(_) if connect_polls == 0 => (LinkStatus::Connected, 0),
            Some(_) => (LinkStatus::Connecting, connect_polls),
        };
        state.status = outcome.0;
        state.polls_until_connected = outcome.1;
        Ok(())
    }

    fn status(&mut self) -> LinkStatus {
        let mut state = self.state.borrow_mut();
        if state.status == LinkStatus::Connecting && state.polls_until_connected != NEVER {
            if state.polls_until_connected <= 1 {
                state.status = LinkStatus::Connected;
                state.polls_until_connected = 0;
            } else {
                state.polls_until_connected -= 1;
            }
        }
        state.status
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.status = LinkStatus::Idle;
        state.polls_until_connected = NEVER;
        state.disconnects += 1;
    }

    fn link_info(&self) -> Option<LinkInfo> {
        let state = self.state.borrow();
        if state.status != LinkStatus::Connected {
            return None;
        }
        let mut hostname = heapless::String::new();
        hostname.push_str(&state.hostname).ok()?;
        Some(LinkInfo {
            ip: state.ip,
            mac: state.mac,
            hostname,
            rssi: state.rssi,
        })
    }
}
