//! Scheduling loop
//!
//! [`Node`] owns the hardware parts and the engine components and runs them
//! cooperatively on a single thread. Startup goes join, open transport,
//! find the peer, open the update window, start sampling. Each pass after
//! that polls the transport, ticks the update window, then runs a due
//! sensor sample, always in that order, so a received datagram is in the
//! read buffer before anything else can send.

use sensor_node_hal::{Clock, DatagramSocket, TempHumiditySensor, UpdateSession, WifiRadio};

use crate::config::NodeConfig;
use crate::device_id::{device_id, DeviceId};
use crate::discovery::Discovery;
use crate::error::{ConfigError, NodeError};
use crate::join::{ConnectionInfo, JoinController};
use crate::message::status;
use crate::sensor::{SampleOutcome, SensorReporter};
use crate::transport::{DatagramTransport, Inbound, PeerEndpoint};
use crate::update::UpdateWindow;

/// Yield between scheduling passes
pub const PASS_YIELD_MS: u32 = 10;
/// Wait before retrying a startup that failed after joining
pub const RESTART_DELAY_MS: u32 = 5_000;

/// Hardware the node runs on
pub struct NodeParts<R, S, T, U, C> {
    pub radio: R,
    pub socket: S,
    pub sensor: T,
    pub session: U,
    pub clock: C,
}

/// What one scheduling pass did
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PassSummary {
    /// Datagram taken off the socket; its bytes stay in the read buffer
    /// until the next pass
    pub inbound: Inbound,
    /// The update window was still open after this pass
    pub update_open: bool,
    pub sample: SampleOutcome,
}

/// The connectivity and reporting engine bound to its hardware
pub struct Node<R, S, T, U, C> {
    config: NodeConfig,
    radio: R,
    sensor: T,
    session: U,
    clock: C,
    transport: DatagramTransport<S>,
    join: JoinController,
    window: UpdateWindow,
    reporter: SensorReporter,
    /// Set once `start` has succeeded
    dev_id: Option<DeviceId>,
}

impl<R, S, T, U, C> Node<R, S, T, U, C>
where
    R: WifiRadio,
    S: DatagramSocket,
    T: TempHumiditySensor,
    U: UpdateSession,
    C: Clock,
{
    /// Validate `config` and assemble the engine; nothing touches the
    /// hardware until [`start`](Self::start)
    pub fn new(config: NodeConfig, parts: NodeParts<R, S, T, U, C>) -> Result<Self, NodeError> {
        config.validate()?;
        let muted = config.app.debug_mute;
        Ok(Self {
            transport: DatagramTransport::new(parts.socket, config.multicast.group(), muted),
            join: JoinController::new(muted),
            window: UpdateWindow::new(muted),
            reporter: SensorReporter::new(&config.sensor, muted),
            radio: parts.radio,
            sensor: parts.sensor,
            session: parts.session,
            clock: parts.clock,
            dev_id: None,
            config,
        })
    }

    /// Bring the node up
    ///
    /// A [`NodeError::Join`] is terminal. After any other error the node
    /// can be started again, which re-joins from scratch. The update window
    /// only ever opens on the first successful start.
    pub fn start(&mut self) -> Result<(), NodeError> {
        self.dev_id = None;
        let muted = self.config.app.debug_mute;
        info!("{} starting", self.config.app.name);

        let conn =
            self.join
                .join(&mut self.radio, &mut self.clock, &self.config.wifi.access_points)?;
        let dev_id = device_id(conn, self.config.app.mimic.as_deref());
        self.transport.set_interface(conn.ip);
        self.transport.open(self.config.client.port)?;

        if self.config.discovery.enabled {
            Discovery::new(&self.config.discovery, muted).discover_peer(
                &mut self.transport,
                &mut self.radio,
                &mut self.clock,
                &dev_id,
            )?;
        } else {
            let server = self
                .config
                .client
                .default_server()
                .ok_or(ConfigError::UnknownPeer)?;
            self.transport.bind_peer(PeerEndpoint::from_config(server)?);
            if let Err(e) = self
                .transport
                .broadcast_status(&dev_id, status::APP_READY, None)
            {
                warn!("ready status not sent: {}", e);
            }
        }

        let now = self.clock.now_ms();
        self.window.open(
            now,
            self.config.update.otadur,
            &mut self.session,
            &self.config.update.session_options(),
            &mut self.transport,
            &dev_id,
        );
        self.reporter.start(self.clock.now_ms());

        info!("{} up as {}", self.config.app.name, dev_id);
        self.dev_id = Some(dev_id);
        Ok(())
    }

    /// Run one scheduling pass
    pub fn poll_once(&mut self) -> Result<PassSummary, NodeError> {
        let Some(dev_id) = self.dev_id.as_ref() else {
            return Err(NodeError::NotStarted);
        };

        let inbound = self.transport.poll();
        let update_open =
            self.window
                .tick(self.clock.now_ms(), &mut self.session, &mut self.transport, dev_id);
        let sample = self.reporter.poll(
            self.clock.now_ms(),
            &mut self.sensor,
            &mut self.transport,
            dev_id,
        );

        Ok(PassSummary {
            inbound,
            update_open,
            sample,
        })
    }

    /// Start if needed, then run scheduling passes forever
    ///
    /// A failed join parks the node; the board has to be reset.
    pub fn run(&mut self) -> ! {
        loop {
            if self.dev_id.is_none() {
                match self.start() {
                    Ok(()) => {}
                    Err(NodeError::Join(e)) => {
                        error!("{}, halting", e);
                        loop {
                            self.clock.delay_ms(RESTART_DELAY_MS);
                        }
                    }
                    Err(e) => {
                        error!("start failed: {}", e);
                        self.clock.delay_ms(RESTART_DELAY_MS);
                        continue;
                    }
                }
            }

            if let Err(e) = self.poll_once() {
                warn!("pass skipped: {}", e);
            }
            self.clock.delay_ms(PASS_YIELD_MS);
        }
    }

    /// Send an on-demand report outside the sampling schedule
    pub fn report_now(&mut self) -> Result<SampleOutcome, NodeError> {
        let dev_id = self.dev_id.as_ref().ok_or(NodeError::NotStarted)?;
        Ok(self
            .reporter
            .report_now(&mut self.sensor, &mut self.transport, dev_id))
    }

    /// Close the update window before its deadline
    pub fn stop_update(&mut self) -> Result<(), NodeError> {
        let dev_id = self.dev_id.as_ref().ok_or(NodeError::NotStarted)?;
        self.window.stop(&mut self.transport, dev_id);
        Ok(())
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.join.connection()
    }

    /// Identity in use, `None` until started
    pub fn dev_id(&self) -> Option<&str> {
        self.dev_id.as_deref()
    }

    pub fn transport(&self) -> &DatagramTransport<S> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut DatagramTransport<S> {
        &mut self.transport
    }

    pub fn reporter(&self) -> &SensorReporter {
        &self.reporter
    }

    pub fn window(&self) -> &UpdateWindow {
        &self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::{Ipv4Addr, SocketAddrV4};
    use sensor_node_hal::mock::{MockClock, MockRadio, MockSensor, MockSocket, MockUpdateSession};
    use sensor_node_hal::SessionEvent;

    use crate::config::{AccessPoint, MulticastConfig, PeerConfig};
    use crate::error::{DiscoveryError, JoinError, TransportError};
    use crate::update::WindowState;

    type TestNode = Node<MockRadio, MockSocket, MockSensor, MockUpdateSession, MockClock>;

    struct Rig {
        node: TestNode,
        radio: MockRadio,
        socket: MockSocket,
        sensor: MockSensor,
        session: MockUpdateSession,
        clock: MockClock,
    }

    impl Rig {
        fn texts(&self) -> std::vec::Vec<std::string::String> {
            self.socket.sent().iter().map(|d| d.text()).collect()
        }
    }

    fn config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config
            .wifi
            .access_points
            .push(AccessPoint::new("home", "secret").unwrap())
            .unwrap();
        config
            .client
            .servers
            .push(PeerConfig::new("udp1", "192.168.1.10", 48431).unwrap())
            .unwrap();
        config.client.port = 48432;
        config.multicast = MulticastConfig::new("224.0.0.1", 54321).unwrap();
        config.discovery.enabled = false;
        config.sensor.warmup = 0;
        config
    }

    fn rig(config: NodeConfig) -> Rig {
        let radio = MockRadio::new().with_network("home", "secret");
        let socket = MockSocket::new();
        let sensor = MockSensor::new();
        let session = MockUpdateSession::new();
        let clock = MockClock::new();
        let node = Node::new(
            config,
            NodeParts {
                radio: radio.clone(),
                socket: socket.clone(),
                sensor: sensor.clone(),
                session: session.clone(),
                clock: clock.clone(),
            },
        )
        .unwrap();
        Rig {
            node,
            radio,
            socket,
            sensor,
            session,
            clock,
        }
    }

    #[test]
    fn test_start_with_configured_peer() {
        let mut rig = rig(config());
        rig.node.start().unwrap();

        assert_eq!(rig.node.dev_id(), Some("ESP_0A1B2C"));
        assert_eq!(rig.socket.bound_ports(), [48432]);
        let peer = rig.node.transport().peer().unwrap();
        assert_eq!(peer.label(), "udp1");
        assert_eq!(peer.port(), 48431);

        let sent = rig.socket.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0].text(),
            r#"{"dev_id":"ESP_0A1B2C","status":"APP_READY"}"#
        );
        assert_eq!(sent[0].interface, Some(Ipv4Addr::new(192, 168, 1, 42)));
        assert!(sent[1].text().contains("OTA_READY"));

        assert!(rig.node.window().is_open());
        assert_eq!(rig.node.reporter().next_due(), Some(0));
        assert!(rig.session.begun_with().is_some());
    }

    #[test]
    fn test_start_with_discovery() {
        let mut config = config();
        config.discovery.enabled = true;
        let mut rig = rig(config);
        rig.socket.push_inbound(
            br#"{"reply":"IP_ADDR","ip":"192.168.1.77","port":50000}"#,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 77), 43210),
        );
        rig.node.start().unwrap();

        let peer = rig.node.transport().peer().unwrap();
        assert_eq!(peer.label(), "udpx");
        assert_eq!(peer.addr(), "192.168.1.77");
        assert_eq!(rig.socket.bound_ports(), [48432, 43210]);

        let texts = rig.texts();
        assert!(texts[0].contains("REQ_IP"));
        assert!(texts[1].contains("APP_READY"));
        assert!(texts[2].contains("OTA_READY"));
    }

    #[test]
    fn test_poll_before_start() {
        let mut rig = rig(config());
        assert_eq!(rig.node.poll_once(), Err(NodeError::NotStarted));
        assert_eq!(rig.node.report_now(), Err(NodeError::NotStarted));
        assert!(rig.socket.sent().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.sensor.interval = 0;
        let result = Node::new(
            config,
            NodeParts {
                radio: MockRadio::new(),
                socket: MockSocket::new(),
                sensor: MockSensor::new(),
                session: MockUpdateSession::new(),
                clock: MockClock::new(),
            },
        );
        assert!(matches!(
            result,
            Err(NodeError::Config(ConfigError::InvalidInterval("interval")))
        ));
    }

    #[test]
    fn test_join_failure_is_reported() {
        let mut config = config();
        config.wifi.access_points.clear();
        config
            .wifi
            .access_points
            .push(AccessPoint::new("ghost", "x").unwrap())
            .unwrap();
        let mut rig = rig(config);

        assert!(matches!(
            rig.node.start(),
            Err(NodeError::Join(JoinError::Exhausted { .. }))
        ));
        assert!(rig.node.connection().is_none());
        assert_eq!(rig.node.poll_once(), Err(NodeError::NotStarted));
        assert!(rig.socket.sent().is_empty());
    }

    #[test]
    fn test_bind_failure_stops_start() {
        let mut rig = rig(config());
        rig.socket.set_fail_bind(true);
        assert!(matches!(
            rig.node.start(),
            Err(NodeError::Transport(TransportError::Bind(_)))
        ));
        assert!(rig.node.dev_id().is_none());
    }

    #[test]
    fn test_failed_discovery_can_restart() {
        let mut config = config();
        config.discovery.enabled = true;
        config.discovery.max_rounds = Some(1);
        let mut rig = rig(config);

        assert_eq!(
            rig.node.start(),
            Err(NodeError::Discovery(DiscoveryError::Exhausted { rounds: 1 }))
        );
        assert!(!rig.node.window().is_open());

        rig.socket.push_inbound(
            br#"{"reply":"IP_ADDR","ip":"192.168.1.77","port":50000}"#,
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 77), 43210),
        );
        rig.node.start().unwrap();
        assert_eq!(rig.radio.attempts().len(), 2);
        assert!(rig.node.window().is_open());
    }

    #[test]
    fn test_mimic_identity_in_messages() {
        let mut config = config();
        config.app.mimic = Some(heapless::String::try_from("ESP_49ECCD").unwrap());
        let mut rig = rig(config);
        rig.node.start().unwrap();
        assert!(rig.texts().iter().all(|t| t.contains("ESP_49ECCD")));
    }

    #[test]
    fn test_pass_order_and_window_expiry() {
        let mut rig = rig(config());
        rig.node.start().unwrap();
        rig.socket.clear_sent();

        rig.sensor.push(20.0, 40.0);
        rig.session.push_event(SessionEvent::Started);
        rig.socket.push_inbound(
            b"ping",
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 48431),
        );

        let pass = rig.node.poll_once().unwrap();
        assert_eq!(pass.inbound, Inbound::Datagram(4));
        assert_eq!(rig.node.transport().read_payload(), b"ping");
        assert!(pass.update_open);
        assert!(matches!(pass.sample, SampleOutcome::Reported { seq: 1, .. }));

        let texts = rig.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("OTA_START"));
        assert!(texts[1].contains(r#""seq":1"#));

        rig.clock.set(1_000);
        let pass = rig.node.poll_once().unwrap();
        assert_eq!(pass.inbound, Inbound::Empty);
        assert_eq!(pass.sample, SampleOutcome::NotDue);

        // window counts down even with the link gone
        rig.radio.drop_link();
        rig.clock.set(60_000);
        let pass = rig.node.poll_once().unwrap();
        assert!(!pass.update_open);
        assert_eq!(rig.node.window().state(), WindowState::Closed);
        assert!(rig.texts().iter().any(|t| t.contains("OTA_STOP")));
    }

    #[test]
    fn test_report_now_and_stop_update() {
        let mut rig = rig(config());
        rig.node.start().unwrap();
        rig.sensor.push(21.5, 45.0);

        let outcome = rig.node.report_now().unwrap();
        assert!(matches!(outcome, SampleOutcome::Reported { seq: 1, .. }));

        rig.node.stop_update().unwrap();
        assert_eq!(rig.node.window().state(), WindowState::Closed);
        let pass = rig.node.poll_once().unwrap();
        assert!(!pass.update_open);
    }
}
