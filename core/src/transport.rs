//! Datagram transport
//!
//! Owns the socket and the two fixed datagram buffers. Every component that
//! talks to the network goes through here: sensor reports go to the active
//! peer, statuses go to the multicast group, replies go to whoever sent the
//! last datagram.
//!
//! Only one component runs per scheduling pass, so a single write buffer is
//! enough; the read buffer holds the last accepted datagram until the next
//! [`DatagramTransport::poll`].

use core::fmt::Write as _;
use core::net::{Ipv4Addr, SocketAddrV4};
use core::str::FromStr;

use embedded_io::Error as _;
use heapless::String;

use sensor_node_hal::DatagramSocket;

use crate::config::{bounded, PeerConfig, ADDR_TEXT_MAX, LABEL_MAX};
use crate::error::{ConfigError, TransportError};
use crate::message::StatusMessage;

/// Largest payload that may be sent or accepted
pub const MAX_PAYLOAD: usize = 75;
/// Buffer capacity: payload plus one byte of headroom for a terminator
pub const BUFFER_LEN: usize = MAX_PAYLOAD + 1;

/// `a.b.c.d:port`
const ENDPOINT_TEXT_MAX: usize = ADDR_TEXT_MAX + 6;

pub(crate) fn endpoint_text(addr: SocketAddrV4) -> String<ENDPOINT_TEXT_MAX> {
    let mut text = String::new();
    // always fits
    let _ = write!(text, "{}", addr);
    text
}

/// Fixed-capacity datagram buffer with an explicit length
#[derive(Clone)]
pub struct DatagramBuffer {
    bytes: [u8; BUFFER_LEN],
    len: usize,
}

impl DatagramBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; BUFFER_LEN],
            len: 0,
        }
    }

    /// Valid bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Whole buffer, including the zero padding after the valid bytes
    pub fn raw(&self) -> &[u8; BUFFER_LEN] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `payload` in and zero the remainder; caller checks the size
    fn fill(&mut self, payload: &[u8]) {
        self.bytes = [0; BUFFER_LEN];
        self.bytes[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
    }

    fn clear(&mut self) {
        self.bytes = [0; BUFFER_LEN];
        self.len = 0;
    }
}

impl Default for DatagramBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for DatagramBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatagramBuffer")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// The peer reports are sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    label: String<LABEL_MAX>,
    addr: String<ADDR_TEXT_MAX>,
    ip: Ipv4Addr,
    port: u16,
}

impl PeerEndpoint {
    pub fn new(label: &str, ip: Ipv4Addr, port: u16) -> Result<Self, ConfigError> {
        let mut addr = String::new();
        write!(addr, "{}", ip).map_err(|_| ConfigError::TooLong)?;
        Ok(Self {
            label: bounded(label)?,
            addr,
            ip,
            port,
        })
    }

    /// Build from a textual dotted-quad address
    pub fn parse(label: &str, addr: &str, port: u16) -> Result<Self, ConfigError> {
        let ip = Ipv4Addr::from_str(addr).map_err(|_| ConfigError::InvalidAddress)?;
        Self::new(label, ip, port)
    }

    pub fn from_config(config: &PeerConfig) -> Result<Self, ConfigError> {
        Self::parse(&config.label, &config.addr, config.port)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PeerEndpoint {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{}={}:{}", self.label(), self.addr(), self.port)
    }
}

/// Result of polling for an incoming datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Inbound {
    /// Nothing pending
    Empty,
    /// A datagram of this length is in the read buffer
    Datagram(usize),
    /// A datagram of this wire length exceeded the payload limit and was
    /// discarded; the read buffer does not hold it
    Oversized(usize),
}

impl Inbound {
    /// Received length, 0 when nothing was pending
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Datagram(len) | Self::Oversized(len) => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Datagram transport over a [`DatagramSocket`]
pub struct DatagramTransport<S> {
    socket: S,
    read: DatagramBuffer,
    write: DatagramBuffer,
    peer: Option<PeerEndpoint>,
    multicast: Option<SocketAddrV4>,
    interface: Ipv4Addr,
    last_sender: Option<SocketAddrV4>,
    muted: bool,
}

impl<S: DatagramSocket> DatagramTransport<S> {
    pub fn new(socket: S, multicast: Option<SocketAddrV4>, muted: bool) -> Self {
        Self {
            socket,
            read: DatagramBuffer::new(),
            write: DatagramBuffer::new(),
            peer: None,
            multicast,
            interface: Ipv4Addr::UNSPECIFIED,
            last_sender: None,
            muted,
        }
    }

    /// Local address multicast datagrams leave from
    pub fn set_interface(&mut self, ip: Ipv4Addr) {
        self.interface = ip;
    }

    /// Bind the local port
    pub fn open(&mut self, local_port: u16) -> Result<(), TransportError> {
        self.socket
            .bind(local_port)
            .map_err(|e| TransportError::Bind(e.kind()))?;
        diag!(self.muted, "transport bound to port {}", local_port);
        Ok(())
    }

    /// Make `peer` the active endpoint, returning the one it replaces
    pub fn bind_peer(&mut self, peer: PeerEndpoint) -> Option<PeerEndpoint> {
        info!(
            "peer {} set to {}:{}",
            peer.label(),
            peer.addr(),
            peer.port()
        );
        self.peer.replace(peer)
    }

    pub fn peer(&self) -> Option<&PeerEndpoint> {
        self.peer.as_ref()
    }

    pub fn multicast_group(&self) -> Option<SocketAddrV4> {
        self.multicast
    }

    /// Sender of the last datagram accepted by [`poll`](Self::poll)
    pub fn last_sender(&self) -> Option<SocketAddrV4> {
        self.last_sender
    }

    /// Payload of the last datagram accepted by [`poll`](Self::poll)
    pub fn read_payload(&self) -> &[u8] {
        self.read.as_bytes()
    }

    /// Current write buffer contents, zero padded
    pub fn write_buffer(&self) -> &[u8; BUFFER_LEN] {
        self.write.raw()
    }

    fn stage(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD {
            warn!(
                "payload too long ({} > {} bytes), dropped",
                payload.len(),
                MAX_PAYLOAD
            );
            return Err(TransportError::TooLarge { len: payload.len() });
        }
        self.write.fill(payload);
        Ok(())
    }

    /// Send `payload` to `dest`
    ///
    /// The write buffer is zero padded past the payload, but only the
    /// payload bytes go on the wire. Payloads longer than [`MAX_PAYLOAD`]
    /// are refused and leave the write buffer as it was.
    pub fn send_to(&mut self, dest: SocketAddrV4, payload: &[u8]) -> Result<usize, TransportError> {
        self.stage(payload)?;
        let sent = self
            .socket
            .send_to(self.write.as_bytes(), dest)
            .map_err(|e| TransportError::SendFailed(e.kind()))?;
        diag!(
            self.muted,
            "sent {} bytes to {}",
            sent,
            endpoint_text(dest)
        );
        Ok(sent)
    }

    /// Send `payload` to the active peer
    pub fn send(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let dest = self
            .peer
            .as_ref()
            .map(PeerEndpoint::socket_addr)
            .ok_or(TransportError::NoPeer)?;
        self.send_to(dest, payload)
    }

    /// Send `payload` back to the sender of the last received datagram
    pub fn reply_to_last_sender(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let dest = self.last_sender.ok_or(TransportError::NoSender)?;
        self.send_to(dest, payload)
    }

    /// Send `payload` to the multicast group
    ///
    /// Does nothing and reports 0 bytes when no group is configured.
    pub fn broadcast_multicast(&mut self, payload: &[u8]) -> Result<usize, TransportError> {
        let Some(group) = self.multicast else {
            diag!(self.muted, "no multicast group, broadcast skipped");
            return Ok(0);
        };
        self.stage(payload)?;
        let sent = self
            .socket
            .send_multicast(self.write.as_bytes(), group, self.interface)
            .map_err(|e| TransportError::SendFailed(e.kind()))?;
        diag!(
            self.muted,
            "multicast {} bytes to {}",
            sent,
            endpoint_text(group)
        );
        Ok(sent)
    }

    /// Build a status message and multicast it
    pub fn broadcast_status(
        &mut self,
        dev_id: &str,
        status: &str,
        msg: Option<&str>,
    ) -> Result<usize, TransportError> {
        let encoded = StatusMessage::new(dev_id, status, msg).encode()?;
        self.broadcast_multicast(encoded.as_bytes())
    }

    /// Take one pending datagram off the socket, if any
    pub fn poll(&mut self) -> Inbound {
        let mut scratch = [0u8; BUFFER_LEN];
        let meta = match self.socket.recv_from(&mut scratch) {
            Ok(Some(meta)) => meta,
            Ok(None) => return Inbound::Empty,
            Err(e) => {
                warn!("receive failed: {:?}", e.kind());
                return Inbound::Empty;
            }
        };

        if meta.wire_len > MAX_PAYLOAD {
            warn!(
                "datagram too long ({} > {} bytes), discarded",
                meta.wire_len,
                MAX_PAYLOAD
            );
            return Inbound::Oversized(meta.wire_len);
        }

        self.read.fill(&scratch[..meta.wire_len]);
        self.last_sender = Some(meta.from);
        diag!(
            self.muted,
            "received {} bytes from {}",
            meta.wire_len,
            endpoint_text(meta.from)
        );
        Inbound::Datagram(meta.wire_len)
    }

    /// Forget the buffered datagram
    pub fn clear_read(&mut self) {
        self.read.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_node_hal::mock::MockSocket;

    fn group() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 1), 54321)
    }

    fn peer() -> PeerEndpoint {
        PeerEndpoint::parse("udp1", "192.168.1.10", 48431).unwrap()
    }

    fn transport() -> (DatagramTransport<MockSocket>, MockSocket) {
        let socket = MockSocket::new();
        let mut transport = DatagramTransport::new(socket.clone(), Some(group()), false);
        transport.set_interface(Ipv4Addr::new(192, 168, 1, 42));
        (transport, socket)
    }

    #[test]
    fn test_send_to_pads_write_buffer() {
        let (mut transport, socket) = transport();
        let sent = transport.send_to(peer().socket_addr(), b"hello").unwrap();
        assert_eq!(sent, 5);

        let wire = socket.sent();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].bytes, b"hello");
        assert_eq!(wire[0].dest, peer().socket_addr());

        let buffer = transport.write_buffer();
        assert_eq!(&buffer[..5], b"hello");
        assert!(buffer[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shorter_payload_clears_previous_contents() {
        let (mut transport, _socket) = transport();
        transport.send_to(peer().socket_addr(), &[b'x'; 40]).unwrap();
        transport.send_to(peer().socket_addr(), b"ab").unwrap();
        let buffer = transport.write_buffer();
        assert_eq!(&buffer[..2], b"ab");
        assert!(buffer[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_payload_at_limit_is_sent() {
        let (mut transport, socket) = transport();
        let payload = [b'a'; MAX_PAYLOAD];
        assert_eq!(transport.send(&payload), Err(TransportError::NoPeer));
        transport.bind_peer(peer());
        assert_eq!(transport.send(&payload), Ok(MAX_PAYLOAD));
        assert_eq!(socket.sent()[0].bytes.len(), MAX_PAYLOAD);
        assert_eq!(transport.write_buffer()[MAX_PAYLOAD], 0);
    }

    #[test]
    fn test_oversized_send_leaves_buffer_untouched() {
        let (mut transport, socket) = transport();
        transport.send_to(peer().socket_addr(), b"previous").unwrap();
        let before = *transport.write_buffer();

        let err = transport
            .send_to(peer().socket_addr(), &[b'z'; MAX_PAYLOAD + 1])
            .unwrap_err();
        assert_eq!(err, TransportError::TooLarge { len: MAX_PAYLOAD + 1 });
        assert_eq!(*transport.write_buffer(), before);
        assert_eq!(socket.sent().len(), 1);

        let err = transport.broadcast_multicast(&[b'z'; 100]).unwrap_err();
        assert_eq!(err, TransportError::TooLarge { len: 100 });
        assert_eq!(*transport.write_buffer(), before);
    }

    #[test]
    fn test_send_failure_is_reported() {
        let (mut transport, socket) = transport();
        socket.set_fail_sends(true);
        assert_eq!(
            transport.send_to(peer().socket_addr(), b"x"),
            Err(TransportError::SendFailed(embedded_io::ErrorKind::BrokenPipe))
        );
    }

    #[test]
    fn test_multicast_uses_group_and_interface() {
        let (mut transport, socket) = transport();
        transport.broadcast_multicast(b"status").unwrap();
        let wire = socket.sent();
        assert!(wire[0].multicast);
        assert_eq!(wire[0].dest, group());
        assert_eq!(wire[0].interface, Some(Ipv4Addr::new(192, 168, 1, 42)));
    }

    #[test]
    fn test_multicast_without_group_is_noop() {
        let socket = MockSocket::new();
        let mut transport = DatagramTransport::new(socket.clone(), None, true);
        assert_eq!(transport.broadcast_multicast(b"status"), Ok(0));
        assert_eq!(
            transport.broadcast_status("dev", "APP_READY", None),
            Ok(0)
        );
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_broadcast_status_encodes_message() {
        let (mut transport, socket) = transport();
        transport
            .broadcast_status("ESP_0A1B2C", "SENSOR_FAULT", Some("NaN 1"))
            .unwrap();
        assert_eq!(
            socket.sent()[0].text(),
            r#"{"dev_id":"ESP_0A1B2C","status":"SENSOR_FAULT","msg":"NaN 1"}"#
        );
    }

    #[test]
    fn test_broadcast_status_too_long_is_dropped() {
        let (mut transport, socket) = transport();
        let long_id = "d".repeat(60);
        let err = transport
            .broadcast_status(&long_id, "SENSOR_ERROR", Some("too many NaN"))
            .unwrap_err();
        assert!(matches!(err, TransportError::TooLarge { .. }));
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_poll_buffers_datagram_and_records_sender() {
        let (mut transport, socket) = transport();
        assert_eq!(transport.poll(), Inbound::Empty);
        assert_eq!(transport.poll().len(), 0);

        let from = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 6000);
        socket.push_inbound(b"ping", from);
        assert_eq!(transport.poll(), Inbound::Datagram(4));
        assert_eq!(transport.read_payload(), b"ping");
        assert_eq!(transport.last_sender(), Some(from));

        transport.reply_to_last_sender(b"pong").unwrap();
        assert_eq!(socket.sent()[0].dest, from);
    }

    #[test]
    fn test_poll_oversized_reports_wire_length() {
        let (mut transport, socket) = transport();
        let from = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 6000);
        socket.push_inbound(&[b'q'; 200], from);

        let inbound = transport.poll();
        assert_eq!(inbound, Inbound::Oversized(200));
        assert_eq!(inbound.len(), 200);
        assert!(transport.read_payload().is_empty());
        assert!(transport.last_sender().is_none());
    }

    #[test]
    fn test_reply_without_sender() {
        let (mut transport, _socket) = transport();
        assert_eq!(
            transport.reply_to_last_sender(b"x"),
            Err(TransportError::NoSender)
        );
    }

    #[test]
    fn test_bind_peer_replaces_previous() {
        let (mut transport, _socket) = transport();
        assert!(transport.bind_peer(peer()).is_none());
        let udpx = PeerEndpoint::new("udpx", Ipv4Addr::new(10, 0, 0, 2), 5000).unwrap();
        let previous = transport.bind_peer(udpx).unwrap();
        assert_eq!(previous.label(), "udp1");
        let active = transport.peer().unwrap();
        assert_eq!(active.label(), "udpx");
        assert_eq!(active.addr(), "10.0.0.2");
    }

    #[test]
    fn test_open_binds_socket() {
        let (mut transport, socket) = transport();
        transport.open(48432).unwrap();
        assert_eq!(socket.bound_ports(), [48432]);

        socket.set_fail_bind(true);
        assert_eq!(
            transport.open(1),
            Err(TransportError::Bind(embedded_io::ErrorKind::AddrInUse))
        );
    }

    #[test]
    fn test_peer_endpoint_parse() {
        assert_eq!(
            PeerEndpoint::parse("udp1", "300.1.1.1", 1),
            Err(ConfigError::InvalidAddress)
        );
        let config = PeerConfig::new("udp2", "172.16.0.4", 9000).unwrap();
        let peer = PeerEndpoint::from_config(&config).unwrap();
        assert_eq!(
            peer.socket_addr(),
            SocketAddrV4::new(Ipv4Addr::new(172, 16, 0, 4), 9000)
        );
    }
}
