//! Mock UDP socket with an injectable inbound queue

use core::net::{Ipv4Addr, SocketAddrV4};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_io::ErrorKind;

use super::MockError;
use crate::socket::{DatagramSocket, RecvMeta};

/// One datagram handed to the socket for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentDatagram {
    pub dest: SocketAddrV4,
    pub multicast: bool,
    pub interface: Option<Ipv4Addr>,
    pub bytes: Vec<u8>,
}

impl SentDatagram {
    /// Payload as text, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
struct Pending {
    /// Receive calls that must pass before this datagram shows up
    hold: u32,
    bytes: Vec<u8>,
    from: SocketAddrV4,
}

#[derive(Debug, Default)]
struct SocketState {
    inbound: VecDeque<Pending>,
    sent: Vec<SentDatagram>,
    bound: Vec<u16>,
    fail_sends: bool,
    fail_bind: bool,
}

/// Loopback-free UDP socket double
#[derive(Debug, Clone, Default)]
pub struct MockSocket {
    state: Rc<RefCell<SocketState>>,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a datagram to be returned by the next receive
    pub fn push_inbound(&self, bytes: &[u8], from: SocketAddrV4) {
        self.push_inbound_after(0, bytes, from);
    }

    /// Queue a datagram that only arrives after `polls` empty receives
    pub fn push_inbound_after(&self, polls: u32, bytes: &[u8], from: SocketAddrV4) {
        self.state.borrow_mut().inbound.push_back(Pending {
            hold: polls,
            bytes: bytes.to_vec(),
            from,
        });
    }

    pub fn pending_inbound(&self) -> usize {
        self.state.borrow().inbound.len()
    }

    /// Everything sent so far, oldest first
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.state.borrow().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// Ports passed to `bind`, in call order
    pub fn bound_ports(&self) -> Vec<u16> {
        self.state.borrow().bound.clone()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.state.borrow_mut().fail_sends = fail;
    }

    pub fn set_fail_bind(&self, fail: bool) {
        self.state.borrow_mut().fail_bind = fail;
    }

    fn record(
        &self,
        payload: &[u8],
        dest: SocketAddrV4,
        interface: Option<Ipv4Addr>,
    ) -> Result<usize, MockError> {
        let mut state = self.state.borrow_mut();
        if state.fail_sends {
            return Err(MockError(ErrorKind::BrokenPipe));
        }
        state.sent.push(SentDatagram {
            dest,
            multicast: interface.is_some(),
            interface,
            bytes: payload.to_vec(),
        });
        Ok(payload.len())
    }
}

impl DatagramSocket for MockSocket {
    type Error = MockError;

    fn bind(&mut self, port: u16) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if state.fail_bind {
            return Err(MockError(ErrorKind::AddrInUse));
        }
        state.bound.push(port);
        Ok(())
    }

    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<usize, Self::Error> {
        self.record(payload, dest, None)
    }

    fn send_multicast(
        &mut self,
        payload: &[u8],
        group: SocketAddrV4,
        interface: Ipv4Addr,
    ) -> Result<usize, Self::Error> {
        self.record(payload, group, Some(interface))
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<RecvMeta>, Self::Error> {
        let mut state = self.state.borrow_mut();
        let Some(front) = state.inbound.front_mut() else {
            return Ok(None);
        };
        if front.hold > 0 {
            front.hold -= 1;
            return Ok(None);
        }
        let Some(datagram) = state.inbound.pop_front() else {
            return Ok(None);
        };
        let copied = datagram.bytes.len().min(buf.len());
        buf[..copied].copy_from_slice(&datagram.bytes[..copied]);
        Ok(Some(RecvMeta {
            wire_len: datagram.bytes.len(),
            from: datagram.from,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 5000)
    }

    #[test]
    fn test_mock_socket_records_sends() {
        let mut socket = MockSocket::new();
        let handle = socket.clone();
        socket.bind(43210).unwrap();
        socket.send_to(b"hello", peer()).unwrap();
        socket
            .send_multicast(
                b"group",
                SocketAddrV4::new(Ipv4Addr::new(239, 0, 0, 57), 12345),
                Ipv4Addr::new(10, 0, 0, 2),
            )
            .unwrap();

        let sent = handle.sent();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].multicast);
        assert_eq!(sent[0].text(), "hello");
        assert!(sent[1].multicast);
        assert_eq!(handle.bound_ports(), [43210]);
    }

    #[test]
    fn test_mock_socket_truncates_to_buffer() {
        let mut socket = MockSocket::new();
        socket.push_inbound(&[7u8; 100], peer());

        let mut buf = [0u8; 10];
        let meta = socket.recv_from(&mut buf).unwrap().unwrap();
        assert_eq!(meta.wire_len, 100);
        assert!(meta.truncated(buf.len()));
        assert_eq!(buf, [7u8; 10]);
        assert!(socket.recv_from(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_mock_socket_delayed_arrival() {
        let mut socket = MockSocket::new();
        socket.push_inbound_after(2, b"late", peer());

        let mut buf = [0u8; 8];
        assert!(socket.recv_from(&mut buf).unwrap().is_none());
        assert!(socket.recv_from(&mut buf).unwrap().is_none());
        assert_eq!(socket.recv_from(&mut buf).unwrap().unwrap().wire_len, 4);
    }

    #[test]
    fn test_mock_socket_failing_sends() {
        let mut socket = MockSocket::new();
        socket.set_fail_sends(true);
        let err = socket.send_to(b"x", peer()).unwrap_err();
        assert_eq!(embedded_io::Error::kind(&err), ErrorKind::BrokenPipe);
        assert!(socket.sent().is_empty());
    }
}
