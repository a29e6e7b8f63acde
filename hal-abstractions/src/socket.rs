//! Connectionless datagram socket

use core::net::{Ipv4Addr, SocketAddrV4};

/// Metadata for a datagram taken off the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvMeta {
    /// Length of the datagram as it arrived on the wire
    ///
    /// May exceed the buffer handed to [`DatagramSocket::recv_from`]; in that
    /// case only the leading `buf.len()` bytes were copied and the remainder
    /// was discarded.
    pub wire_len: usize,
    /// Sender address
    pub from: SocketAddrV4,
}

impl RecvMeta {
    /// Whether the datagram was larger than the receive buffer
    pub fn truncated(&self, buf_len: usize) -> bool {
        self.wire_len > buf_len
    }
}

/// UDP socket abstraction
///
/// Mirrors the small subset of a UDP stack the node needs: one bound local
/// port, unicast send, multicast send and a non-blocking receive.
pub trait DatagramSocket {
    /// Driver error type
    type Error: embedded_io::Error;

    /// Bind (or re-bind) the local port
    fn bind(&mut self, port: u16) -> Result<(), Self::Error>;

    /// Send `payload` to `dest`, returning the number of bytes written
    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<usize, Self::Error>;

    /// Send `payload` to a multicast group out of `interface`
    fn send_multicast(
        &mut self,
        payload: &[u8],
        group: SocketAddrV4,
        interface: Ipv4Addr,
    ) -> Result<usize, Self::Error>;

    /// Take the next pending datagram, if any, without blocking
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<Option<RecvMeta>, Self::Error>;
}
