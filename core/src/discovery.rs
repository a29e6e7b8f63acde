//! Reporting peer discovery
//!
//! Multicasts a query status carrying the local reply port, then polls for
//! an answer one tick at a time, yielding to the clock between polls. After
//! `max_wait` idle ticks the query goes out again. The first datagram that
//! decodes as an address reply becomes the active peer (labelled `udpx`)
//! and an `APP_READY` status is broadcast.
//!
//! The wait is bounded only by the policy: with `max_rounds` unset it keeps
//! asking for as long as the link holds.

use core::fmt::Write as _;

use heapless::String;

use sensor_node_hal::{Clock, DatagramSocket, WifiRadio};

use crate::config::{DiscoveryConfig, QUERY_MAX};
use crate::error::DiscoveryError;
use crate::message::{status, JsonReplyDecoder, ReplyDecoder};
use crate::transport::{endpoint_text, DatagramTransport, Inbound, PeerEndpoint};

/// Label given to a discovered peer
pub const DISCOVERED_LABEL: &str = "udpx";

/// Retry and yield policy of the discovery wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiscoveryPolicy {
    pub reply_port: u16,
    /// Idle ticks before the query is repeated
    pub max_wait: u32,
    pub tick_ms: u32,
    /// Query broadcasts before giving up, `None` for no limit
    pub max_rounds: Option<u32>,
    pub abort_on_link_loss: bool,
}

impl DiscoveryPolicy {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            reply_port: config.reply_port,
            max_wait: config.max_wait,
            tick_ms: config.tick_ms,
            max_rounds: config.max_rounds,
            abort_on_link_loss: config.abort_on_link_loss,
        }
    }
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

/// Query/reply peer discovery
pub struct Discovery<D = JsonReplyDecoder> {
    policy: DiscoveryPolicy,
    query: String<QUERY_MAX>,
    decoder: D,
    muted: bool,
}

impl Discovery<JsonReplyDecoder> {
    pub fn new(config: &DiscoveryConfig, muted: bool) -> Self {
        Self::with_decoder(config, JsonReplyDecoder::default(), muted)
    }
}

impl<D: ReplyDecoder> Discovery<D> {
    pub fn with_decoder(config: &DiscoveryConfig, decoder: D, muted: bool) -> Self {
        Self {
            policy: DiscoveryPolicy::from_config(config),
            query: config.query.clone(),
            decoder,
            muted,
        }
    }

    pub fn policy(&self) -> &DiscoveryPolicy {
        &self.policy
    }

    /// Find the reporting peer and make it the transport's active endpoint
    pub fn discover_peer<S, R, C>(
        &self,
        transport: &mut DatagramTransport<S>,
        radio: &mut R,
        clock: &mut C,
        dev_id: &str,
    ) -> Result<PeerEndpoint, DiscoveryError>
    where
        S: DatagramSocket,
        R: WifiRadio,
        C: Clock,
    {
        transport.open(self.policy.reply_port)?;
        if transport.multicast_group().is_none() {
            warn!("no multicast group configured, discovery queries go nowhere");
        }

        let mut reply_port: String<5> = String::new();
        // a u16 always fits
        let _ = write!(reply_port, "{}", self.policy.reply_port);

        let mut rounds = 0u32;
        loop {
            if let Some(max) = self.policy.max_rounds {
                if rounds >= max {
                    error!("discovery gave up after {} rounds", rounds);
                    return Err(DiscoveryError::Exhausted { rounds });
                }
            }
            rounds += 1;

            info!("discovery query {} (round {})", self.query, rounds);
            let query = transport.broadcast_status(dev_id, &self.query, Some(reply_port.as_str()));
            if let Err(e) = query {
                warn!("discovery query not sent: {}", e);
            }

            for _ in 0..self.policy.max_wait {
                if let Some(peer) = self.take_reply(transport) {
                    transport.bind_peer(peer.clone());
                    if let Err(e) = transport.broadcast_status(dev_id, status::APP_READY, None) {
                        warn!("ready status not sent: {}", e);
                    }
                    return Ok(peer);
                }

                if self.policy.abort_on_link_loss && !radio.is_connected() {
                    error!("link lost while waiting for a discovery reply");
                    return Err(DiscoveryError::LinkLost);
                }
                clock.delay_ms(self.policy.tick_ms);
            }
            diag!(self.muted, "no discovery reply, asking again");
        }
    }

    /// Decode a pending datagram as a reply; anything else is skipped
    fn take_reply<S: DatagramSocket>(
        &self,
        transport: &mut DatagramTransport<S>,
    ) -> Option<PeerEndpoint> {
        match transport.poll() {
            Inbound::Datagram(_) => {}
            Inbound::Empty | Inbound::Oversized(_) => return None,
        }

        let decoded = self.decoder.decode(transport.read_payload());
        // the datagram belongs to discovery either way
        transport.clear_read();
        let Some(addr) = decoded else {
            diag!(self.muted, "ignoring datagram that is not a discovery reply");
            return None;
        };
        match PeerEndpoint::new(DISCOVERED_LABEL, *addr.ip(), addr.port()) {
            Ok(peer) => {
                info!("discovered peer at {}", endpoint_text(addr));
                Some(peer)
            }
            Err(e) => {
                warn!("discovered peer rejected: {}", e);
                None
            }
        }
    }
}
