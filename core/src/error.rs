//! Error types for the connectivity and reporting engine

use embedded_io::ErrorKind;
use heapless::{String, Vec};

use crate::config::{MAX_ACCESS_POINTS, SSID_MAX};

/// Joining the wireless network failed
///
/// Terminal for forward progress: nothing downstream can run without a
/// connection and the engine never retries a join on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JoinError {
    /// Every configured access point was tried and none accepted us
    Exhausted {
        /// Identifiers tried, each once, in preference order
        attempted: Vec<String<SSID_MAX>, MAX_ACCESS_POINTS>,
        /// Total connection attempts made across all access points
        attempts: u32,
    },
}

impl core::fmt::Display for JoinError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exhausted {
                attempted,
                attempts,
            } => {
                write!(f, "join failed after {} attempts on [", attempts)?;
                for (i, ssid) in attempted.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(ssid)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl core::error::Error for JoinError {}

/// Datagram transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Payload longer than the maximum datagram payload; nothing was sent
    TooLarge { len: usize },
    /// No active peer endpoint to send to
    NoPeer,
    /// Nothing has been received yet, so there is no sender to reply to
    NoSender,
    /// The socket refused the local port
    Bind(ErrorKind),
    /// The socket failed to transmit
    SendFailed(ErrorKind),
    /// A message could not be serialized
    Encode,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TooLarge { len } => write!(f, "payload too long ({} bytes)", len),
            Self::NoPeer => write!(f, "no peer endpoint bound"),
            Self::NoSender => write!(f, "no datagram received to reply to"),
            Self::Bind(kind) => write!(f, "bind failed: {:?}", kind),
            Self::SendFailed(kind) => write!(f, "send failed: {:?}", kind),
            Self::Encode => write!(f, "message encoding failed"),
        }
    }
}

impl core::error::Error for TransportError {}

impl embedded_io::Error for TransportError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::TooLarge { .. } | Self::Encode => ErrorKind::InvalidInput,
            Self::NoPeer | Self::NoSender => ErrorKind::NotConnected,
            Self::Bind(kind) | Self::SendFailed(kind) => *kind,
        }
    }
}

/// Peer discovery errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryError {
    /// Could not bind the reply port
    Transport(TransportError),
    /// The radio lost its link while waiting for a reply
    LinkLost,
    /// The configured number of query rounds went unanswered
    Exhausted { rounds: u32 },
}

impl core::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "discovery transport error: {}", e),
            Self::LinkLost => write!(f, "link lost during discovery"),
            Self::Exhausted { rounds } => write!(f, "no discovery reply after {} rounds", rounds),
        }
    }
}

impl core::error::Error for DiscoveryError {}

impl From<TransportError> for DiscoveryError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Configuration rejected at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Not valid JSON for the configuration schema
    Malformed,
    /// A sampling or polling interval is zero
    InvalidInterval(&'static str),
    /// A change threshold is zero
    InvalidThreshold(&'static str),
    /// The update window duration is zero
    InvalidWindow,
    /// No access points configured
    NoAccessPoints,
    /// An address is not a dotted-quad IPv4 address
    InvalidAddress,
    /// The default peer label names no configured endpoint
    UnknownPeer,
    /// A value does not fit its fixed-capacity field
    TooLong,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed configuration"),
            Self::InvalidInterval(name) => write!(f, "interval `{}` must be positive", name),
            Self::InvalidThreshold(name) => write!(f, "threshold `{}` must be positive", name),
            Self::InvalidWindow => write!(f, "update window duration must be positive"),
            Self::NoAccessPoints => write!(f, "no access points configured"),
            Self::InvalidAddress => write!(f, "invalid IPv4 address"),
            Self::UnknownPeer => write!(f, "default peer is not configured"),
            Self::TooLong => write!(f, "value too long"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Startup and scheduling failures of the node as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeError {
    Config(ConfigError),
    Join(JoinError),
    Transport(TransportError),
    Discovery(DiscoveryError),
    /// `poll_once` called before a successful `start`
    NotStarted,
}

impl core::fmt::Display for NodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{}", e),
            Self::Join(e) => write!(f, "{}", e),
            Self::Transport(e) => write!(f, "{}", e),
            Self::Discovery(e) => write!(f, "{}", e),
            Self::NotStarted => write!(f, "node not started"),
        }
    }
}

impl core::error::Error for NodeError {}

impl From<ConfigError> for NodeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<JoinError> for NodeError {
    fn from(e: JoinError) -> Self {
        Self::Join(e)
    }
}

impl From<TransportError> for NodeError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<DiscoveryError> for NodeError {
    fn from(e: DiscoveryError) -> Self {
        Self::Discovery(e)
    }
}
