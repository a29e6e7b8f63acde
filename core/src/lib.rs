//! Connectivity and reporting engine for the environmental sensor node
//!
//! Joins a wireless network, finds the collection point, samples a
//! temperature/humidity sensor and reports readings and device status over
//! small JSON datagrams, with a time-boxed window for remote updates.
//!
//! The crate has NO hardware dependencies. Boards implement the traits in
//! `sensor-node-hal` and hand them to [`Node`], which runs everything on a
//! single cooperative loop.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

#[macro_use]
mod fmt;

pub mod config;
pub mod device_id;
pub mod discovery;
pub mod error;
pub mod join;
pub mod message;
pub mod node;
pub mod sensor;
pub mod transport;
pub mod update;

// Re-export commonly used types
pub use config::NodeConfig;
pub use device_id::DeviceId;
pub use discovery::{Discovery, DiscoveryPolicy};
pub use error::{ConfigError, DiscoveryError, JoinError, NodeError, TransportError};
pub use join::{ConnectionInfo, JoinController};
pub use message::{JsonReplyDecoder, ReplyDecoder};
pub use node::{Node, NodeParts, PassSummary};
pub use sensor::{SampleOutcome, SensorReporter, SensorSample};
pub use transport::{DatagramTransport, Inbound, PeerEndpoint, MAX_PAYLOAD};
pub use update::{UpdateWindow, WindowState};
