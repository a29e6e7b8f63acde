//! Status and report payloads
//!
//! Messages are compact JSON objects:
//!
//! - status: `{"dev_id":"ESP_0A1B2C","status":"SENSOR_FAULT","msg":"NaN 2"}`
//!   (`msg` omitted when empty)
//! - report: `{"dev_id":"ESP_0A1B2C","seq":7,"t":71.2,"h":40.5}`
//! - last reading: `{"dev_id":"ESP_0A1B2C","seq":7,"last":{"t":71.3,"h":40.25}}`,
//!   sent right after an on-demand report with the same `seq`
//!
//! Encoding never truncates. The transport refuses anything longer than
//! [`MAX_PAYLOAD`](crate::transport::MAX_PAYLOAD) and the caller drops it.

use core::net::{Ipv4Addr, SocketAddrV4};
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use sensor_node_hal::UpdateErrorKind;

use crate::error::TransportError;

/// Status vocabulary
pub mod status {
    pub const APP_READY: &str = "APP_READY";
    pub const SENSOR_FAULT: &str = "SENSOR_FAULT";
    pub const SENSOR_ERROR: &str = "SENSOR_ERROR";
    pub const SENSOR_RECOVER: &str = "SENSOR_RECOVER";
    pub const OTA_READY: &str = "OTA_READY";
    pub const OTA_START: &str = "OTA_START";
    pub const OTA_END: &str = "OTA_END";
    pub const OTA_STOP: &str = "OTA_STOP";
    pub const OTA_AUTH_ERROR: &str = "OTA_AUTH_ERROR";
    pub const OTA_BEGIN_ERROR: &str = "OTA_BEGIN_ERROR";
    pub const OTA_CONNECT_ERROR: &str = "OTA_CONNECT_ERROR";
    pub const OTA_RECEIVE_ERROR: &str = "OTA_RECEIVE_ERROR";
    pub const OTA_END_ERROR: &str = "OTA_END_ERROR";
    pub const I_DUNNO: &str = "I_DUNNO";
}

/// Status label for a failed update session
pub fn update_error_status(kind: UpdateErrorKind) -> &'static str {
    match kind {
        UpdateErrorKind::Auth => status::OTA_AUTH_ERROR,
        UpdateErrorKind::Begin => status::OTA_BEGIN_ERROR,
        UpdateErrorKind::Connect => status::OTA_CONNECT_ERROR,
        UpdateErrorKind::Receive => status::OTA_RECEIVE_ERROR,
        UpdateErrorKind::End => status::OTA_END_ERROR,
        UpdateErrorKind::Unknown => status::I_DUNNO,
    }
}

/// Scratch space for one encoded message
///
/// Larger than the datagram limit so an oversized message can be measured
/// and refused instead of silently cut short.
pub const ENCODE_LEN: usize = 128;

/// A serialized message ready for the transport
#[derive(Clone)]
pub struct Encoded {
    buf: [u8; ENCODE_LEN],
    len: usize,
}

impl Encoded {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for Encoded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(text) => write!(f, "Encoded({})", text),
            Err(_) => write!(f, "Encoded({:?})", self.as_bytes()),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Encoded, TransportError> {
    let mut buf = [0u8; ENCODE_LEN];
    let len = serde_json_core::to_slice(value, &mut buf).map_err(|e| {
        // did not even fit the scratch buffer; the true length is unknown
        if matches!(e, serde_json_core::ser::Error::BufferFull) {
            TransportError::TooLarge { len: ENCODE_LEN }
        } else {
            TransportError::Encode
        }
    })?;
    Ok(Encoded { buf, len })
}

/// Device status announcement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusMessage<'a> {
    pub dev_id: &'a str,
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<&'a str>,
}

impl<'a> StatusMessage<'a> {
    /// An empty `msg` is omitted from the payload
    pub fn new(dev_id: &'a str, status: &'a str, msg: Option<&'a str>) -> Self {
        Self {
            dev_id,
            status,
            msg: msg.filter(|m| !m.is_empty()),
        }
    }

    pub fn encode(&self) -> Result<Encoded, TransportError> {
        encode(self)
    }
}

/// Last reported values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastReading {
    pub t: f32,
    pub h: f32,
}

/// Sensor reading report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportMessage<'a> {
    pub dev_id: &'a str,
    pub seq: u32,
    pub t: f32,
    pub h: f32,
}

impl ReportMessage<'_> {
    pub fn encode(&self) -> Result<Encoded, TransportError> {
        encode(self)
    }
}

/// Companion of an on-demand report carrying the values last reported
///
/// Kept out of [`ReportMessage`] so that neither datagram outgrows the
/// payload limit; the shared `seq` pairs them up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LastReadingMessage<'a> {
    pub dev_id: &'a str,
    pub seq: u32,
    pub last: LastReading,
}

impl LastReadingMessage<'_> {
    pub fn encode(&self) -> Result<Encoded, TransportError> {
        encode(self)
    }
}

/// Turns a discovery reply payload into the peer address it names
pub trait ReplyDecoder {
    fn decode(&self, payload: &[u8]) -> Option<SocketAddrV4>;
}

#[derive(Deserialize)]
struct AddressReply<'a> {
    reply: &'a str,
    ip: &'a str,
    port: u16,
}

/// Decodes `{"reply":"IP_ADDR","ip":"a.b.c.d","port":n}`
#[derive(Debug, Clone, Copy)]
pub struct JsonReplyDecoder {
    tag: &'static str,
}

impl JsonReplyDecoder {
    pub const DEFAULT_TAG: &'static str = "IP_ADDR";

    pub fn with_tag(tag: &'static str) -> Self {
        Self { tag }
    }
}

impl Default for JsonReplyDecoder {
    fn default() -> Self {
        Self::with_tag(Self::DEFAULT_TAG)
    }
}

impl ReplyDecoder for JsonReplyDecoder {
    fn decode(&self, payload: &[u8]) -> Option<SocketAddrV4> {
        // senders may pad the datagram with NULs
        let end = payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(payload.len());
        let (reply, _) = serde_json_core::from_slice::<AddressReply<'_>>(&payload[..end]).ok()?;
        if reply.reply != self.tag || reply.port == 0 {
            return None;
        }
        let ip = Ipv4Addr::from_str(reply.ip).ok()?;
        Some(SocketAddrV4::new(ip, reply.port))
    }
}
