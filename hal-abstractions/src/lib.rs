//! Hardware abstraction traits for the sensor node firmware
//!
//! This crate defines the traits that sit between the connectivity and
//! reporting engine (`sensor-node-core`) and the hardware. BSPs implement
//! these traits; the engine never touches a radio, socket or sensor bus
//! directly.
//!
//! All operations are non-blocking except [`Clock::delay_ms`], which is the
//! single cooperative yield point of the firmware.
//!
//! With the `mock` feature enabled the [`mock`] module provides host-side
//! doubles for every trait so the engine can be exercised under `cargo test`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

#[cfg(all(feature = "mock", not(test)))]
extern crate std;

pub mod clock;
pub mod radio;
pub mod sensor;
pub mod socket;
pub mod update;

#[cfg(feature = "mock")]
pub mod mock;

// Re-export commonly used types
pub use clock::Clock;
pub use radio::{LinkInfo, LinkStatus, WifiRadio, HOSTNAME_MAX};
pub use sensor::{TempHumiditySensor, TemperatureScale};
pub use socket::{DatagramSocket, RecvMeta};
pub use update::{SessionEvent, SessionOptions, UpdateErrorKind, UpdateSession};
