//! Host-side test doubles
//!
//! Every mock is a cheap handle over shared state: clone it, hand one copy
//! to the code under test and keep the other to script inputs and inspect
//! what was done.

mod clock;
mod radio;
mod sensor;
mod socket;
mod update;

pub use clock::MockClock;
pub use radio::MockRadio;
pub use sensor::MockSensor;
pub use socket::{MockSocket, SentDatagram};
pub use update::{MockUpdateSession, RecordedOptions};

use embedded_io::ErrorKind;

/// Error returned by the radio and socket doubles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub ErrorKind);

impl core::fmt::Display for MockError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "mock driver error: {:?}", self.0)
    }
}

impl core::error::Error for MockError {}

impl embedded_io::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}
