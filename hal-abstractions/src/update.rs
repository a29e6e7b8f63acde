//! Remote firmware update session
//!
//! The transport and flashing logic of an update belong to the platform.
//! The engine only decides *when* a session may run and reports what it
//! observes, so the session is driven by polling: each scheduling pass calls
//! [`UpdateSession::poll`] once and gets back a tagged event.

/// Why an update session failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UpdateErrorKind {
    /// Password rejected
    Auth,
    /// Not enough space or bad image header
    Begin,
    /// Could not reach the uploading host
    Connect,
    /// Transfer broke off
    Receive,
    /// Image failed verification when finalising
    End,
    /// Anything the platform could not classify
    Unknown,
}

/// Result of one poll of the update session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEvent {
    /// Nothing happened since the last poll
    Idle,
    /// An upload began
    Started,
    /// Bytes written so far out of `total`
    Progress { done: u32, total: u32 },
    /// Upload completed and the image was accepted
    Ended,
    /// Upload aborted
    Failed(UpdateErrorKind),
}

/// Options applied when the session starts listening
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions<'a> {
    /// Listening port, platform default when `None`
    pub port: Option<u16>,
    /// Advertised hostname, platform default when `None`
    pub hostname: Option<&'a str>,
    /// Upload password, open when `None`
    pub password: Option<&'a str>,
}

/// Platform update service (ArduinoOTA, esp-ota, ...)
pub trait UpdateSession {
    /// Start listening for an upload
    fn begin(&mut self, options: &SessionOptions<'_>);

    /// Service the session once
    fn poll(&mut self) -> SessionEvent;
}
