//! Remote update admission window
//!
//! Once connectivity is up the window opens for a fixed duration and the
//! update session is serviced on every scheduling pass. The deadline is
//! measured on the clock alone, so a dropped link does not extend it. When
//! it passes the window closes for good: `OTA_STOP` goes out once and later
//! ticks do nothing.

use core::fmt::Write as _;

use heapless::String;

use sensor_node_hal::{DatagramSocket, SessionEvent, SessionOptions, UpdateSession};

use crate::message::{status, update_error_status};
use crate::transport::DatagramTransport;

/// Lifecycle of the admission window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WindowState {
    #[default]
    Unopened,
    Open {
        /// Clock milliseconds at which the window closes
        deadline: u64,
    },
    Closed,
}

/// Time-boxed admission of a remote update session
#[derive(Debug, Default)]
pub struct UpdateWindow {
    state: WindowState,
    muted: bool,
}

impl UpdateWindow {
    pub fn new(muted: bool) -> Self {
        Self {
            state: WindowState::Unopened,
            muted,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, WindowState::Open { .. })
    }

    pub fn deadline(&self) -> Option<u64> {
        match self.state {
            WindowState::Open { deadline } => Some(deadline),
            WindowState::Unopened | WindowState::Closed => None,
        }
    }

    /// Start the session and announce the window
    ///
    /// Returns `false` without touching the session if the window was
    /// already opened once.
    pub fn open<U, S>(
        &mut self,
        now: u64,
        duration_ms: u32,
        session: &mut U,
        options: &SessionOptions<'_>,
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
    ) -> bool
    where
        U: UpdateSession,
        S: DatagramSocket,
    {
        if self.state != WindowState::Unopened {
            warn!("update window already used, not reopening");
            return false;
        }

        session.begin(options);
        let deadline = now.saturating_add(u64::from(duration_ms));
        self.state = WindowState::Open { deadline };

        let mut secs: String<10> = String::new();
        let _ = write!(secs, "{}", duration_ms / 1000);
        info!("update window open for {} s", duration_ms / 1000);
        Self::announce(transport, dev_id, status::OTA_READY, Some(secs.as_str()));
        true
    }

    /// Service the session once; `false` once the window is no longer open
    pub fn tick<U, S>(
        &mut self,
        now: u64,
        session: &mut U,
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
    ) -> bool
    where
        U: UpdateSession,
        S: DatagramSocket,
    {
        let WindowState::Open { deadline } = self.state else {
            return false;
        };

        if now >= deadline {
            info!("update window closed");
            self.close(transport, dev_id);
            return false;
        }

        match session.poll() {
            SessionEvent::Idle => {}
            SessionEvent::Started => {
                info!("update started");
                Self::announce(transport, dev_id, status::OTA_START, None);
            }
            SessionEvent::Progress { done, total } => {
                diag!(self.muted, "update progress {}/{}", done, total);
            }
            SessionEvent::Ended => {
                info!("update finished");
                Self::announce(transport, dev_id, status::OTA_END, None);
            }
            SessionEvent::Failed(kind) => {
                error!("update failed: {:?}", kind);
                Self::announce(transport, dev_id, update_error_status(kind), None);
            }
        }
        true
    }

    /// Close the window early; it cannot be opened again
    pub fn stop<S: DatagramSocket>(&mut self, transport: &mut DatagramTransport<S>, dev_id: &str) {
        if self.is_open() {
            info!("update window stopped");
            self.close(transport, dev_id);
        } else {
            self.state = WindowState::Closed;
        }
    }

    fn close<S: DatagramSocket>(&mut self, transport: &mut DatagramTransport<S>, dev_id: &str) {
        self.state = WindowState::Closed;
        Self::announce(transport, dev_id, status::OTA_STOP, None);
    }

    fn announce<S: DatagramSocket>(
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
        status: &str,
        msg: Option<&str>,
    ) {
        if let Err(e) = transport.broadcast_status(dev_id, status, msg) {
            warn!("status {} not sent: {}", status, e);
        }
    }
}
