//! Sensor sampling and reporting policy
//!
//! Each due cycle reads temperature then humidity. An invalid reading
//! (either value NaN) is announced with a `SENSOR_FAULT` status, zeroes both
//! the current and the last accepted values and retries after the shorter
//! `error_interval`; five in a row escalate to a single `SENSOR_ERROR`. A
//! valid reading advances the sequence number and is reported to the active
//! peer when the reporting mode says so.
//!
//! In on-change mode the comparison baseline is the last *sent* reading:
//! drift below the threshold accumulates until it crosses it, and a failed
//! send leaves the baseline where it was so the next cycle tries again.

use core::fmt::Write as _;

use heapless::String;

use sensor_node_hal::{DatagramSocket, TempHumiditySensor};

use crate::config::{ReportMode, SensorConfig};
use crate::error::TransportError;
use crate::message::{status, LastReading, LastReadingMessage, ReportMessage};
use crate::transport::DatagramTransport;

/// Consecutive invalid readings that escalate to a sensor error
pub const MAX_CONSECUTIVE_INVALID: u32 = 5;

/// One set of readings and the bookkeeping that goes with it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorSample {
    /// Increments only on a valid reading
    pub seq: u32,
    pub t: f32,
    pub h: f32,
    /// Consecutive invalid readings
    pub nan_count: u32,
    /// Invalid-reading episodes that escalated since the last valid reading
    pub err_count: u32,
    /// When the next sample is due, clock milliseconds
    pub next_due: u64,
}

/// What a sampling cycle did
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// Nothing due yet
    NotDue,
    /// The reading was invalid
    Invalid {
        /// Consecutive invalid readings including this one
        consecutive: u32,
        /// This reading hit the ceiling and raised a sensor error
        escalated: bool,
    },
    /// Valid, but the reporting mode held it back
    Suppressed { seq: u32 },
    /// Valid and sent to the peer
    Reported { seq: u32, bytes: usize },
    /// Valid and due for a report, but the send failed
    SendFailed { seq: u32, error: TransportError },
}

fn abs_diff(a: f32, b: f32) -> f32 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Sampling state machine for one sensor
#[derive(Debug, Clone)]
pub struct SensorReporter {
    config: SensorConfig,
    current: SensorSample,
    last_accepted: SensorSample,
    started: bool,
    muted: bool,
}

impl SensorReporter {
    pub fn new(config: &SensorConfig, muted: bool) -> Self {
        Self {
            config: config.clone(),
            current: SensorSample::default(),
            last_accepted: SensorSample::default(),
            started: false,
            muted,
        }
    }

    /// Arm the reporter; the first sample is due after the warm-up delay
    pub fn start(&mut self, now: u64) {
        self.current.next_due = now.saturating_add(u64::from(self.config.warmup));
        self.started = true;
        info!(
            "sensor reporting starts in {} ms, every {} ms, degrees {}",
            self.config.warmup,
            self.config.interval,
            self.config.scale.label()
        );
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.started && now >= self.current.next_due
    }

    /// Due time of the next sample, `None` until started
    pub fn next_due(&self) -> Option<u64> {
        self.started.then_some(self.current.next_due)
    }

    pub fn current(&self) -> &SensorSample {
        &self.current
    }

    pub fn last_accepted(&self) -> &SensorSample {
        &self.last_accepted
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Run one sampling cycle if one is due
    pub fn poll<T, S>(
        &mut self,
        now: u64,
        sensor: &mut T,
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
    ) -> SampleOutcome
    where
        T: TempHumiditySensor,
        S: DatagramSocket,
    {
        if !self.is_due(now) {
            return SampleOutcome::NotDue;
        }

        let t = sensor.read_temperature(self.config.scale);
        let h = sensor.read_humidity();
        if t.is_nan() || h.is_nan() {
            self.current.next_due = now.saturating_add(u64::from(self.config.error_interval));
            return self.invalid(transport, dev_id);
        }

        if self.current.err_count > 0 {
            let mut msg: String<24> = String::new();
            let _ = write!(msg, "errcount {}", self.current.err_count);
            info!("sensor recovered after {} errors", self.current.err_count);
            Self::announce(transport, dev_id, status::SENSOR_RECOVER, Some(msg.as_str()));
            self.current.err_count = 0;
        }
        self.current.nan_count = 0;

        self.current.seq = self.current.seq.wrapping_add(1);
        self.current.t = t;
        self.current.h = h;
        self.current.next_due = now.saturating_add(u64::from(self.config.interval));
        let seq = self.current.seq;
        diag!(self.muted, "sample {}: t={} h={}", seq, t, h);

        if !self.should_report() {
            diag!(
                self.muted,
                "sample {} within thresholds of last report, suppressed",
                seq
            );
            return SampleOutcome::Suppressed { seq };
        }

        let report = ReportMessage {
            dev_id,
            seq,
            t,
            h,
        };
        match Self::send_report(transport, &report) {
            Ok(bytes) => {
                self.last_accepted = self.current;
                SampleOutcome::Reported { seq, bytes }
            }
            Err(error) => {
                warn!("report {} not sent: {}", seq, error);
                SampleOutcome::SendFailed { seq, error }
            }
        }
    }

    /// Whether the current reading is worth sending
    pub fn should_report(&self) -> bool {
        match self.config.report {
            ReportMode::Always => true,
            ReportMode::OnChange => {
                let t_diff = abs_diff(self.current.t, self.last_accepted.t);
                let h_diff = abs_diff(self.current.h, self.last_accepted.h);
                t_diff > self.config.temperature_threshold()
                    || h_diff > self.config.humidity_threshold()
            }
        }
    }

    /// Read the sensor immediately and report it, followed by the last
    /// reported values under the same sequence number
    ///
    /// Outside the periodic schedule: advances the sequence number but
    /// leaves the due time and the on-change baseline alone. An invalid
    /// reading goes out as zeros. `bytes` counts both datagrams.
    pub fn report_now<T, S>(
        &mut self,
        sensor: &mut T,
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
    ) -> SampleOutcome
    where
        T: TempHumiditySensor,
        S: DatagramSocket,
    {
        let mut t = sensor.read_temperature(self.config.scale);
        let mut h = sensor.read_humidity();
        if t.is_nan() || h.is_nan() {
            t = 0.0;
            h = 0.0;
        }

        self.current.seq = self.current.seq.wrapping_add(1);
        self.last_accepted.seq = self.current.seq;
        let seq = self.current.seq;

        let report = ReportMessage { dev_id, seq, t, h };
        let last = LastReadingMessage {
            dev_id,
            seq,
            last: LastReading {
                t: self.last_accepted.t,
                h: self.last_accepted.h,
            },
        };
        let sent = Self::send_report(transport, &report).and_then(|first| {
            let encoded = last.encode()?;
            Ok(first + transport.send(encoded.as_bytes())?)
        });
        match sent {
            Ok(bytes) => SampleOutcome::Reported { seq, bytes },
            Err(error) => {
                warn!("on-demand report {} not sent: {}", seq, error);
                SampleOutcome::SendFailed { seq, error }
            }
        }
    }

    fn invalid<S: DatagramSocket>(
        &mut self,
        transport: &mut DatagramTransport<S>,
        dev_id: &str,
    ) -> SampleOutcome {
        self.current.nan_count += 1;
        let consecutive = self.current.nan_count;
        warn!("invalid sensor reading ({} in a row)", consecutive);

        let mut msg: String<16> = String::new();
        let _ = write!(msg, "NaN {}", consecutive);
        Self::announce(transport, dev_id, status::SENSOR_FAULT, Some(msg.as_str()));

        // a valid reading after this always clears the on-change thresholds
        self.current.t = 0.0;
        self.current.h = 0.0;
        self.last_accepted.t = 0.0;
        self.last_accepted.h = 0.0;

        let escalated = consecutive >= MAX_CONSECUTIVE_INVALID;
        if escalated {
            error!("sensor returned {} invalid readings in a row", consecutive);
            Self::announce(transport, dev_id, status::SENSOR_ERROR, Some("too many NaN"));
            self.current.nan_count = 0;
            self.current.err_count += 1;
        }

        SampleOutcome::Invalid {
            consecutive,
            escalated,
        }
    }

    fn send_report<S: DatagramSocket>(
        transport: &mut DatagramTransport<S>,
        report: &ReportMessage<'_>,
    ) -> Result<usize, TransportError> {
        let encoded = report.encode()?;
        transport.send(encoded.as_bytes())
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
