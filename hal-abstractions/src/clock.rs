//! Monotonic time source

/// Millisecond clock and cooperative delay
///
/// `now_ms` must be monotonic for the lifetime of the process. It is the
/// only notion of time the engine uses: sample due-times, update window
/// deadlines and join timeouts are all expressed against it.
pub trait Clock {
    /// Milliseconds elapsed since boot
    fn now_ms(&self) -> u64;

    /// Give up the processor for `ms` milliseconds
    ///
    /// On a cooperative target this is where background work (radio stack,
    /// watchdog) gets to run, so implementations must yield rather than spin.
    fn delay_ms(&mut self, ms: u32);

    /// Milliseconds elapsed since `earlier`, saturating at zero
    fn elapsed_since(&self, earlier: u64) -> u64 {
        self.now_ms().saturating_sub(earlier)
    }
}
