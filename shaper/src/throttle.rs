use std::time::Duration;
use tokio::time::Instant;

/// One accounting window in milliseconds.
pub const WINDOW_MS: u64 = 1000;

/// Delay required to keep `limit_bps` honored after moving `bytes` on top of
/// `bytes_in_window` already moved, `elapsed_ms` into the current window.
///
/// Each window carries a full second's budget up front, plus whatever the
/// elapsed fraction of the window has earned on top; bursts inside the
/// window are free until that budget is spent and are paid back as delay
/// afterwards. A limit at or below zero never delays.
pub fn delay_for(limit_bps: i64, bytes: u64, elapsed_ms: u64, bytes_in_window: u64) -> Duration {
    if limit_bps <= 0 {
        return Duration::ZERO;
    }

    let limit = limit_bps as u64;
    let allowed = limit.saturating_mul(WINDOW_MS + elapsed_ms.min(WINDOW_MS)) / 1000;
    let moved = bytes_in_window.saturating_add(bytes);
    if moved <= allowed {
        Duration::ZERO
    } else {
        Duration::from_millis(WINDOW_MS.saturating_mul(moved - allowed) / limit)
    }
}

/// Accounting state for one second of transfer, owned by a single shaper
/// direction or wrapped stream and never shared.
#[derive(Debug)]
pub struct ThrottleWindow {
    window_start: Instant,
    bytes_in_window: u64,
}

impl ThrottleWindow {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            bytes_in_window: 0,
        }
    }

    /// Account for `bytes` about to move and return the delay the caller
    /// must honor before moving them.
    ///
    /// A window older than one second restarts with `bytes` as its first
    /// entry and costs nothing. A positive delay also restarts the window,
    /// with the origin placed at the moment the delay ends.
    pub fn throttle(&mut self, bytes: u64, limit_bps: i64) -> Duration {
        if limit_bps <= 0 {
            return Duration::ZERO;
        }

        let elapsed_ms = self.window_start.elapsed().as_millis() as u64;
        if elapsed_ms >= WINDOW_MS {
            self.window_start = Instant::now();
            self.bytes_in_window = bytes;
            return Duration::ZERO;
        }

        let delay = delay_for(limit_bps, bytes, elapsed_ms, self.bytes_in_window);
        if delay.is_zero() {
            self.bytes_in_window += bytes;
        } else {
            self.window_start = Instant::now() + delay;
            self.bytes_in_window = bytes;
        }
        delay
    }

    pub fn bytes_in_window(&self) -> u64 {
        self.bytes_in_window
    }
}

impl Default for ThrottleWindow {
    fn default() -> Self {
        Self::new()
    }
}
