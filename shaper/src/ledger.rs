use crate::config::DirectionLimits;
use crate::events::{BandwidthSnapshot, EventBus, ShaperEvent, VolumeLimitEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Traffic direction through the proxy, tracked and limited independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to upstream
    Upload,
    /// Upstream to client
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

/// Cumulative growth that triggers a bandwidth-changed notification (1 MiB).
const NOTIFY_THRESHOLD: u64 = 1024 * 1024;

#[derive(Debug)]
struct DirectionState {
    speed_limit: i64,
    volume_limit: i64,
    total_bytes: u64,
    bytes_since_sample: u64,
    current_speed: u64,
    limit_exceeded: bool,
    // a tripped-and-acknowledged cap stays released until the limit is
    // reconfigured or stats are reset, so transfer can actually resume
    volume_limit_armed: bool,
    last_notified_total: u64,
}

impl DirectionState {
    fn new(limits: DirectionLimits) -> Self {
        Self {
            speed_limit: limits.speed_limit,
            volume_limit: limits.volume_limit,
            total_bytes: 0,
            bytes_since_sample: 0,
            current_speed: 0,
            limit_exceeded: false,
            volume_limit_armed: true,
            last_notified_total: 0,
        }
    }

    fn publish_speed(&mut self, elapsed_ms: u64) {
        self.current_speed = self.bytes_since_sample.saturating_mul(1000) / elapsed_ms;
        self.bytes_since_sample = 0;
    }

    fn reset_stats(&mut self) {
        self.total_bytes = 0;
        self.bytes_since_sample = 0;
        self.current_speed = 0;
        self.limit_exceeded = false;
        self.volume_limit_armed = true;
        self.last_notified_total = 0;
    }
}

struct LedgerInner {
    upload: DirectionState,
    download: DirectionState,
}

impl LedgerInner {
    fn state(&self, direction: Direction) -> &DirectionState {
        match direction {
            Direction::Upload => &self.upload,
            Direction::Download => &self.download,
        }
    }

    fn state_mut(&mut self, direction: Direction) -> &mut DirectionState {
        match direction {
            Direction::Upload => &mut self.upload,
            Direction::Download => &mut self.download,
        }
    }

    fn snapshot(&self) -> BandwidthSnapshot {
        BandwidthSnapshot {
            total_uploaded_bytes: self.upload.total_bytes,
            total_downloaded_bytes: self.download.total_bytes,
            upload_speed: self.upload.current_speed,
            download_speed: self.download.current_speed,
            upload_limit_exceeded: self.upload.limit_exceeded,
            download_limit_exceeded: self.download.limit_exceeded,
        }
    }
}

/// Thread-safe byte accounting for both directions: cumulative totals,
/// per-sample accumulators, published speeds and sticky volume-limit flags,
/// all guarded by a single mutex so concurrent shaping calls and the speed
/// sampler serialize correctly.
///
/// Events are emitted through the [`EventBus`] only after the guard is
/// dropped; observers never run inside the critical section.
#[derive(Clone)]
pub struct BandwidthLedger {
    inner: Arc<Mutex<LedgerInner>>,
    events: Arc<EventBus>,
}

impl BandwidthLedger {
    pub fn new(events: Arc<EventBus>, upload: DirectionLimits, download: DirectionLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                upload: DirectionState::new(upload),
                download: DirectionState::new(download),
            })),
            events,
        }
    }

    /// Ledger with no limits configured.
    pub fn unlimited(events: Arc<EventBus>) -> Self {
        Self::new(
            events,
            DirectionLimits::default(),
            DirectionLimits::default(),
        )
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Record `bytes` about to move in `direction`.
    ///
    /// Returns `false` when the direction's volume limit forbids the
    /// transfer. Crossing the limit advances the total only up to the limit
    /// itself, sets the sticky exceeded flag and fires the volume-limit and
    /// bandwidth-changed events.
    pub fn track_bytes(&self, direction: Direction, bytes: u64) -> bool {
        let mut pending: Vec<ShaperEvent> = Vec::new();
        let allowed = {
            let mut inner = self.inner.lock();
            let state = inner.state_mut(direction);
            if state.limit_exceeded {
                return false;
            }

            if state.volume_limit > 0
                && state.volume_limit_armed
                && state.total_bytes.saturating_add(bytes) > state.volume_limit as u64
            {
                // record only the bytes that fit under the cap
                let limit = state.volume_limit as u64;
                let fitted = limit.saturating_sub(state.total_bytes);
                state.total_bytes = state.total_bytes.max(limit);
                state.bytes_since_sample += fitted;
                state.limit_exceeded = true;

                let limit_bytes = state.volume_limit;
                let total_bytes = state.total_bytes;
                pending.push(ShaperEvent::VolumeLimitReached(VolumeLimitEvent {
                    direction,
                    limit_bytes,
                    total_bytes,
                }));
                pending.push(ShaperEvent::BandwidthChanged(inner.snapshot()));
                false
            } else {
                state.total_bytes += bytes;
                state.bytes_since_sample += bytes;
                if state.total_bytes - state.last_notified_total >= NOTIFY_THRESHOLD {
                    state.last_notified_total = state.total_bytes;
                    pending.push(ShaperEvent::BandwidthChanged(inner.snapshot()));
                }
                true
            }
        };

        for event in pending {
            self.events.emit(event);
        }
        allowed
    }

    pub fn total_bytes(&self, direction: Direction) -> u64 {
        self.inner.lock().state(direction).total_bytes
    }

    pub fn current_speed(&self, direction: Direction) -> u64 {
        self.inner.lock().state(direction).current_speed
    }

    pub fn is_volume_limit_exceeded(&self, direction: Direction) -> bool {
        self.inner.lock().state(direction).limit_exceeded
    }

    pub fn speed_limit(&self, direction: Direction) -> i64 {
        self.inner.lock().state(direction).speed_limit
    }

    pub fn volume_limit(&self, direction: Direction) -> i64 {
        self.inner.lock().state(direction).volume_limit
    }

    pub fn snapshot(&self) -> BandwidthSnapshot {
        self.inner.lock().snapshot()
    }

    /// Set the speed limit in bytes per second; at or below zero disables it.
    /// Takes effect on the next evaluated transfer.
    pub fn set_speed_limit(&self, direction: Direction, bytes_per_second: i64) {
        debug!("setting {} speed limit to {}", direction, bytes_per_second);
        self.inner.lock().state_mut(direction).speed_limit = bytes_per_second;
    }

    /// Set the volume limit in bytes; at or below zero disables it. Also
    /// clears the direction's exceeded flag and re-arms the cap so the new
    /// value takes effect immediately.
    pub fn set_volume_limit(&self, direction: Direction, bytes: i64) {
        debug!("setting {} volume limit to {}", direction, bytes);
        let mut inner = self.inner.lock();
        let state = inner.state_mut(direction);
        state.volume_limit = bytes;
        state.limit_exceeded = false;
        state.volume_limit_armed = true;
    }

    /// Remove every configured limit and clear both exceeded flags.
    pub fn disable_all_limits(&self) {
        debug!("disabling all limits");
        let mut inner = self.inner.lock();
        for direction in [Direction::Upload, Direction::Download] {
            let state = inner.state_mut(direction);
            state.speed_limit = -1;
            state.volume_limit = -1;
            state.limit_exceeded = false;
            state.volume_limit_armed = true;
        }
    }

    /// Zero all counters, speeds and flags in one critical section.
    pub fn reset_stats(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.upload.reset_stats();
            inner.download.reset_stats();
            inner.snapshot()
        };
        self.events.emit(ShaperEvent::BandwidthChanged(snapshot));
    }

    /// Clear the exceeded flags without touching the totals, letting
    /// transfer resume against the existing counters. A tripped cap stays
    /// released afterwards until it is reconfigured or stats are reset.
    pub fn reset_volume_limit_flags(&self) {
        let mut inner = self.inner.lock();
        for direction in [Direction::Upload, Direction::Download] {
            let state = inner.state_mut(direction);
            if state.limit_exceeded {
                state.limit_exceeded = false;
                state.volume_limit_armed = false;
            }
        }
    }

    /// Consume the per-sample accumulators and publish the speeds they
    /// imply over `elapsed`. Zero-elapsed ticks are skipped so the previous
    /// published value holds. Called by the speed sampler once per second.
    pub fn publish_speed_sample(&self, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed_ms == 0 {
            return;
        }

        let snapshot = {
            let mut inner = self.inner.lock();
            inner.upload.publish_speed(elapsed_ms);
            inner.download.publish_speed(elapsed_ms);
            if inner.upload.current_speed == 0 && inner.download.current_speed == 0 {
                None
            } else {
                Some(inner.snapshot())
            }
        };

        if let Some(snapshot) = snapshot {
            self.events.emit(ShaperEvent::BandwidthChanged(snapshot));
        }
    }
}
