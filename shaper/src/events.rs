use crate::ledger::Direction;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Copy of both directions' counters and flags at the moment of publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandwidthSnapshot {
    pub total_uploaded_bytes: u64,
    pub total_downloaded_bytes: u64,
    pub upload_speed: u64,
    pub download_speed: u64,
    pub upload_limit_exceeded: bool,
    pub download_limit_exceeded: bool,
}

/// Fired once, the moment a direction's volume limit is first crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeLimitEvent {
    pub direction: Direction,
    pub limit_bytes: i64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShaperEvent {
    BandwidthChanged(BandwidthSnapshot),
    VolumeLimitReached(VolumeLimitEvent),
}

/// Fan-out point for shaper events.
///
/// Subscribers receive events over unbounded channels, so emitting never
/// blocks and a stalled or dropped subscriber cannot hold up the ledger.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<ShaperEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> UnboundedReceiver<ShaperEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping closed ones.
    pub fn emit(&self, event: ShaperEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Spawn a console observer that renders bus events as log lines.
pub fn spawn_log_sink(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ShaperEvent::BandwidthChanged(snapshot) => {
                    info!(
                        "download: total {}, speed {}/s; upload: total {}, speed {}/s",
                        format_bytes(snapshot.total_downloaded_bytes),
                        format_bytes(snapshot.download_speed),
                        format_bytes(snapshot.total_uploaded_bytes),
                        format_bytes(snapshot.upload_speed),
                    );
                }
                ShaperEvent::VolumeLimitReached(event) => {
                    warn!(
                        "{} volume limit of {} reached (total {})",
                        event.direction,
                        format_bytes(event.limit_bytes.max(0) as u64),
                        format_bytes(event.total_bytes),
                    );
                }
            }
        }
    })
}

/// Format a byte count as a short human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
