pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod ledger;
pub mod sampler;
pub mod stream;
pub mod throttle;

pub use config::{DirectionLimits, ShaperConfig};
pub use error::{Result, ShaperError};
pub use events::{
    BandwidthSnapshot, EventBus, ShaperEvent, VolumeLimitEvent, format_bytes, spawn_log_sink,
};
pub use hooks::{BodyExchange, TrafficShaper, volume_limit_notice};
pub use ledger::{BandwidthLedger, Direction};
pub use sampler::SpeedSampler;
pub use stream::ThrottledStream;
pub use throttle::{ThrottleWindow, delay_for};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_tracing(log_dir: Option<&str>, log_file: &str, log_level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if let Some(log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(true),
            )
            .init();
        None
    }
}
