use crate::ledger::{BandwidthLedger, Direction};
use crate::stream::ThrottledStream;
use crate::throttle::ThrottleWindow;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use tracing::{debug, warn};

/// Engine-side view of one in-flight message with a body.
///
/// The proxy engine implements this for its request and response pipeline
/// stages and hands it to the shaper at the two extension points. The shaper
/// either puts the (possibly delayed) payload back with [`set_body`], or
/// short-circuits the message with [`respond_with`], or touches nothing.
///
/// [`set_body`]: BodyExchange::set_body
/// [`respond_with`]: BodyExchange::respond_with
#[async_trait]
pub trait BodyExchange: Send {
    /// Read the full payload about to be forwarded.
    async fn read_body(&mut self) -> io::Result<Bytes>;

    /// Replace the payload that will be forwarded.
    fn set_body(&mut self, body: Bytes);

    /// Short-circuit the message with a substitute response.
    fn respond_with(&mut self, body: Bytes);
}

/// Per-message shaping hook invoked by the proxy engine before a request or
/// response body is forwarded.
///
/// Holds its own throttle window per direction; the windows approximate the
/// configured rate per shaper instance, not as a precise aggregate across
/// instances.
pub struct TrafficShaper {
    ledger: BandwidthLedger,
    upload_window: Mutex<ThrottleWindow>,
    download_window: Mutex<ThrottleWindow>,
}

impl TrafficShaper {
    pub fn new(ledger: BandwidthLedger) -> Self {
        Self {
            ledger,
            upload_window: Mutex::new(ThrottleWindow::new()),
            download_window: Mutex::new(ThrottleWindow::new()),
        }
    }

    pub fn ledger(&self) -> &BandwidthLedger {
        &self.ledger
    }

    /// Hook for the engine's "before request body forwarded" extension
    /// point.
    pub async fn on_request_body(&self, exchange: &mut dyn BodyExchange) {
        self.shape(Direction::Upload, exchange).await;
    }

    /// Hook for the engine's "before response body forwarded" extension
    /// point.
    pub async fn on_response_body(&self, exchange: &mut dyn BodyExchange) {
        self.shape(Direction::Download, exchange).await;
    }

    async fn shape(&self, direction: Direction, exchange: &mut dyn BodyExchange) {
        if self.ledger.is_volume_limit_exceeded(direction) {
            exchange.respond_with(volume_limit_notice(direction));
            return;
        }

        let body = match exchange.read_body().await {
            Ok(body) => body,
            Err(err) => {
                // engine I/O errors leave the message unshaped
                warn!("failed to read {} body, skipping shaping: {}", direction, err);
                return;
            }
        };

        if !self.ledger.track_bytes(direction, body.len() as u64) {
            exchange.respond_with(volume_limit_notice(direction));
            return;
        }

        let speed_limit = self.ledger.speed_limit(direction);
        if speed_limit > 0 {
            let delay = self
                .window(direction)
                .lock()
                .throttle(body.len() as u64, speed_limit);
            if !delay.is_zero() {
                debug!(
                    "throttling {} body of {} bytes for {:?}",
                    direction,
                    body.len(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        exchange.set_body(body);
    }

    /// Wrap a tunneled byte stream with the direction's configured speed
    /// limit, for traffic the engine streams instead of buffering.
    pub fn wrap_stream<S>(&self, direction: Direction, inner: S) -> ThrottledStream<S> {
        ThrottledStream::new(inner, self.ledger.speed_limit(direction))
    }

    fn window(&self, direction: Direction) -> &Mutex<ThrottleWindow> {
        match direction {
            Direction::Upload => &self.upload_window,
            Direction::Download => &self.download_window,
        }
    }
}

/// Substitute payload forwarded in place of a body once the direction's
/// volume limit is exhausted.
pub fn volume_limit_notice(direction: Direction) -> Bytes {
    let message = match direction {
        Direction::Upload => "Upload volume limit exceeded",
        Direction::Download => "Download volume limit exceeded",
    };
    Bytes::from(format!(
        "<!DOCTYPE html>\r\n\
         <html>\r\n\
         <head><title>Bandwidth Limit Exceeded</title></head>\r\n\
         <body>\r\n\
         <h1>Bandwidth Limit Exceeded</h1>\r\n\
         <p>{message}</p>\r\n\
         <p>The configured data transfer limit has been reached.</p>\r\n\
         </body>\r\n\
         </html>\r\n"
    ))
}
