use crate::throttle::ThrottleWindow;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{Sleep, sleep};

enum ThrottleState {
    /// Next I/O attempt must consult the window first
    Idle,
    Waiting(Pin<Box<Sleep>>),
    /// Throttle already charged for the attempt in progress
    Charged,
}

/// Stream wrapper applying the throttle discipline per read/write call, for
/// traffic the engine streams instead of buffering (tunneled connections).
///
/// Reads and writes share one throttle window and a flat rate fixed at
/// construction; a rate at or below zero disables throttling entirely.
/// Volume caps do not apply at this level.
pub struct ThrottledStream<S> {
    inner: S,
    rate: Option<u64>,
    window: ThrottleWindow,
    read_state: ThrottleState,
    write_state: ThrottleState,
    total_bytes_transferred: u64,
}

impl<S> ThrottledStream<S> {
    /// Wrap `inner`, pacing reads and writes to `bytes_per_second`.
    pub fn new(inner: S, bytes_per_second: i64) -> Self {
        Self {
            inner,
            rate: (bytes_per_second > 0).then_some(bytes_per_second as u64),
            window: ThrottleWindow::new(),
            read_state: ThrottleState::Idle,
            write_state: ThrottleState::Idle,
            total_bytes_transferred: 0,
        }
    }

    /// Bytes actually moved through this wrapper in both directions.
    pub fn total_bytes_transferred(&self) -> u64 {
        self.total_bytes_transferred
    }

    pub fn rate(&self) -> Option<u64> {
        self.rate
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Drive `state` until the window's delay for `bytes` has been served.
fn poll_throttle(
    state: &mut ThrottleState,
    window: &mut ThrottleWindow,
    rate: Option<u64>,
    bytes: u64,
    cx: &mut Context<'_>,
) -> Poll<()> {
    let Some(rate) = rate else {
        return Poll::Ready(());
    };

    loop {
        match state {
            ThrottleState::Charged => return Poll::Ready(()),
            ThrottleState::Idle => {
                let delay = window.throttle(bytes, rate as i64);
                *state = if delay.is_zero() {
                    ThrottleState::Charged
                } else {
                    ThrottleState::Waiting(Box::pin(sleep(delay)))
                };
            }
            ThrottleState::Waiting(delay) => {
                ready!(delay.as_mut().poll(cx));
                *state = ThrottleState::Charged;
            }
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ThrottledStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_throttle(
            &mut this.read_state,
            &mut this.window,
            this.rate,
            buf.remaining() as u64,
            cx,
        ));

        let filled_before = buf.filled().len();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.read_state = ThrottleState::Idle;
                if result.is_ok() {
                    this.total_bytes_transferred += (buf.filled().len() - filled_before) as u64;
                }
                Poll::Ready(result)
            }
            // the throttle stays charged for the retry
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ThrottledStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(poll_throttle(
            &mut this.write_state,
            &mut this.window,
            this.rate,
            buf.len() as u64,
            cx,
        ));

        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(written)) => {
                this.write_state = ThrottleState::Idle;
                this.total_bytes_transferred += written as u64;
                Poll::Ready(Ok(written))
            }
            Poll::Ready(Err(err)) => {
                this.write_state = ThrottleState::Idle;
                Poll::Ready(Err(err))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
