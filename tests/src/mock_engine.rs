use async_trait::async_trait;
use bytes::Bytes;
use shaper::BodyExchange;
use std::io;

/// Stand-in for the proxy engine's per-message pipeline stage: carries one
/// body and records what the shaper decided to do with it.
pub struct MockExchange {
    body: Bytes,
    read_fails: bool,
    forwarded: Option<Bytes>,
    substituted: Option<Bytes>,
}

impl MockExchange {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            read_fails: false,
            forwarded: None,
            substituted: None,
        }
    }

    pub fn with_len(len: usize) -> Self {
        Self::new(vec![0x5Au8; len])
    }

    /// Exchange whose body read fails, as a broken client connection would.
    pub fn failing() -> Self {
        Self {
            body: Bytes::new(),
            read_fails: true,
            forwarded: None,
            substituted: None,
        }
    }

    pub fn forwarded(&self) -> Option<&Bytes> {
        self.forwarded.as_ref()
    }

    pub fn substituted(&self) -> Option<&Bytes> {
        self.substituted.as_ref()
    }

    /// True when the shaper neither forwarded nor substituted anything.
    pub fn untouched(&self) -> bool {
        self.forwarded.is_none() && self.substituted.is_none()
    }
}

#[async_trait]
impl BodyExchange for MockExchange {
    async fn read_body(&mut self) -> io::Result<Bytes> {
        if self.read_fails {
            Err(io::Error::other("connection reset by peer"))
        } else {
            Ok(self.body.clone())
        }
    }

    fn set_body(&mut self, body: Bytes) {
        self.forwarded = Some(body);
    }

    fn respond_with(&mut self, body: Bytes) {
        self.substituted = Some(body);
    }
}
