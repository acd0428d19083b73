//! Timestamps captured during one ranging exchange
//!
//! Tag and anchor each fill in the half they observe; the other fields stay
//! empty. [`RangingSession`] adds who the exchange is with.

use serde::{Deserialize, Serialize};

use crate::{
    time::{Duration, Instant},
    DeviceId, ShortId,
};

/// Hardware TX/RX timestamps of one Poll/Response/Final exchange
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Timestamps {
    /// Poll sent (tag)
    pub poll_tx: Option<Instant>,
    /// Poll received (anchor)
    pub poll_rx: Option<Instant>,
    /// Response sent (anchor)
    pub resp_tx: Option<Instant>,
    /// Response received (tag)
    pub resp_rx: Option<Instant>,
    /// Final sent (tag)
    pub final_tx: Option<Instant>,
    /// Final received (anchor)
    pub final_rx: Option<Instant>,
}

impl Timestamps {
    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        *self == Timestamps::default()
    }

    /// Forgets everything
    pub fn clear(&mut self) {
        *self = Timestamps::default();
    }

    /// Tag side: Poll TX to Response RX
    pub fn tag_round(&self) -> Option<Duration> {
        Some(self.resp_rx?.duration_since(self.poll_tx?))
    }

    /// Tag side: Response RX to Final TX
    pub fn tag_reply(&self) -> Option<Duration> {
        Some(self.final_tx?.duration_since(self.resp_rx?))
    }

    /// Anchor side: Response TX to Final RX
    pub fn anchor_round(&self) -> Option<Duration> {
        Some(self.final_rx?.duration_since(self.resp_tx?))
    }

    /// Anchor side: Poll RX to Response TX
    pub fn anchor_reply(&self) -> Option<Duration> {
        Some(self.resp_tx?.duration_since(self.poll_rx?))
    }
}

/// The one ranging exchange in flight
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangingSession {
    /// The tag's identity
    ///
    /// Only known on the anchor; a tag never learns its peer's 64-bit id.
    pub tag: Option<DeviceId>,
    /// The peer's short address
    pub peer: ShortId,
    /// The short id assigned to the tag
    pub short_id: ShortId,
    /// The agreed delay between receiving a frame and replying
    pub response_delay: Duration,
    /// What has been captured so far
    pub timestamps: Timestamps,
}
