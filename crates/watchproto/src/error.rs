//! Channel errors, split by how callers must react to them.

use thiserror::Error;

/// Failure while moving an envelope across the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A complete frame arrived but did not hold a valid envelope.
    /// The frame is consumed; the channel remains usable.
    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The underlying stream failed to read or write.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// The peer closed the stream on a frame boundary.
    #[error("channel closed by peer")]
    Closed,
}

impl ChannelError {
    pub fn is_decode(&self) -> bool {
        matches!(self, ChannelError::Decode(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ChannelError::Closed)
    }
}
