use crate::codec::CodecError;

/// Errors that can occur while framing messages on a call stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header announced a compressed payload.
    #[error("compression not implemented")]
    CompressionNotImplemented,

    /// The stream ended inside the 5-byte frame header.
    #[error("incomplete frame header ({actual} of 5 bytes)")]
    IncompleteHeader { actual: usize },

    /// The stream ended before the announced payload was fully read.
    #[error("incomplete frame payload ({actual} of {expected} bytes)")]
    IncompletePayload { expected: usize, actual: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The codec could not encode or decode a payload.
    #[error("codec error: {0}")]
    Codec(#[source] CodecError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors caused by a peer violating the framing protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::CompressionNotImplemented
                | FrameError::IncompleteHeader { .. }
                | FrameError::IncompletePayload { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
