use crate::codec::MAX_VARINT_LEN;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a frame.
    #[error("unexpected end of stream (incomplete frame)")]
    UnexpectedEof,

    /// The length varint did not terminate within its maximum width.
    #[error("malformed frame: length varint exceeds {MAX_VARINT_LEN} bytes")]
    VarintOverflow,

    /// The payload length exceeds the configured cap.
    #[error("malformed frame: payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The underlying writer accepted fewer bytes than the payload length.
    #[error("failed to write payload")]
    ShortWrite,

    /// An I/O error occurred on the underlying stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
