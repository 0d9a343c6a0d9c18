use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::codec::{self, LengthPrefix, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

/// Reads complete frame payloads from any `Read` stream.
///
/// The varint prefix decoder issues single-byte reads, so the underlying
/// stream should be buffered (a `BufReader` over a pipe, for instance).
pub struct FrameReader<R> {
    inner: R,
    prefix: LengthPrefix,
    max_payload: usize,
    buf: BytesMut,
}

impl<R: Read> FrameReader<R> {
    /// Create a frame reader with the default payload cap.
    pub fn new(inner: R, prefix: LengthPrefix) -> Self {
        Self::with_max_payload(inner, prefix, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a frame reader with an explicit payload cap.
    pub fn with_max_payload(inner: R, prefix: LengthPrefix, max_payload: usize) -> Self {
        Self {
            inner,
            prefix,
            max_payload,
            buf: BytesMut::new(),
        }
    }

    /// Read the next complete frame payload (blocking).
    ///
    /// Returns [`FrameError::ConnectionClosed`] when the stream ends on a
    /// frame boundary and [`FrameError::UnexpectedEof`] when it ends inside
    /// a frame.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        let len = codec::read_len(self.prefix, &mut self.inner)?;
        let len = usize::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
            size: usize::MAX,
            max: self.max_payload,
        })?;
        if len > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        self.buf.resize(len, 0);
        read_full(&mut self.inner, &mut self.buf)?;
        Ok(self.buf.split().freeze())
    }

    /// The length-prefix encoding this reader was constructed with.
    pub fn prefix(&self) -> LengthPrefix {
        self.prefix
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn read_full<R: Read>(reader: &mut R, mut buf: &mut [u8]) -> Result<()> {
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => return Err(FrameError::UnexpectedEof),
            Ok(n) => buf = &mut buf[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
