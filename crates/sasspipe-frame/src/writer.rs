use std::io::{ErrorKind, Write};

use crate::codec::{self, LengthPrefix, DEFAULT_MAX_PAYLOAD, MAX_VARINT_LEN};
use crate::error::{FrameError, Result};

/// Writes length-prefixed frames to any `Write` stream.
///
/// The prefix buffer is allocated once per writer, not per frame.
pub struct FrameWriter<W> {
    inner: W,
    prefix: LengthPrefix,
    max_payload: usize,
    len_buf: [u8; MAX_VARINT_LEN],
}

impl<W: Write> FrameWriter<W> {
    /// Create a frame writer with the default payload cap.
    pub fn new(inner: W, prefix: LengthPrefix) -> Self {
        Self::with_max_payload(inner, prefix, DEFAULT_MAX_PAYLOAD)
    }

    /// Create a frame writer with an explicit payload cap.
    pub fn with_max_payload(inner: W, prefix: LengthPrefix, max_payload: usize) -> Self {
        Self {
            inner,
            prefix,
            max_payload,
            len_buf: [0u8; MAX_VARINT_LEN],
        }
    }

    /// Write one frame: the length prefix, then the payload, then flush.
    ///
    /// The payload goes out as a single write. If the stream accepts fewer
    /// bytes than the payload length the connection is assumed unusable and
    /// [`FrameError::ShortWrite`] is returned without any recovery attempt.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let n = codec::put_len(self.prefix, payload.len() as u64, &mut self.len_buf)?;
        self.inner.write_all(&self.len_buf[..n])?;

        let written = loop {
            match self.inner.write(payload) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        };
        if written != payload.len() {
            return Err(FrameError::ShortWrite);
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(FrameError::Io)
    }

    /// The length-prefix encoding this writer was constructed with.
    pub fn prefix(&self) -> LengthPrefix {
        self.prefix
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::FrameReader;

    #[test]
    fn written_frames_decode() {
        let mut writer = FrameWriter::new(Vec::new(), LengthPrefix::Varint);
        writer.write_frame(b"first").unwrap();
        writer.write_frame(b"second").unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()), LengthPrefix::Varint);
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"first");
        assert_eq!(reader.read_frame().unwrap().as_ref(), b"second");
    }

    #[test]
    fn varint_prefix_matches_payload_length() {
        let mut writer = FrameWriter::new(Vec::new(), LengthPrefix::Varint);
        let payload = vec![0u8; 300];
        writer.write_frame(&payload).unwrap();

        let bytes = writer.into_inner();
        // 300 encodes as two varint bytes: 0xac 0x02.
        assert_eq!(&bytes[..2], &[0xac, 0x02]);
        assert_eq!(bytes.len(), 2 + 300);
    }

    #[test]
    fn legacy_prefix_is_four_le_bytes() {
        let mut writer = FrameWriter::new(Vec::new(), LengthPrefix::FixedLe32);
        writer.write_frame(b"abcde").unwrap();

        let bytes = writer.into_inner();
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"abcde");
    }

    #[test]
    fn payload_over_cap_rejected_before_any_write() {
        let mut writer = FrameWriter::with_max_payload(Vec::new(), LengthPrefix::Varint, 4);
        let err = writer.write_frame(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.into_inner().is_empty());
    }

    #[test]
    fn short_payload_write_is_fatal() {
        struct ShortWriter {
            calls: usize,
        }

        impl Write for ShortWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.calls += 1;
                // Accept the prefix in full, then truncate the payload.
                if self.calls == 1 {
                    Ok(buf.len())
                } else {
                    Ok(buf.len() / 2)
                }
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = FrameWriter::new(ShortWriter { calls: 0 }, LengthPrefix::Varint);
        let err = writer.write_frame(b"payload").unwrap_err();
        assert!(matches!(err, FrameError::ShortWrite));
    }

    #[test]
    fn flush_error_propagates() {
        struct FailingFlush;

        impl Write for FailingFlush {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }
        }

        let mut writer = FrameWriter::new(FailingFlush, LengthPrefix::Varint);
        let err = writer.write_frame(b"x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }
}
