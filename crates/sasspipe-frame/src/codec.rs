use std::io::{ErrorKind, Read};

use crate::error::{FrameError, Result};

/// Maximum width of a varint length prefix in bytes.
pub const MAX_VARINT_LEN: usize = 10;

/// Width of the legacy fixed length prefix in bytes.
pub const FIXED_PREFIX_LEN: usize = 4;

/// Default soft cap on frame payload size: 256 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Length-prefix encoding for a frame stream.
///
/// Selected at construction; a reader or writer never mixes encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// Unsigned LEB128 varint, at most [`MAX_VARINT_LEN`] bytes (current protocol).
    Varint,
    /// Fixed-width little-endian u32 (legacy protocol).
    FixedLe32,
}

/// Encode `len` into `buf` using `prefix`, returning the encoded width.
pub fn put_len(prefix: LengthPrefix, len: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> Result<usize> {
    match prefix {
        LengthPrefix::Varint => Ok(put_uvarint(buf, len)),
        LengthPrefix::FixedLe32 => {
            let fixed = u32::try_from(len).map_err(|_| FrameError::PayloadTooLarge {
                size: len as usize,
                max: u32::MAX as usize,
            })?;
            buf[..FIXED_PREFIX_LEN].copy_from_slice(&fixed.to_le_bytes());
            Ok(FIXED_PREFIX_LEN)
        }
    }
}

/// Encode `value` as an unsigned LEB128 varint, returning the encoded width.
pub fn put_uvarint(buf: &mut [u8; MAX_VARINT_LEN], mut value: u64) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a length prefix from `reader`.
///
/// The varint decoder pulls one byte at a time; callers are expected to hand
/// in a buffered reader so this does not cost one syscall per byte.
pub fn read_len<R: Read>(prefix: LengthPrefix, reader: &mut R) -> Result<u64> {
    match prefix {
        LengthPrefix::Varint => read_uvarint(reader),
        LengthPrefix::FixedLe32 => {
            let mut buf = [0u8; FIXED_PREFIX_LEN];
            buf[0] = read_byte(reader, true)?;
            for slot in buf.iter_mut().skip(1) {
                *slot = read_byte(reader, false)?;
            }
            Ok(u64::from(u32::from_le_bytes(buf)))
        }
    }
}

/// Decode an unsigned LEB128 varint from `reader`, one byte at a time.
pub fn read_uvarint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let byte = read_byte(reader, i == 0)?;
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(FrameError::VarintOverflow);
            }
            return Ok(value | (u64::from(byte) << shift));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }
    Err(FrameError::VarintOverflow)
}

/// Read a single byte. End of stream maps to [`FrameError::ConnectionClosed`]
/// on a frame boundary and [`FrameError::UnexpectedEof`] mid-frame.
fn read_byte<R: Read>(reader: &mut R, at_boundary: bool) -> Result<u8> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                return Err(if at_boundary {
                    FrameError::ConnectionClosed
                } else {
                    FrameError::UnexpectedEof
                });
            }
            Ok(_) => return Ok(byte[0]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}
