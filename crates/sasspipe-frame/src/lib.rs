//! Length-prefixed message framing for the embedded compiler channel.
//!
//! Every message on the compiler's stdin/stdout channel is one frame: a
//! length prefix followed by that many bytes of protocol-buffer payload.
//! The current protocol encodes the length as an unsigned LEB128 varint of
//! at most ten bytes; the legacy protocol uses a fixed 4-byte little-endian
//! integer. The encoding is chosen when a reader or writer is constructed
//! and never changes for the life of the instance.
//!
//! The codec knows nothing about the payloads themselves. Readers hand back
//! complete payloads of known length; writers accept already-serialized
//! payloads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{LengthPrefix, DEFAULT_MAX_PAYLOAD, MAX_VARINT_LEN};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
