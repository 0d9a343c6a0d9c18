use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sasspipe_frame::FrameError;
use sasspipe_proto as proto;

use crate::options::clean_path;

/// Position of a span endpoint within a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

/// The region of source text a compile failure points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpan {
    pub text: String,
    pub start: SourceLocation,
    pub end: SourceLocation,
    pub url: String,
    pub context: String,
}

/// A structured compile failure reported by the compiler.
///
/// Per-call: the transpiler stays usable and the caller may submit another
/// request immediately.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub span: SourceSpan,
}

impl CompileError {
    pub(crate) fn from_wire(failure: proto::CompileFailure) -> Self {
        let span = failure.span.unwrap_or_default();
        Self {
            message: failure.message,
            span: SourceSpan {
                text: span.text,
                start: location_from_wire(span.start),
                end: location_from_wire(span.end),
                url: span.url,
                context: span.context,
            },
        }
    }
}

fn location_from_wire(location: Option<proto::SourceLocation>) -> SourceLocation {
    let location = location.unwrap_or_default();
    SourceLocation {
        offset: location.offset,
        line: location.line,
        column: location.column,
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let url = self.span.url.strip_prefix("file:").unwrap_or(&self.span.url);
        let file = clean_path(Path::new(url));
        write!(
            f,
            "file: {:?}, context: {:?}: {}",
            file.to_string_lossy(),
            self.span.context,
            self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Errors returned by [`Transpiler`](crate::Transpiler) operations.
///
/// The type is `Clone` because a single reader-loop failure is fanned out to
/// every in-flight call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The connection is shut down or about to be shut down.
    #[error("connection is shut down")]
    Shutdown,

    /// The compiler did not answer within the configured deadline.
    #[error("timed out after {0:?} waiting for the compiler to respond")]
    Timeout(Duration),

    /// The compiler rejected the stylesheet.
    #[error(transparent)]
    Compile(CompileError),

    /// Raised before any wire interaction; does not poison the transpiler.
    #[error("invalid output style {0:?}")]
    InvalidOutputStyle(String),

    /// Raised before any wire interaction; does not poison the transpiler.
    #[error("invalid source syntax {0:?}")]
    InvalidSourceSyntax(String),

    /// The compiler reported a protocol-level error; the connection is dead.
    #[error("compiler protocol error: {0}")]
    Protocol(String),

    /// The compiler closed its stdout while requests were in flight.
    #[error("unexpected end of stream from the compiler")]
    UnexpectedEof,

    /// The compiler sent a message variant this host does not understand.
    #[error("unsupported message type from the compiler")]
    UnsupportedMessage,

    /// A message referenced a compilation id with no pending call.
    #[error("no pending compilation with id {0}")]
    UnknownId(u32),

    /// Frame-level failure on the wire.
    #[error("frame error: {0}")]
    Frame(String),

    /// Failed to serialize an inbound message.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// Failed to deserialize an outbound message.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// I/O failure on the child's pipes.
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),

    /// The executable was not found on a safe `$PATH` walk.
    #[error("executable {0:?} not found in $PATH")]
    ExecutableNotFound(String),

    /// The compiler exited abnormally.
    #[error("the compiler exited abnormally: {0}")]
    CompilerExit(String),

    /// The compiler did not exit within the close timeout.
    #[error("timed out waiting for the compiler to exit")]
    WaitTimeout,

    /// `--version` did not produce the expected single JSON line.
    #[error("failed to read compiler version: {0}")]
    Version(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compile(err)
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::ConnectionClosed | FrameError::UnexpectedEof => Error::UnexpectedEof,
            FrameError::Io(err) => Error::Io(Arc::new(err)),
            other => Error::Frame(other.to_string()),
        }
    }
}
