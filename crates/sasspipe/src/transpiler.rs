use std::io::BufReader;
use std::process::ChildStdin;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use prost::Message as _;
use tracing::{debug, warn};

use sasspipe_frame::{FrameError, FrameReader, FrameWriter, LengthPrefix};
use sasspipe_proto as proto;

use crate::conn::{self, Connection, StdoutReader};
use crate::error::{CompileError, Error, Result};
use crate::event;
use crate::event::LogEvent;
use crate::options::{Args, Options, DEFAULT_COMPILER_FILENAME};
use crate::registry::Registry;
use crate::resolver::ImportResolver;

/// The result of a successful compile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub css: String,
    /// Serialized source map; empty unless requested in
    /// [`Args::enable_source_map`].
    pub source_map: String,
}

/// A handle to one embedded-compiler process.
///
/// Created by [`Transpiler::start`], destroyed by [`Transpiler::close`].
/// Thread safe: any number of threads may call
/// [`execute`](Transpiler::execute) concurrently; all requests are
/// multiplexed over the compiler's single stdin/stdout pipe pair.
pub struct Transpiler {
    shared: Arc<Shared>,
}

struct Shared {
    timeout: Option<Duration>,
    log_events: Option<Box<dyn Fn(LogEvent) + Send + Sync>>,

    /// Serializes frames onto the child's stdin. Outermost lock; the
    /// registry lock may be taken while holding it, never the reverse.
    writer: Mutex<Writer>,

    /// Pending map, id counter, and lifecycle flags. Innermost lock with
    /// very short critical sections.
    registry: Mutex<Registry>,
}

struct Writer {
    /// `None` once close has run; dropping it closes the child's stdin.
    frame: Option<FrameWriter<ChildStdin>>,
    conn: Option<Connection>,
    /// Reused encode buffer for outgoing messages.
    buf: BytesMut,
}

impl Transpiler {
    /// Spawn the compiler and the reader thread.
    ///
    /// Closing the transpiler shuts the process down; the compiler exits on
    /// its own when its stdin reaches EOF.
    pub fn start(options: Options) -> Result<Transpiler> {
        let Options {
            filename,
            timeout,
            stderr,
            log_events,
        } = options;
        let filename = if filename.is_empty() {
            DEFAULT_COMPILER_FILENAME.to_string()
        } else {
            filename
        };
        let bin = conn::look_path(&filename)?;
        let (connection, stdin, stdout) = conn::spawn(&bin, stderr)?;

        let shared = Arc::new(Shared {
            timeout,
            log_events,
            writer: Mutex::new(Writer {
                frame: Some(FrameWriter::new(stdin, LengthPrefix::Varint)),
                conn: Some(connection),
                buf: BytesMut::new(),
            }),
            registry: Mutex::new(Registry::new()),
        });

        let frames = FrameReader::new(stdout, LengthPrefix::Varint);
        let loop_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("sasspipe-reader".to_string())
            .spawn(move || read_loop(loop_shared, frames))?;

        Ok(Transpiler { shared })
    }

    /// Transpile `args.source` into CSS.
    ///
    /// A compile failure is returned as [`Error::Compile`] and leaves the
    /// transpiler fully usable. Transport failures and shutdown complete
    /// every in-flight call with the same error.
    pub fn execute(&self, args: Args) -> Result<CompileResult> {
        let (wait, message) = {
            let mut registry = self.shared.registry.lock().unwrap();
            let (id, wait) = registry.register(args.import_resolver.clone())?;
            let message = proto::InboundMessage {
                message: Some(proto::inbound_message::Message::CompileRequest(
                    args.to_compile_request(id),
                )),
            };
            debug!(id, "compile request registered");
            (wait, message)
        };

        send_inbound(&self.shared, &message)?;

        let outcome = match self.shared.timeout {
            Some(timeout) => match wait.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                // The pending record stays in the table; the compiler is
                // presumed broken once a deadline fires.
                Err(RecvTimeoutError::Timeout) => return Err(Error::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(Error::Shutdown),
            },
            None => wait.recv().map_err(|_| Error::Shutdown)?,
        };

        translate_response(outcome?)
    }

    /// Close the stream to the compiler, shutting it down. Returns
    /// [`Error::Shutdown`] if close has already been requested.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.shared.writer.lock().unwrap();
        {
            let mut registry = self.shared.registry.lock().unwrap();
            if registry.closing {
                return Err(Error::Shutdown);
            }
            registry.closing = true;
        }

        // Teardown order: writer, reader, wait. Dropping the frame writer
        // closes the child's stdin (its quit signal); the connection then
        // closes the reader half and waits for the exit. The reader thread
        // unblocks on the closed reader or EOF and drains the pending map.
        let write_err = match writer.frame.take() {
            Some(mut frame) => frame.flush().err().map(Error::from),
            None => None,
        };
        let wait_err = writer.conn.take().and_then(|conn| conn.close().err());

        // Precedence: writer error, then reader error, then wait error.
        // Closing the reader handle cannot fail, so its slot is always
        // empty.
        match write_err.or(wait_err) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether the reader loop has terminated and every pending call has
    /// been completed. Intended for tests.
    pub fn is_shut_down(&self) -> bool {
        let registry = self.shared.registry.lock().unwrap();
        registry.shutdown && registry.len() == 0
    }
}

impl Drop for Transpiler {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn translate_response(response: proto::CompileResponse) -> Result<CompileResult> {
    match response.result {
        Some(proto::compile_response::Result::Success(success)) => Ok(CompileResult {
            css: success.css,
            source_map: success.source_map,
        }),
        Some(proto::compile_response::Result::Failure(failure)) => {
            Err(Error::Compile(CompileError::from_wire(failure)))
        }
        None => Err(Error::UnsupportedMessage),
    }
}

/// Serialize `message` and write it as one frame, under the writer lock.
/// Both compile requests and the reader loop's callback replies go through
/// here, so no two payloads ever interleave on the wire.
fn send_inbound(shared: &Shared, message: &proto::InboundMessage) -> Result<()> {
    let mut writer = shared.writer.lock().unwrap();
    {
        let registry = shared.registry.lock().unwrap();
        if registry.closing || registry.shutdown {
            return Err(Error::Shutdown);
        }
    }
    let writer = &mut *writer;
    let frame = writer.frame.as_mut().ok_or(Error::Shutdown)?;
    writer.buf.clear();
    message
        .encode(&mut writer.buf)
        .map_err(|err| Error::Encode(err.to_string()))?;
    frame.write_frame(&writer.buf)?;
    Ok(())
}

enum LoopExit {
    /// Clean EOF on a frame boundary.
    Eof,
    Fatal(Error),
}

/// The reader loop: one long-running thread per transpiler. Reads frames
/// off the compiler's stdout and dispatches by variant until a read, decode,
/// or dispatch failure, then drains every pending call with the classified
/// error.
fn read_loop(shared: Arc<Shared>, mut frames: FrameReader<BufReader<StdoutReader>>) {
    let exit = loop {
        let payload = match frames.read_frame() {
            Ok(payload) => payload,
            Err(FrameError::ConnectionClosed) => break LoopExit::Eof,
            Err(err) => break LoopExit::Fatal(err.into()),
        };
        let message = match proto::OutboundMessage::decode(payload.as_ref()) {
            Ok(message) => message,
            Err(err) => break LoopExit::Fatal(Error::Decode(err.to_string())),
        };
        if let Err(err) = dispatch(&shared, message) {
            break LoopExit::Fatal(err);
        }
    };

    // Terminate pending calls. Writer lock first, then registry: the fixed
    // order, and sends must not interleave with the drain.
    let _writer = shared.writer.lock().unwrap();
    let (cause, drained) = {
        let mut registry = shared.registry.lock().unwrap();
        let cause = match exit {
            LoopExit::Eof if registry.closing => Error::Shutdown,
            LoopExit::Eof => Error::UnexpectedEof,
            LoopExit::Fatal(err) => err,
        };
        (cause, registry.drain())
    };
    match cause {
        Error::Shutdown => debug!("reader loop terminated after close"),
        ref err => warn!(error = %err, "reader loop terminated"),
    }
    for call in drained {
        call.complete(Err(cause.clone()));
    }
}

fn dispatch(shared: &Shared, message: proto::OutboundMessage) -> Result<()> {
    use proto::outbound_message::Message;

    match message.message {
        Some(Message::CompileResponse(response)) => on_compile_response(shared, response),
        Some(Message::CanonicalizeRequest(request)) => on_canonicalize(shared, request),
        Some(Message::ImportRequest(request)) => on_import(shared, request),
        Some(Message::LogEvent(log_event)) => {
            on_log_event(shared, log_event);
            Ok(())
        }
        Some(Message::Error(protocol_error)) => Err(Error::Protocol(protocol_error.message)),
        None => Err(Error::UnsupportedMessage),
    }
}

fn on_compile_response(shared: &Shared, response: proto::CompileResponse) -> Result<()> {
    let id = response.id;
    let call = shared
        .registry
        .lock()
        .unwrap()
        .take(id)
        .ok_or(Error::UnknownId(id))?;
    call.complete(Ok(response));
    Ok(())
}

/// Look up the per-call resolver for a callback message. The call must stay
/// in the table: the compilation is still in flight.
fn resolver_for(shared: &Shared, compilation_id: u32) -> Result<Option<Arc<dyn ImportResolver>>> {
    shared
        .registry
        .lock()
        .unwrap()
        .peek_resolver(compilation_id)
        .ok_or(Error::UnknownId(compilation_id))
}

fn on_canonicalize(shared: &Shared, request: proto::CanonicalizeRequest) -> Result<()> {
    let resolver = resolver_for(shared, request.compilation_id)?;
    let result = match resolver {
        Some(resolver) => match resolver.canonicalize(&request.url) {
            Ok(Some(url)) if !url.is_empty() => {
                Some(proto::canonicalize_response::Result::Url(url))
            }
            // Not handled; the compiler tries the next importer.
            Ok(_) => None,
            Err(err) => Some(proto::canonicalize_response::Result::Error(err.to_string())),
        },
        None => Some(proto::canonicalize_response::Result::Error(format!(
            "compilation {} has no import resolver",
            request.compilation_id
        ))),
    };

    send_inbound(
        shared,
        &proto::InboundMessage {
            message: Some(proto::inbound_message::Message::CanonicalizeResponse(
                proto::CanonicalizeResponse {
                    id: request.id,
                    result,
                },
            )),
        },
    )
}

fn on_import(shared: &Shared, request: proto::ImportRequest) -> Result<()> {
    let resolver = resolver_for(shared, request.compilation_id)?;

    // The compiler expects a browser-accessible URL or nothing at all; with
    // no URL it generates a `data:` URL from the contents.
    let source_map_url = if has_scheme(&request.url) {
        request.url.clone()
    } else {
        String::new()
    };

    let result = match resolver {
        Some(resolver) => match resolver.load(&request.url) {
            Ok(import) => Some(proto::import_response::Result::Success(
                proto::ImportSuccess {
                    contents: import.content,
                    syntax: import.source_syntax.to_wire() as i32,
                    source_map_url,
                },
            )),
            Err(err) => Some(proto::import_response::Result::Error(err.to_string())),
        },
        None => Some(proto::import_response::Result::Error(format!(
            "compilation {} has no import resolver",
            request.compilation_id
        ))),
    };

    send_inbound(
        shared,
        &proto::InboundMessage {
            message: Some(proto::inbound_message::Message::ImportResponse(
                proto::ImportResponse {
                    id: request.id,
                    result,
                },
            )),
        },
    )
}

fn on_log_event(shared: &Shared, log_event: proto::LogEvent) {
    if let Some(sink) = &shared.log_events {
        sink(event::from_wire(log_event));
    }
}

fn has_scheme(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}
