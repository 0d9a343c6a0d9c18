//! Test support for the sasspipe workspace: a mock embedded compiler.
//!
//! The `sasspipe-mockc` binary speaks the real framed protocol on its stdin
//! and stdout (varint length prefixes, protocol-buffer payloads, host
//! import callbacks) but replaces Dart Sass with the tiny evaluator in
//! [`css`]. It exists so the host can be exercised end to end, process
//! boundary included, without a Dart Sass installation.
//!
//! A few magic directives in the source text drive failure-path tests:
//!
//! - `@mock-exit`: exit cleanly without answering (EOF mid-compile)
//! - `@mock-hang`: never answer this compilation, keep serving others
//! - `@mock-ignore-eof`: never answer and outlive EOF on stdin
//! - `@mock-bogus-id`: answer with a compilation id that was never issued
//! - `@mock-protocol-error`: report a fatal protocol error

pub mod css;

use std::collections::VecDeque;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;

use prost::Message as _;

use sasspipe_frame::{FrameError, FrameReader, FrameWriter, LengthPrefix};
use sasspipe_proto as proto;

/// The single JSON line `sasspipe-mockc --version` prints.
pub const VERSION_JSON: &str = r#"{"protocolVersion":"1.2.0","compilerVersion":"0.0.1","implementationVersion":"0.0.1","implementationName":"sasspipe-mockc","id":0}"#;

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A mock compiler serving one host connection.
pub struct MockCompiler<R, W> {
    frames: FrameReader<BufReader<R>>,
    out: FrameWriter<W>,
    /// Compile requests that arrived while a host callback was in flight.
    backlog: VecDeque<proto::CompileRequest>,
    next_request_id: u32,
}

impl<R: Read, W: Write> MockCompiler<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            frames: FrameReader::new(BufReader::new(input), LengthPrefix::Varint),
            out: FrameWriter::new(output, LengthPrefix::Varint),
            backlog: VecDeque::new(),
            next_request_id: 0,
        }
    }

    /// Serve compile requests until the host closes our stdin.
    pub fn run(&mut self) -> Result<(), MockError> {
        loop {
            let request = match self.next_compile_request()? {
                Some(request) => request,
                None => return Ok(()),
            };
            if !self.serve(request)? {
                return Ok(());
            }
        }
    }

    fn next_compile_request(&mut self) -> Result<Option<proto::CompileRequest>, MockError> {
        if let Some(request) = self.backlog.pop_front() {
            return Ok(Some(request));
        }
        let payload = match self.frames.read_frame() {
            Ok(payload) => payload,
            Err(FrameError::ConnectionClosed) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let message = proto::InboundMessage::decode(payload.as_ref())?;
        match message.message {
            Some(proto::inbound_message::Message::CompileRequest(request)) => Ok(Some(request)),
            other => Err(MockError::Protocol(format!(
                "expected a compile request, got {other:?}"
            ))),
        }
    }

    /// Handle one compile request. Returns `false` when the mock should
    /// exit (the `@mock-exit` directive).
    fn serve(&mut self, request: proto::CompileRequest) -> Result<bool, MockError> {
        let id = request.id;
        let (source, url, syntax) = match &request.input {
            Some(proto::compile_request::Input::String(input)) => (
                input.source.clone(),
                input.url.clone(),
                proto::Syntax::try_from(input.syntax).unwrap_or(proto::Syntax::Scss),
            ),
            _ => {
                self.respond_failure(id, "only string inputs are supported", "")?;
                return Ok(true);
            }
        };

        if source.contains("@mock-exit") {
            return Ok(false);
        }
        if source.contains("@mock-hang") {
            return Ok(true);
        }
        if source.contains("@mock-ignore-eof") {
            // A compiler that neither answers nor honors EOF on its stdin.
            std::thread::sleep(std::time::Duration::from_secs(5));
            return Ok(false);
        }
        if source.contains("@mock-bogus-id") {
            self.respond_success(id + 1000, "bogus{}", String::new())?;
            return Ok(true);
        }
        if source.contains("@mock-protocol-error") {
            self.send(proto::outbound_message::Message::Error(
                proto::ProtocolError {
                    r#type: proto::ProtocolErrorType::Internal as i32,
                    id,
                    message: "mock protocol failure".to_string(),
                },
            ))?;
            return Ok(true);
        }

        let style =
            proto::OutputStyle::try_from(request.style).unwrap_or(proto::OutputStyle::Expanded);
        let host_importer_id = request.importers.iter().find_map(|imp| match imp.importer {
            Some(proto::importer::Importer::ImporterId(id)) => Some(id),
            _ => None,
        });
        let include_paths: Vec<PathBuf> = request
            .importers
            .iter()
            .filter_map(|imp| match &imp.importer {
                Some(proto::importer::Importer::Path(path)) => Some(PathBuf::from(path)),
                _ => None,
            })
            .collect();

        let mut loader = WireLoader {
            mock: self,
            compilation_id: id,
            host_importer_id,
            include_paths,
            fatal: None,
        };
        let outcome = css::compile(&source, syntax, style, &mut loader);
        if let Some(fatal) = loader.fatal.take() {
            return Err(fatal);
        }

        match outcome {
            Ok(output) => {
                for event in &output.events {
                    if !silenced(&request, event) {
                        self.send_log_event(id, &url, event)?;
                    }
                }
                let source_map = source_map_for(&request, &source, &url);
                self.respond_success(id, &output.css, source_map)?;
            }
            Err(message) => self.respond_failure(id, &message, &url)?,
        }
        Ok(true)
    }

    fn respond_success(&mut self, id: u32, css: &str, source_map: String) -> Result<(), MockError> {
        self.send(proto::outbound_message::Message::CompileResponse(
            proto::CompileResponse {
                id,
                result: Some(proto::compile_response::Result::Success(
                    proto::CompileSuccess {
                        css: css.to_string(),
                        source_map,
                    },
                )),
            },
        ))
    }

    fn respond_failure(&mut self, id: u32, message: &str, url: &str) -> Result<(), MockError> {
        self.send(proto::outbound_message::Message::CompileResponse(
            proto::CompileResponse {
                id,
                result: Some(proto::compile_response::Result::Failure(
                    proto::CompileFailure {
                        message: message.to_string(),
                        span: Some(proto::SourceSpan {
                            url: url.to_string(),
                            ..proto::SourceSpan::default()
                        }),
                        stack_trace: String::new(),
                        formatted: String::new(),
                    },
                )),
            },
        ))
    }

    fn send_log_event(&mut self, id: u32, url: &str, event: &css::Event) -> Result<(), MockError> {
        let r#type = match event.kind {
            css::EventKind::Warning => proto::LogEventType::Warning,
            css::EventKind::Deprecation => proto::LogEventType::DeprecationWarning,
            css::EventKind::Debug => proto::LogEventType::Debug,
        };
        self.send(proto::outbound_message::Message::LogEvent(proto::LogEvent {
            compilation_id: id,
            r#type: r#type as i32,
            message: event.message.clone(),
            span: event.location.map(|(line, column)| proto::SourceSpan {
                url: url.to_string(),
                start: Some(proto::SourceLocation {
                    offset: 0,
                    line,
                    column,
                }),
                ..proto::SourceSpan::default()
            }),
            stack_trace: String::new(),
            formatted: String::new(),
            deprecation_type: event.deprecation_type.clone(),
        }))
    }

    fn send(&mut self, message: proto::outbound_message::Message) -> Result<(), MockError> {
        let wrapped = proto::OutboundMessage {
            message: Some(message),
        };
        self.out.write_frame(&wrapped.encode_to_vec())?;
        Ok(())
    }

    /// Ask the host to canonicalize an import URL. The outer error is fatal
    /// (transport); the inner one is the resolver's.
    fn canonicalize_via_host(
        &mut self,
        compilation_id: u32,
        importer_id: u32,
        url: &str,
    ) -> Result<Result<Option<String>, String>, MockError> {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.send(proto::outbound_message::Message::CanonicalizeRequest(
            proto::CanonicalizeRequest {
                id,
                compilation_id,
                importer_id,
                url: url.to_string(),
                from_import: true,
            },
        ))?;
        match self.await_inbound()? {
            proto::inbound_message::Message::CanonicalizeResponse(response)
                if response.id == id =>
            {
                Ok(match response.result {
                    Some(proto::canonicalize_response::Result::Url(url)) => Ok(Some(url)),
                    Some(proto::canonicalize_response::Result::Error(err)) => Err(err),
                    None => Ok(None),
                })
            }
            other => Err(MockError::Protocol(format!(
                "expected a canonicalize response, got {other:?}"
            ))),
        }
    }

    /// Ask the host to load a canonical URL.
    fn import_via_host(
        &mut self,
        compilation_id: u32,
        importer_id: u32,
        url: &str,
    ) -> Result<Result<(String, proto::Syntax), String>, MockError> {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.send(proto::outbound_message::Message::ImportRequest(
            proto::ImportRequest {
                id,
                compilation_id,
                importer_id,
                url: url.to_string(),
            },
        ))?;
        match self.await_inbound()? {
            proto::inbound_message::Message::ImportResponse(response) if response.id == id => {
                Ok(match response.result {
                    Some(proto::import_response::Result::Success(success)) => Ok((
                        success.contents,
                        proto::Syntax::try_from(success.syntax).unwrap_or(proto::Syntax::Scss),
                    )),
                    Some(proto::import_response::Result::Error(err)) => Err(err),
                    None => Err("import response had no result".to_string()),
                })
            }
            other => Err(MockError::Protocol(format!(
                "expected an import response, got {other:?}"
            ))),
        }
    }

    /// Read the next non-compile inbound message, parking compile requests
    /// that interleave with an outstanding callback.
    fn await_inbound(&mut self) -> Result<proto::inbound_message::Message, MockError> {
        loop {
            let payload = self.frames.read_frame()?;
            let message = proto::InboundMessage::decode(payload.as_ref())?;
            match message.message {
                Some(proto::inbound_message::Message::CompileRequest(request)) => {
                    self.backlog.push_back(request);
                }
                Some(other) => return Ok(other),
                None => return Err(MockError::Protocol("empty inbound message".to_string())),
            }
        }
    }
}

struct WireLoader<'a, R, W> {
    mock: &'a mut MockCompiler<R, W>,
    compilation_id: u32,
    host_importer_id: Option<u32>,
    include_paths: Vec<PathBuf>,
    /// Transport failure during a callback; aborts the whole mock.
    fatal: Option<MockError>,
}

impl<R: Read, W: Write> css::ImportAccess for WireLoader<'_, R, W> {
    fn resolve(&mut self, name: &str) -> Result<Option<(String, proto::Syntax)>, String> {
        if let Some(importer_id) = self.host_importer_id {
            match self
                .mock
                .canonicalize_via_host(self.compilation_id, importer_id, name)
            {
                Ok(Ok(Some(url))) => {
                    return match self.mock.import_via_host(self.compilation_id, importer_id, &url)
                    {
                        Ok(Ok((content, syntax))) => Ok(Some((content, syntax))),
                        Ok(Err(err)) => Err(err),
                        Err(fatal) => {
                            let message = fatal.to_string();
                            self.fatal = Some(fatal);
                            Err(message)
                        }
                    };
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => return Err(err),
                Err(fatal) => {
                    let message = fatal.to_string();
                    self.fatal = Some(fatal);
                    return Err(message);
                }
            }
        }
        for dir in &self.include_paths {
            for candidate in [format!("_{name}.scss"), format!("{name}.scss")] {
                if let Ok(content) = std::fs::read_to_string(dir.join(&candidate)) {
                    return Ok(Some((content, proto::Syntax::Scss)));
                }
            }
        }
        Ok(None)
    }
}

fn silenced(request: &proto::CompileRequest, event: &css::Event) -> bool {
    if event.kind != css::EventKind::Deprecation {
        return false;
    }
    if let Some(kind) = &event.deprecation_type {
        if request.silence_deprecation.contains(kind) {
            return true;
        }
    }
    request.quiet_deps && event.from_dependency
}

fn source_map_for(request: &proto::CompileRequest, source: &str, url: &str) -> String {
    if !request.source_map {
        return String::new();
    }
    let source_url = if url.is_empty() {
        "data:;charset=utf-8".to_string()
    } else {
        url.to_string()
    };
    let mut map = serde_json::json!({
        "version": 3,
        "sourceRoot": "",
        "sources": [source_url],
        "names": [],
        "mappings": "AAAA",
    });
    if request.source_map_include_sources {
        map["sourcesContent"] = serde_json::json!([source]);
    }
    map.to_string()
}
