//! Message types for the embedded Sass compiler protocol.
//!
//! Hand-maintained mirror of the published `embedded_sass.proto` wire schema
//! (the 1.x protocol), limited to the messages the host actually exchanges.
//! Field numbers and oneof tags follow the published schema; the host never
//! defines wire semantics of its own here.
//!
//! Every frame on the channel carries exactly one [`InboundMessage`]
//! (host to compiler) or [`OutboundMessage`] (compiler to host).

/// Wrapper for all host-to-compiler messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InboundMessage {
    #[prost(oneof = "inbound_message::Message", tags = "2, 3, 4")]
    pub message: ::core::option::Option<inbound_message::Message>,
}

pub mod inbound_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "2")]
        CompileRequest(super::CompileRequest),
        #[prost(message, tag = "3")]
        CanonicalizeResponse(super::CanonicalizeResponse),
        #[prost(message, tag = "4")]
        ImportResponse(super::ImportResponse),
    }
}

/// Wrapper for all compiler-to-host messages.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutboundMessage {
    #[prost(oneof = "outbound_message::Message", tags = "1, 2, 3, 4, 5")]
    pub message: ::core::option::Option<outbound_message::Message>,
}

pub mod outbound_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Message {
        #[prost(message, tag = "1")]
        Error(super::ProtocolError),
        #[prost(message, tag = "2")]
        CompileResponse(super::CompileResponse),
        #[prost(message, tag = "3")]
        LogEvent(super::LogEvent),
        #[prost(message, tag = "4")]
        CanonicalizeRequest(super::CanonicalizeRequest),
        #[prost(message, tag = "5")]
        ImportRequest(super::ImportRequest),
    }
}

/// A request for the compiler to transpile one stylesheet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileRequest {
    /// Host-assigned compilation id, echoed on the response and on every
    /// callback raised during this compilation.
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(oneof = "compile_request::Input", tags = "2, 3")]
    pub input: ::core::option::Option<compile_request::Input>,
    #[prost(enumeration = "OutputStyle", tag = "4")]
    pub style: i32,
    /// Whether to generate a source map.
    #[prost(bool, tag = "5")]
    pub source_map: bool,
    /// Importers to try, in order, for URLs the compiler cannot resolve itself.
    #[prost(message, repeated, tag = "6")]
    pub importers: ::prost::alloc::vec::Vec<Importer>,
    /// Silence deprecation warnings coming from dependencies.
    #[prost(bool, tag = "11")]
    pub quiet_deps: bool,
    /// Embed the full source text in the generated source map.
    #[prost(bool, tag = "12")]
    pub source_map_include_sources: bool,
    /// Deprecation kinds whose warnings should not be emitted.
    #[prost(string, repeated, tag = "17")]
    pub silence_deprecation: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

pub mod compile_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Input {
        #[prost(message, tag = "2")]
        String(super::StringInput),
        #[prost(string, tag = "3")]
        Path(::prost::alloc::string::String),
    }
}

/// An inline stylesheet to compile.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringInput {
    #[prost(string, tag = "1")]
    pub source: ::prost::alloc::string::String,
    /// Absolute URL recorded as the source's location; may be empty.
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
    #[prost(enumeration = "Syntax", tag = "3")]
    pub syntax: i32,
}

/// How the compiler should resolve a single importer slot.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Importer {
    #[prost(oneof = "importer::Importer", tags = "1, 2")]
    pub importer: ::core::option::Option<importer::Importer>,
}

pub mod importer {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Importer {
        /// An absolute filesystem path used as a load path.
        #[prost(string, tag = "1")]
        Path(::prost::alloc::string::String),
        /// A host-registered importer; canonicalize/import requests carrying
        /// this id are routed back to the host.
        #[prost(uint32, tag = "2")]
        ImporterId(u32),
    }
}

/// The terminal response for one compilation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileResponse {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(oneof = "compile_response::Result", tags = "2, 3")]
    pub result: ::core::option::Option<compile_response::Result>,
}

pub mod compile_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "2")]
        Success(super::CompileSuccess),
        #[prost(message, tag = "3")]
        Failure(super::CompileFailure),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileSuccess {
    #[prost(string, tag = "1")]
    pub css: ::prost::alloc::string::String,
    /// Serialized source map; empty unless requested.
    #[prost(string, tag = "2")]
    pub source_map: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileFailure {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub span: ::core::option::Option<SourceSpan>,
    #[prost(string, tag = "3")]
    pub stack_trace: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub formatted: ::prost::alloc::string::String,
}

/// A section of a source file referenced by an error or log event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceSpan {
    #[prost(string, tag = "1")]
    pub text: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub start: ::core::option::Option<SourceLocation>,
    #[prost(message, optional, tag = "3")]
    pub end: ::core::option::Option<SourceLocation>,
    #[prost(string, tag = "4")]
    pub url: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub context: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceLocation {
    #[prost(uint32, tag = "1")]
    pub offset: u32,
    #[prost(uint32, tag = "2")]
    pub line: u32,
    #[prost(uint32, tag = "3")]
    pub column: u32,
}

/// A diagnostic the compiler emitted during a compilation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogEvent {
    #[prost(uint32, tag = "1")]
    pub compilation_id: u32,
    #[prost(enumeration = "LogEventType", tag = "2")]
    pub r#type: i32,
    #[prost(string, tag = "3")]
    pub message: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub span: ::core::option::Option<SourceSpan>,
    #[prost(string, tag = "5")]
    pub stack_trace: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub formatted: ::prost::alloc::string::String,
    /// Deprecation kind, set when `type` is a deprecation warning.
    #[prost(string, optional, tag = "7")]
    pub deprecation_type: ::core::option::Option<::prost::alloc::string::String>,
}

/// A compiler query asking the host to canonicalize an import URL.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CanonicalizeRequest {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(uint32, tag = "2")]
    pub compilation_id: u32,
    #[prost(uint32, tag = "3")]
    pub importer_id: u32,
    #[prost(string, tag = "4")]
    pub url: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub from_import: bool,
}

/// The host's reply to a [`CanonicalizeRequest`]. A missing result means the
/// URL was not handled and the compiler should try the next importer.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CanonicalizeResponse {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(oneof = "canonicalize_response::Result", tags = "2, 3")]
    pub result: ::core::option::Option<canonicalize_response::Result>,
}

pub mod canonicalize_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(string, tag = "2")]
        Url(::prost::alloc::string::String),
        #[prost(string, tag = "3")]
        Error(::prost::alloc::string::String),
    }
}

/// A compiler query asking the host to load a canonical URL.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportRequest {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(uint32, tag = "2")]
    pub compilation_id: u32,
    #[prost(uint32, tag = "3")]
    pub importer_id: u32,
    #[prost(string, tag = "4")]
    pub url: ::prost::alloc::string::String,
}

/// The host's reply to an [`ImportRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportResponse {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(oneof = "import_response::Result", tags = "2, 3")]
    pub result: ::core::option::Option<import_response::Result>,
}

pub mod import_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "2")]
        Success(super::ImportSuccess),
        #[prost(string, tag = "3")]
        Error(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportSuccess {
    #[prost(string, tag = "1")]
    pub contents: ::prost::alloc::string::String,
    #[prost(enumeration = "Syntax", tag = "2")]
    pub syntax: i32,
    /// Browser-accessible URL recorded in source maps; when empty the
    /// compiler generates a `data:` URL from `contents`.
    #[prost(string, tag = "3")]
    pub source_map_url: ::prost::alloc::string::String,
}

/// A fatal error in the protocol conversation itself.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtocolError {
    #[prost(enumeration = "ProtocolErrorType", tag = "1")]
    pub r#type: i32,
    #[prost(uint32, tag = "2")]
    pub id: u32,
    #[prost(string, tag = "3")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OutputStyle {
    Expanded = 0,
    Compressed = 1,
    Nested = 2,
    Compact = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Syntax {
    Scss = 0,
    Indented = 1,
    Css = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LogEventType {
    Warning = 0,
    DeprecationWarning = 1,
    Debug = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtocolErrorType {
    Parse = 0,
    Params = 1,
    Internal = 2,
}
