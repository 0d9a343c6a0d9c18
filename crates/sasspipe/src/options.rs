use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sasspipe_proto as proto;

use crate::error::Error;
use crate::event::LogEvent;
use crate::resolver::ImportResolver;

/// Conventional executable name used when [`Options::filename`] is empty.
pub const DEFAULT_COMPILER_FILENAME: &str = "dart-sass-embedded";

/// Importer id telling the compiler to route canonicalize/load callbacks for
/// this compilation back to the host.
pub(crate) const HOST_IMPORTER_ID: u32 = 5679;

/// Configuration for [`Transpiler::start`](crate::Transpiler::start).
pub struct Options {
    /// Executable name or path. A bare name is looked up on `$PATH`
    /// (current-directory entries are never considered); empty means
    /// [`DEFAULT_COMPILER_FILENAME`].
    pub filename: String,

    /// Per-compile deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,

    /// Receives a copy of everything the compiler writes to stderr.
    pub stderr: Option<Box<dyn Write + Send>>,

    /// Receives compiler log events, synchronously from the reader thread.
    pub log_events: Option<Box<dyn Fn(LogEvent) + Send + Sync>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            filename: DEFAULT_COMPILER_FILENAME.to_string(),
            timeout: None,
            stderr: None,
            log_events: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("filename", &self.filename)
            .field("timeout", &self.timeout)
            .field("stderr", &self.stderr.is_some())
            .field("log_events", &self.log_events.is_some())
            .finish()
    }
}

/// CSS output style of a compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
    Compact,
    Nested,
}

impl OutputStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputStyle::Expanded => "EXPANDED",
            OutputStyle::Compressed => "COMPRESSED",
            OutputStyle::Compact => "COMPACT",
            OutputStyle::Nested => "NESTED",
        }
    }

    pub(crate) fn to_wire(self) -> proto::OutputStyle {
        match self {
            OutputStyle::Expanded => proto::OutputStyle::Expanded,
            OutputStyle::Compressed => proto::OutputStyle::Compressed,
            OutputStyle::Compact => proto::OutputStyle::Compact,
            OutputStyle::Nested => proto::OutputStyle::Nested,
        }
    }
}

impl FromStr for OutputStyle {
    type Err = Error;

    /// Case-insensitive. Unknown values are a validation error, raised
    /// before any wire interaction.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "EXPANDED" => Ok(OutputStyle::Expanded),
            "COMPRESSED" => Ok(OutputStyle::Compressed),
            "COMPACT" => Ok(OutputStyle::Compact),
            "NESTED" => Ok(OutputStyle::Nested),
            _ => Err(Error::InvalidOutputStyle(s.to_string())),
        }
    }
}

/// Syntax of the source text handed to the compiler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SourceSyntax {
    #[default]
    Scss,
    /// The whitespace-sensitive indented syntax. Accepts both `INDENTED` and
    /// `SASS` when parsed from a string.
    Indented,
    Css,
}

impl SourceSyntax {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceSyntax::Scss => "SCSS",
            SourceSyntax::Indented => "INDENTED",
            SourceSyntax::Css => "CSS",
        }
    }

    pub(crate) fn to_wire(self) -> proto::Syntax {
        match self {
            SourceSyntax::Scss => proto::Syntax::Scss,
            SourceSyntax::Indented => proto::Syntax::Indented,
            SourceSyntax::Css => proto::Syntax::Css,
        }
    }
}

impl FromStr for SourceSyntax {
    type Err = Error;

    /// Case-insensitive. Unknown values are a validation error, raised
    /// before any wire interaction.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_uppercase().as_str() {
            "SCSS" => Ok(SourceSyntax::Scss),
            "INDENTED" | "SASS" => Ok(SourceSyntax::Indented),
            "CSS" => Ok(SourceSyntax::Css),
            _ => Err(Error::InvalidSourceSyntax(s.to_string())),
        }
    }
}

/// Converts `s` into an [`OutputStyle`]. Case-insensitive; unknown values
/// map to the default (`EXPANDED`).
pub fn parse_output_style(s: &str) -> OutputStyle {
    s.parse().unwrap_or_default()
}

/// Converts `s` into a [`SourceSyntax`]. Case-insensitive; unknown values
/// map to the default (`SCSS`).
pub fn parse_source_syntax(s: &str) -> SourceSyntax {
    s.parse().unwrap_or_default()
}

/// Arguments to [`Transpiler::execute`](crate::Transpiler::execute).
#[derive(Clone, Default)]
pub struct Args {
    /// The input source.
    pub source: String,

    /// Defaults to SCSS.
    pub source_syntax: SourceSyntax,

    /// Defaults to EXPANDED.
    pub output_style: OutputStyle,

    /// Absolute URL recorded as the location of `source`; may be empty.
    pub url: String,

    /// Generate a source map, returned in
    /// [`CompileResult::source_map`](crate::CompileResult).
    pub enable_source_map: bool,

    /// Embed the full source text in the source map.
    pub source_map_include_sources: bool,

    /// Custom resolver for `@use`/`@import` URLs. When present it is tried
    /// before any include path.
    pub import_resolver: Option<Arc<dyn ImportResolver>>,

    /// Filesystem roots searched for imports, in order.
    pub include_paths: Vec<PathBuf>,

    /// Deprecation kinds whose warnings should be silenced.
    pub silence_deprecations: Vec<String>,

    /// Silence deprecation warnings coming from dependencies.
    pub silence_dependency_deprecations: bool,
}

impl Args {
    /// The ordered importer descriptors for this request: the host-callback
    /// importer first when a resolver is present, then one filesystem
    /// importer per include path in caller order.
    pub(crate) fn importers(&self) -> Vec<proto::Importer> {
        let mut importers = Vec::with_capacity(
            usize::from(self.import_resolver.is_some()) + self.include_paths.len(),
        );
        if self.import_resolver.is_some() {
            importers.push(proto::Importer {
                importer: Some(proto::importer::Importer::ImporterId(HOST_IMPORTER_ID)),
            });
        }
        for path in &self.include_paths {
            importers.push(proto::Importer {
                importer: Some(proto::importer::Importer::Path(
                    clean_path(path).to_string_lossy().into_owned(),
                )),
            });
        }
        importers
    }

    /// Build the wire request for this submission, stamped with `id`.
    pub(crate) fn to_compile_request(&self, id: u32) -> proto::CompileRequest {
        proto::CompileRequest {
            id,
            input: Some(proto::compile_request::Input::String(proto::StringInput {
                source: self.source.clone(),
                url: self.url.clone(),
                syntax: self.source_syntax.to_wire() as i32,
            })),
            style: self.output_style.to_wire() as i32,
            source_map: self.enable_source_map,
            importers: self.importers(),
            quiet_deps: self.silence_dependency_deprecations,
            source_map_include_sources: self.source_map_include_sources,
            silence_deprecation: self.silence_deprecations.clone(),
        }
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("source", &self.source)
            .field("source_syntax", &self.source_syntax)
            .field("output_style", &self.output_style)
            .field("url", &self.url)
            .field("enable_source_map", &self.enable_source_map)
            .field("source_map_include_sources", &self.source_map_include_sources)
            .field("import_resolver", &self.import_resolver.is_some())
            .field("include_paths", &self.include_paths)
            .field("silence_deprecations", &self.silence_deprecations)
            .field(
                "silence_dependency_deprecations",
                &self.silence_dependency_deprecations,
            )
            .finish()
    }
}

/// Lexically cleans a path: redundant separators and `.` components are
/// removed and `..` is resolved against preceding components. Empty input
/// cleans to `.`.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => cleaned.push(prefix.as_os_str()),
            Component::RootDir => cleaned.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    cleaned.pop();
                    depth -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                depth += 1;
            }
        }
    }
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}
