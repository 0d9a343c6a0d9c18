//! Host library for the embedded Sass compiler protocol.
//!
//! `sasspipe` drives a `dart-sass-embedded` style compiler as a long-lived
//! co-process, speaking length-prefixed protocol-buffer frames over the
//! child's standard input and output. A [`Transpiler`] multiplexes any
//! number of concurrent [`Transpiler::execute`] calls over the single pipe
//! pair, and routes the compiler's canonicalize/load callbacks back to the
//! [`ImportResolver`] supplied with each call.
//!
//! The transpiler is thread safe; the recommended way of using it is to
//! start one and share it for all the stylesheet processing needed.
//!
//! ```no_run
//! use sasspipe::{Args, Options, OutputStyle, Transpiler};
//!
//! let transpiler = Transpiler::start(Options::default())?;
//! let result = transpiler.execute(Args {
//!     source: "div { color: #ccc; }".to_string(),
//!     output_style: OutputStyle::Compressed,
//!     ..Args::default()
//! })?;
//! assert_eq!(result.css, "div{color:#ccc}");
//! transpiler.close()?;
//! # Ok::<(), sasspipe::Error>(())
//! ```

mod conn;
mod error;
mod event;
mod options;
mod registry;
mod resolver;
mod transpiler;
mod version;

pub use error::{CompileError, Error, Result, SourceLocation, SourceSpan};
pub use event::{LogEvent, LogEventKind};
pub use options::{
    parse_output_style, parse_source_syntax, Args, Options, OutputStyle, SourceSyntax,
    DEFAULT_COMPILER_FILENAME,
};
pub use resolver::{Import, ImportResolver, ResolverError};
pub use transpiler::{CompileResult, Transpiler};
pub use version::{version, CompilerVersion};
