use crate::options::SourceSyntax;

/// Error type resolvers may return; the text is relayed to the compiler,
/// which usually surfaces it as a compile failure.
pub type ResolverError = Box<dyn std::error::Error + Send + Sync>;

/// A stylesheet loaded by an [`ImportResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Import {
    pub content: String,
    pub source_syntax: SourceSyntax,
}

/// Custom resolution for `@use`/`@import` URLs.
///
/// When a resolver is attached to a compile request, the compiler calls back
/// into the host for every URL it cannot resolve itself: first
/// [`canonicalize`](ImportResolver::canonicalize), then
/// [`load`](ImportResolver::load) on the canonical URL. Both callbacks are
/// invoked from the reader thread, so they should not block for long.
///
/// Implementations must guarantee that the same canonical URL refers to the
/// same stylesheet for the life of the process.
pub trait ImportResolver: Send + Sync {
    /// Returns the canonical form of `url`, including a scheme (e.g.
    /// `file://foo/bar.scss`), or `None` to let the compiler try the next
    /// importer.
    fn canonicalize(&self, url: &str) -> std::result::Result<Option<String>, ResolverError>;

    /// Loads the content of a canonical URL previously produced by
    /// [`canonicalize`](ImportResolver::canonicalize).
    fn load(&self, canonical_url: &str) -> std::result::Result<Import, ResolverError>;
}
