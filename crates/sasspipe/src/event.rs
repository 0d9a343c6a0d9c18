use percent_encoding::percent_decode_str;
use sasspipe_proto as proto;

/// Kind of diagnostic the compiler emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEventKind {
    /// `@warn` or a compiler warning.
    Warning,
    /// Use of a deprecated feature.
    DeprecationWarning,
    /// `@debug`.
    Debug,
}

/// A diagnostic delivered to the log-event sink configured in
/// [`Options`](crate::Options).
///
/// Events are delivered synchronously from the reader thread and must not
/// block it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub kind: LogEventKind,
    /// `url:line:column: message` when the event carries a span, the raw
    /// message otherwise.
    pub message: String,
    /// Deprecation kind for [`LogEventKind::DeprecationWarning`] events.
    pub deprecation_type: Option<String>,
}

pub(crate) fn from_wire(event: proto::LogEvent) -> LogEvent {
    let kind = match proto::LogEventType::try_from(event.r#type) {
        Ok(proto::LogEventType::DeprecationWarning) => LogEventKind::DeprecationWarning,
        Ok(proto::LogEventType::Debug) => LogEventKind::Debug,
        _ => LogEventKind::Warning,
    };

    let message = match &event.span {
        Some(span) => {
            let url = if span.url.is_empty() { "stdin" } else { &span.url };
            // Query-style unescaping: a literal `+` is a space, then
            // percent-escapes decode.
            let url = percent_decode_str(&url.replace('+', " "))
                .decode_utf8_lossy()
                .into_owned();
            let (line, column) = span
                .start
                .as_ref()
                .map(|start| (start.line, start.column))
                .unwrap_or((0, 0));
            format!("{url}:{line}:{column}: {}", event.message)
        }
        None => event.message,
    };

    LogEvent {
        kind,
        message,
        deprecation_type: event.deprecation_type,
    }
}
