//! Console output
//!
//! Human-readable text goes to stdout, errors to stderr. In JSON mode every
//! command prints exactly one JSON document on stdout.

mod formatter;

pub use formatter::Formatter;

/// Output settings taken from the global flags
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Print JSON instead of text
    pub json: bool,
    /// Disable colors
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}

/// Human-readable byte size
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Timestamp as shown in tables
pub fn format_timestamp(ts: jiff::Timestamp) -> String {
    ts.strftime("%Y-%m-%d %H:%M:%S").to_string()
}
