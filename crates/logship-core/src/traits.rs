use crate::config::SourceSpec;
use crate::error::TransportError;
use crate::record::LogRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Trait for per-line log parsers
///
/// A parser is selected once per source at discovery time and held for the
/// lifetime of that source's watcher. Returning `None` means the line is
/// not parseable by this parser; it never panics and never errors.
pub trait LineParser: Send + Sync {
    /// Returns the name of the parser (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Parse one line from the given source into a record
    ///
    /// Implementations must never produce a record with an empty message;
    /// a line that cannot yield a non-empty message is discarded by
    /// returning `None`.
    fn parse(&self, line: &str, spec: &SourceSpec) -> Option<LogRecord>;
}

/// Contract with the remote collection endpoint
///
/// The transport attaches application identity to every record and performs
/// one network request per call. Any failure, transport-level or remote
/// rejection, surfaces as a single error outcome; there is no partial-batch
/// success.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a batch of records in one request
    async fn send_batch(&self, records: &[LogRecord]) -> Result<(), TransportError>;

    /// Send a liveness ping; best-effort, callers log failures and move on
    async fn send_heartbeat(&self, timestamp: DateTime<Utc>) -> Result<(), TransportError>;
}
