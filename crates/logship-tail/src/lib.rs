//! logship tail
//!
//! File tailing for the logship agent: rotation-safe per-file watchers and
//! glob-based source discovery.

pub mod discovery;
pub mod watcher;

pub use discovery::{expand_source, start_watchers};
pub use watcher::{SourceWatcher, WatcherHandle};

use logship_core::LogRecord;
use tokio::sync::mpsc;

/// Default channel buffer size for records flowing to the agent
pub const DEFAULT_CHANNEL_SIZE: usize = 10_000;

/// Create the channel that carries records from watchers to the agent loop
pub fn record_channel(buffer_size: usize) -> (mpsc::Sender<LogRecord>, mpsc::Receiver<LogRecord>) {
    mpsc::channel(buffer_size)
}
