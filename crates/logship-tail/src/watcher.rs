use logship_core::{LineParser, LogRecord, SourceSpec, TailError};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Fallback poll cadence; covers filesystem events the watcher misses,
/// e.g. modifications to a rotated-in file the stale inode watch no longer
/// reports.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Follows one concrete log file and feeds parsed records into the agent
/// channel
///
/// Lifecycle: built with `new`, running after `start` succeeds, done after
/// `WatcherHandle::stop`. A missing file at start is an error returned to
/// the caller; there is no retry here.
pub struct SourceWatcher {
    spec: SourceSpec,
    parser: Box<dyn LineParser>,
    sender: mpsc::Sender<LogRecord>,
}

impl SourceWatcher {
    pub fn new(
        spec: SourceSpec,
        parser: Box<dyn LineParser>,
        sender: mpsc::Sender<LogRecord>,
    ) -> Self {
        Self {
            spec,
            parser,
            sender,
        }
    }

    /// Begin following the file
    ///
    /// Starts from end-of-file unless the source asks for
    /// `from_beginning`. Follows across truncation and rotation: a shrunken
    /// file or a changed inode restarts reading at offset zero of whatever
    /// now lives at the path.
    pub async fn start(self) -> Result<WatcherHandle, TailError> {
        let path = PathBuf::from(&self.spec.path);

        if tokio::fs::metadata(&path).await.is_err() {
            return Err(TailError::NotFound(self.spec.path.clone()));
        }

        let mut state = FileState::new(&path, !self.spec.from_beginning).await?;

        // Bridge sync notify callbacks into the async loop
        let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(100);
        let mut fs_watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| TailError::Watch(format!("Failed to create file watcher: {}", e)))?;

        fs_watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| TailError::Watch(format!("Failed to watch {:?}: {}", path, e)))?;

        // Watch the parent directory too, to catch rotation
        if let Some(parent) = path.parent() {
            let _ = fs_watcher.watch(parent, RecursiveMode::NonRecursive);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let name = self.spec.name.clone();
        let spec = self.spec;
        let parser = self.parser;
        let sender = self.sender;

        let task = tokio::spawn(async move {
            // Keep the watch registrations alive for the task's lifetime
            let _fs_watcher = fs_watcher;

            let mut poll = tokio::time::interval(POLL_INTERVAL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let should_read = tokio::select! {
                    _ = stop_rx.changed() => break,
                    maybe_event = event_rx.recv() => match maybe_event {
                        Some(Ok(event)) => event.paths.iter().any(|p| paths_match(p, &path)),
                        Some(Err(e)) => {
                            warn!(source = %spec.name, error = %e, "File watch error");
                            false
                        }
                        None => break,
                    },
                    _ = poll.tick() => true,
                };

                if !should_read {
                    continue;
                }

                match read_new_lines(&path, &mut state, parser.as_ref(), &spec, &sender).await {
                    Ok(_) => {}
                    Err(TailError::ChannelClosed) => break,
                    Err(e) => {
                        error!(source = %spec.name, error = %e, "Error reading file");
                    }
                }
            }

            debug!(source = %spec.name, "Watcher stopped");
        });

        Ok(WatcherHandle {
            name,
            stop_tx,
            task,
        })
    }
}

/// Handle to a running watcher; stopping it consumes the handle
#[derive(Debug)]
pub struct WatcherHandle {
    name: String,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the watcher and wait for its task to finish
    ///
    /// Once this returns, no further record is emitted for this source,
    /// even if more lines were appended before the handle was released.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}

/// Check if two paths refer to the same file (handles symlinks and
/// normalization)
fn paths_match(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a.file_name() == b.file_name(),
    }
}

/// Tracks the read position of a watched file
struct FileState {
    /// Byte offset of the next unread line
    position: u64,
    /// Inode, for rotation detection on Unix
    #[cfg(unix)]
    inode: Option<u64>,
}

impl FileState {
    async fn new(path: &Path, tail: bool) -> Result<Self, TailError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| TailError::Read(format!("Failed to stat {:?}: {}", path, e)))?;

        let position = if tail { metadata.len() } else { 0 };

        #[cfg(unix)]
        let inode = {
            use std::os::unix::fs::MetadataExt;
            Some(metadata.ino())
        };

        Ok(Self {
            position,
            #[cfg(unix)]
            inode,
        })
    }

    /// Detect file replacement by inode change; resets the position
    #[cfg(unix)]
    async fn check_rotation(&mut self, path: &Path) -> Result<bool, TailError> {
        use std::os::unix::fs::MetadataExt;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| TailError::Read(format!("Failed to stat {:?}: {}", path, e)))?;

        let current = metadata.ino();
        if let Some(previous) = self.inode {
            if current != previous {
                self.inode = Some(current);
                self.position = 0;
                return Ok(true);
            }
        }
        Ok(false)
    }

    #[cfg(not(unix))]
    async fn check_rotation(&mut self, _path: &Path) -> Result<bool, TailError> {
        // Without inodes, replacement shows up as truncation below
        Ok(false)
    }
}

/// Read every complete new line from the file, parse it, and forward the
/// records
///
/// A parse miss is a per-line warning, never an error. A partial trailing
/// line (no newline yet) is left for the next read.
async fn read_new_lines(
    path: &Path,
    state: &mut FileState,
    parser: &dyn LineParser,
    spec: &SourceSpec,
    sender: &mpsc::Sender<LogRecord>,
) -> Result<usize, TailError> {
    // A missing file usually means rotation in progress; wait for the next
    // event or tick
    if tokio::fs::metadata(path).await.is_err() {
        return Ok(0);
    }

    if state.check_rotation(path).await? {
        debug!(path = %path.display(), "File rotation detected, reading from start");
    }

    let file = File::open(path)
        .await
        .map_err(|e| TailError::Read(format!("Failed to open {:?}: {}", path, e)))?;

    let metadata = file
        .metadata()
        .await
        .map_err(|e| TailError::Read(format!("Failed to stat {:?}: {}", path, e)))?;

    if metadata.len() < state.position {
        debug!(path = %path.display(), "File truncated, reading from start");
        state.position = 0;
    }

    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(state.position))
        .await
        .map_err(|e| TailError::Read(format!("Failed to seek in {:?}: {}", path, e)))?;

    let mut line = String::new();
    let mut forwarded = 0;

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TailError::Read(format!("Failed to read {:?}: {}", path, e)))?;

        if bytes_read == 0 {
            break;
        }
        if !line.ends_with('\n') {
            // Incomplete line; do not advance past it
            break;
        }

        state.position += bytes_read as u64;

        let content = line.trim_end();
        if content.trim().is_empty() {
            continue;
        }

        match parser.parse(content, spec) {
            Some(record) => {
                if sender.send(record).await.is_err() {
                    warn!(source = %spec.name, "Channel closed, stopping file reader");
                    return Err(TailError::ChannelClosed);
                }
                forwarded += 1;
            }
            None => {
                warn!(source = %spec.name, "Line not parseable, dropped");
            }
        }
    }

    if forwarded > 0 {
        debug!(path = %path.display(), records = forwarded, "Forwarded records");
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship_parsers::select_parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn plain_spec(path: &Path) -> SourceSpec {
        SourceSpec {
            name: "test".to_string(),
            path: path.to_string_lossy().to_string(),
            format: None,
            pattern: None,
            labels: None,
            from_beginning: true,
        }
    }

    async fn drain(receiver: &mut mpsc::Receiver<LogRecord>) -> Vec<LogRecord> {
        let mut records = Vec::new();
        while let Ok(record) = receiver.try_recv() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_tail_mode_starts_at_end() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "existing line").unwrap();
        file.flush().unwrap();

        let state = FileState::new(file.path(), true).await.unwrap();
        assert_eq!(state.position, std::fs::metadata(file.path()).unwrap().len());

        let state = FileState::new(file.path(), false).await.unwrap();
        assert_eq!(state.position, 0);
    }

    #[tokio::test]
    async fn test_read_new_lines_skips_blanks_and_parses() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "first line").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();
        writeln!(file, "second line").unwrap();
        file.flush().unwrap();

        let spec = plain_spec(file.path());
        let parser = select_parser(&spec);
        let mut state = FileState::new(file.path(), false).await.unwrap();
        let (sender, mut receiver) = mpsc::channel(16);

        let forwarded = read_new_lines(file.path(), &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        assert_eq!(forwarded, 2);

        let records = drain(&mut receiver).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "first line");
        assert_eq!(records[1].message, "second line");
        assert_eq!(records[0].source, "test");
    }

    #[tokio::test]
    async fn test_partial_line_waits_for_newline() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "complete\npartial").unwrap();
        file.flush().unwrap();

        let spec = plain_spec(file.path());
        let parser = select_parser(&spec);
        let mut state = FileState::new(file.path(), false).await.unwrap();
        let (sender, mut receiver) = mpsc::channel(16);

        read_new_lines(file.path(), &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        let records = drain(&mut receiver).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "complete");

        // Completing the line emits it on the next read
        writeln!(file, " now done").unwrap();
        file.flush().unwrap();

        read_new_lines(file.path(), &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        let records = drain(&mut receiver).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "partial now done");
    }

    #[tokio::test]
    async fn test_truncation_resets_position() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a longer original line").unwrap();
        file.flush().unwrap();

        let spec = plain_spec(file.path());
        let parser = select_parser(&spec);
        let mut state = FileState::new(file.path(), false).await.unwrap();
        let (sender, mut receiver) = mpsc::channel(16);

        read_new_lines(file.path(), &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        drain(&mut receiver).await;

        // Truncate and write something shorter
        let handle = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.path())
            .unwrap();
        drop(handle);
        std::fs::write(file.path(), "fresh\n").unwrap();

        read_new_lines(file.path(), &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        let records = drain(&mut receiver).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "fresh");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rotation_by_inode_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old content line\n").unwrap();

        let spec = plain_spec(&path);
        let parser = select_parser(&spec);
        let mut state = FileState::new(&path, false).await.unwrap();
        let (sender, mut receiver) = mpsc::channel(16);

        read_new_lines(&path, &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        drain(&mut receiver).await;

        // Rotate: move the file away and create a new one at the same path
        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        std::fs::write(&path, "new file line\n").unwrap();

        read_new_lines(&path, &mut state, parser.as_ref(), &spec, &sender)
            .await
            .unwrap();
        let records = drain(&mut receiver).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "new file line");
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let spec = plain_spec(&dir.path().join("absent.log"));
        let parser = select_parser(&spec);
        let (sender, _receiver) = mpsc::channel(16);

        let watcher = SourceWatcher::new(spec, parser, sender);
        let err = watcher.start().await.unwrap_err();
        assert!(matches!(err, TailError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_watcher_emits_then_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let spec = plain_spec(&path);
        let parser = select_parser(&spec);
        let (sender, mut receiver) = mpsc::channel(64);

        let handle = SourceWatcher::new(spec, parser, sender)
            .start()
            .await
            .unwrap();

        // from_beginning: both existing lines arrive via the first poll
        let first = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("timed out waiting for first record")
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("timed out waiting for second record")
            .unwrap();
        assert_eq!(first.message, "line one");
        assert_eq!(second.message, "line two");

        handle.stop().await;

        // Lines appended after stop are never emitted
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap();
        writeln!(file, "after stop").unwrap();
        file.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(receiver.try_recv().is_err());
    }
}
