use crate::watcher::{SourceWatcher, WatcherHandle};
use logship_core::{LogRecord, SourceSpec};
use logship_parsers::select_parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Expand one configured source into per-file specs
///
/// Literal paths pass through unchanged. Glob patterns expand to every
/// matching file, each with a `{name}:{basename}` derived name. Zero
/// matches is a warning, not an error; that source is simply inactive.
pub fn expand_source(source: &SourceSpec) -> Vec<SourceSpec> {
    if !source.is_glob() {
        return vec![source.clone()];
    }

    match glob::glob(&source.path) {
        Ok(entries) => {
            let mut files: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
            files.sort();
            files.dedup();

            if files.is_empty() {
                warn!(source = %source.name, pattern = %source.path, "No files matched the pattern");
            }

            files.iter().map(|file| source.for_file(file)).collect()
        }
        Err(e) => {
            warn!(source = %source.name, pattern = %source.path, error = %e, "Invalid glob pattern");
            Vec::new()
        }
    }
}

/// Expand every configured source and start one watcher per concrete file
///
/// Watchers are recorded by name. A start failure (typically a missing
/// file) is logged and that source skipped; the rest of discovery
/// continues.
pub async fn start_watchers(
    sources: &[SourceSpec],
    sender: &mpsc::Sender<LogRecord>,
) -> HashMap<String, WatcherHandle> {
    let mut registry = HashMap::new();

    for source in sources {
        for spec in expand_source(source) {
            let parser = select_parser(&spec);
            let name = spec.name.clone();
            let path = spec.path.clone();
            let watcher = SourceWatcher::new(spec, parser, sender.clone());

            match watcher.start().await {
                Ok(handle) => {
                    info!(source = %name, path = %path, "Watching file");
                    registry.insert(name, handle);
                }
                Err(e) => {
                    error!(source = %name, error = %e, "Failed to start watcher, source skipped");
                }
            }
        }
    }

    info!(count = registry.len(), "Source discovery complete");
    registry
}
