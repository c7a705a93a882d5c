use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio_util::sync::CancellationToken;

use crate::error::{GtagsError, Result};
use crate::navigator::{Navigator, SaveOutcome};

/// Files written by `gtags` itself; changes to them never trigger an update.
const INDEX_FILES: &[&str] = &["GPATH", "GRTAGS", "GTAGS", "GSYMS"];

type DebounceResult = std::result::Result<Vec<DebouncedEvent>, notify::Error>;

/// Watches a tag root and reports saved source files.
pub struct TagWatcher {
    root: PathBuf,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<DebounceResult>,
}

impl TagWatcher {
    pub fn new(root: &Path, debounce: Duration) -> Result<Self> {
        let (tx, rx) = channel();

        let mut debouncer =
            new_debouncer(debounce, tx).map_err(|e| GtagsError::Watcher(e.to_string()))?;

        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| GtagsError::Watcher(e.to_string()))?;

        Ok(Self {
            root: root.to_path_buf(),
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait up to `timeout` for saved files.
    ///
    /// Returns `Ok(None)` on timeout and an error once the watcher is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<PathBuf>>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(events)) => {
                let saved = saved_files(events);
                Ok(if saved.is_empty() { None } else { Some(saved) })
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {}", e);
                Ok(None)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(GtagsError::Watcher("watcher disconnected".to_string()))
            }
        }
    }

    /// Run the save hook for every saved file until `token` is cancelled.
    pub fn run(&self, navigator: &Navigator, token: &CancellationToken) -> Result<usize> {
        let mut updated = 0;
        while !token.is_cancelled() {
            let Some(files) = self.recv_timeout(Duration::from_millis(200))? else {
                continue;
            };

            for file in files {
                match navigator.on_save(&file) {
                    Ok(SaveOutcome::Updated { .. }) => updated += 1,
                    Ok(SaveOutcome::Unsupported { installed, .. }) => {
                        // Nothing will change on later saves either.
                        return Err(GtagsError::Unsupported {
                            operation: "Incremental single file update",
                            installed,
                            required: crate::version::Version::parse(
                                crate::version::SINGLE_UPDATE_ARRIVAL,
                            )?,
                        });
                    }
                    Ok(SaveOutcome::Failed { stderr, .. }) => {
                        tracing::warn!(
                            "Error while tags updating for {}: {}",
                            file.display(),
                            stderr.trim_end()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Cannot update tags for {}: {}", file.display(), e),
                }
            }
        }
        Ok(updated)
    }
}

fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| INDEX_FILES.contains(&name))
        .unwrap_or(false)
}

fn saved_files(events: Vec<DebouncedEvent>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = events
        .into_iter()
        .map(|e| e.path)
        .filter(|path| path.is_file() && !is_index_file(path))
        .collect();
    files.sort();
    files.dedup();
    files
}
