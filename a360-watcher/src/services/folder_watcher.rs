//! Watched output folder
//!
//! Wraps a non-recursive `notify` watcher on one directory and reports every path that
//! was created in it or moved into it. The callback runs on the notify backend thread and
//! must hand work off rather than process inline.

use crate::error::WatchError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths worth ingesting from one notify event
///
/// Creates report every path. Renames report the destination: `To` on inotify and
/// Windows, `Any` on FSEvents. inotify also reports `Both` for a rename whose source is in
/// the same folder; that event is skipped because its `To` half arrives separately.
pub fn ingest_candidates(event: &Event) -> Vec<PathBuf> {
    match &event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.first().cloned().into_iter().collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
            event.paths.iter().filter(|p| p.exists()).cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Keeps the OS watch registered; dropping it stops delivery
pub struct FolderWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl FolderWatcher {
    /// Start watching `dir`; `on_file` is invoked for each candidate path
    pub fn start<F>(dir: &Path, on_file: F) -> Result<Self, WatchError>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        if !dir.is_dir() {
            return Err(WatchError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in ingest_candidates(&event) {
                    on_file(path);
                }
            }
            Err(e) => warn!("Filesystem watcher error: {}", e),
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "Watching output folder");

        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
