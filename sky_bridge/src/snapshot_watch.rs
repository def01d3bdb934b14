use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches the snapshot file for rewrites.
///
/// The parent directory is watched so the file may be replaced rather than edited in place.
pub struct SnapshotWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    target: PathBuf,
}

impl SnapshotWatcher {
    pub fn new(path: &Path) -> notify::Result<Self> {
        let target = normalize_path(path);
        let directory = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let (tx, rx) = unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(
            target: "sky_bridge::snapshot",
            path = %target.display(),
            "snapshot.watching"
        );
        Ok(Self {
            _watcher: watcher,
            rx,
            target,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Drain pending events; true when the snapshot file changed since the last call.
    pub fn drain_changed(&self) -> bool {
        let mut changed = false;
        for event in self.rx.try_iter() {
            match event {
                Ok(event) => {
                    if is_relevant(&event.kind)
                        && event
                            .paths
                            .iter()
                            .any(|path| normalize_path(path) == self.target)
                    {
                        changed = true;
                    }
                }
                Err(err) => {
                    tracing::warn!(target: "sky_bridge::snapshot", error = %err, "snapshot.watch_error");
                }
            }
        }
        changed
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
    )
}

fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    if let Ok(canonical) = fs::canonicalize(&absolute) {
        return canonical;
    }
    let rebuilt = absolute
        .parent()
        .zip(absolute.file_name())
        .and_then(|(parent, name)| fs::canonicalize(parent).ok().map(|parent| parent.join(name)));
    rebuilt.unwrap_or(absolute)
}
