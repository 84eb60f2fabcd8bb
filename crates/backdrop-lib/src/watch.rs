// SPDX-License-Identifier: MPL-2.0

//! Filesystem change events delivered through the event loop.

use crate::provider::ProviderId;
use backdrop_config::Scope;
use calloop::{LoopHandle, channel};
use eyre::Context;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// What a watched path belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// A configuration document. The parent directory is watched so that
    /// editors replacing the file are still seen.
    Document(Scope),
    /// The directory a slideshow rotates through.
    Directory(ProviderId),
}

/// Inserts a channel into the event loop and returns its sending half.
/// Watchers post `(target, event)` pairs to it from their own threads.
pub fn fs_source<T, F>(
    handle: &LoopHandle<'static, T>,
    mut on_event: F,
) -> eyre::Result<channel::SyncSender<(WatchTarget, Event)>>
where
    F: FnMut(&mut T, WatchTarget, Event) + 'static,
{
    let (notify_tx, notify_rx) = channel::sync_channel(20);
    handle
        .insert_source(
            notify_rx,
            move |e: channel::Event<(WatchTarget, Event)>, _, state| match e {
                channel::Event::Msg((target, event)) => on_event(state, target, event),
                channel::Event::Closed => {
                    tracing::debug!("filesystem watch channel closed");
                }
            },
        )
        .map_err(|err| eyre::eyre!("failed to insert watch channel into event loop: {err}"))?;

    Ok(notify_tx)
}

/// A live watch on one path.
pub struct Watch {
    target: WatchTarget,
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("target", &self.target)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Watch {
    /// Starts watching `path` without recursing into subdirectories.
    pub fn new(
        target: WatchTarget,
        path: &Path,
        tx: channel::SyncSender<(WatchTarget, Event)>,
    ) -> eyre::Result<Self> {
        let sent = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(why) = tx.send((sent.clone(), event)) {
                    tracing::debug!(?why, "dropping filesystem event");
                }
            }
            Err(why) => tracing::warn!(?why, "filesystem watch error"),
        })
        .wrap_err("failed to create filesystem watcher")?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("failed to watch {}", path.display()))?;

        tracing::debug!(?target, path = %path.display(), "watching");
        Ok(Self {
            target,
            path: path.to_path_buf(),
            _watcher: watcher,
        })
    }

    /// Whether this watch covers `path` for `target`.
    pub fn is(&self, target: &WatchTarget, path: &Path) -> bool {
        &self.target == target && self.path == path
    }
}

/// Whether `event` is about the document at `document`.
pub fn concerns(event: &Event, document: &Path) -> bool {
    !matches!(event.kind, notify::EventKind::Access(_))
        && event.paths.iter().any(|path| path == document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, ModifyKind};

    #[test]
    fn document_events_are_matched_by_path() {
        let document = Path::new("/ws/.backdrop.ron");
        let modified = Event::new(notify::EventKind::Modify(ModifyKind::Any))
            .add_path(document.to_path_buf());
        let other = Event::new(notify::EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/ws/notes.txt"));
        let read = Event::new(notify::EventKind::Access(AccessKind::Any))
            .add_path(document.to_path_buf());

        assert!(concerns(&modified, document));
        assert!(!concerns(&other, document));
        assert!(!concerns(&read, document));
    }

    #[test]
    fn watch_is_keyed_by_target_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = channel::sync_channel(1);
        let target = WatchTarget::Directory(ProviderId(1));
        let watch = Watch::new(target.clone(), dir.path(), tx).unwrap();

        assert!(watch.is(&target, dir.path()));
        assert!(!watch.is(&WatchTarget::Directory(ProviderId(2)), dir.path()));
        assert!(!watch.is(&target, &dir.path().join("other")));
    }

    #[test]
    fn events_reach_the_loop() {
        let mut event_loop: calloop::EventLoop<'static, Vec<WatchTarget>> =
            calloop::EventLoop::try_new().unwrap();
        let tx = fs_source(&event_loop.handle(), |seen: &mut Vec<WatchTarget>, target, _| {
            seen.push(target);
        })
        .unwrap();

        let target = WatchTarget::Document(Scope::Global);
        tx.send((target.clone(), Event::new(notify::EventKind::Any)))
            .unwrap();

        let mut seen = Vec::new();
        event_loop
            .dispatch(Some(std::time::Duration::from_millis(100)), &mut seen)
            .unwrap();
        assert_eq!(seen, vec![target]);
    }
}
