//! Filesystem watcher feeding the event channel.
//!
//! On start the whole tree is enumerated once (directories as Create, files
//! as Change) so the mirror catches up, then live notifications follow.

use crate::error::{Result, SyncError};
use crate::operation::{relative_path, Operation};
use crate::watch::EventChannel;
use ignore::WalkBuilder;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct DirectoryMonitor {
    root: PathBuf,
    channel: Arc<EventChannel>,
    watcher: Option<RecommendedWatcher>,
}

impl DirectoryMonitor {
    pub fn new(root: &Path, channel: Arc<EventChannel>) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(SyncError::io_at("open watch root", root))?;
        Ok(Self {
            root,
            channel,
            watcher: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start live watching, then enumerate the existing tree.
    ///
    /// The watcher goes first so nothing modified during enumeration is
    /// missed; duplicates collapse in the channel. The walk runs on the
    /// blocking pool. Returns the number of enumerated entries.
    pub async fn start(&mut self) -> Result<usize> {
        let root = self.root.clone();
        let channel = self.channel.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for op in operations_for_event(&root, &event) {
                    tracing::debug!("Event {} for {}", op.action(), op.relative_path);
                    channel.submit(op);
                }
            }
            Err(e) => tracing::error!("Watch error: {}", e),
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);

        let root = self.root.clone();
        let channel = self.channel.clone();
        let count = tokio::task::spawn_blocking(move || enumerate_tree(&root, &channel)).await??;
        tracing::info!(
            "Watching {} ({} existing entries queued)",
            self.root.display(),
            count
        );
        Ok(count)
    }

    /// Queue every directory as Create and every file as Change.
    pub fn enumerate(&self) -> Result<usize> {
        enumerate_tree(&self.root, &self.channel)
    }

    /// Stop live notifications. Already buffered events stay in the channel.
    pub fn stop(&mut self) {
        if self.watcher.take().is_some() {
            tracing::debug!("Stopped watching {}", self.root.display());
        }
    }
}

fn enumerate_tree(root: &Path, channel: &EventChannel) -> Result<usize> {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut count = 0;
    for entry in walker {
        let entry = entry.map_err(|e| SyncError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        let Some(rel) = relative_path(root, entry.path()) else {
            continue;
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let abs = entry.path().to_path_buf();
        let op = if file_type.is_dir() {
            Operation::create(rel, abs)
        } else if file_type.is_file() {
            Operation::change(rel, abs)
        } else {
            continue;
        };
        channel.submit(op);
        count += 1;
    }
    Ok(count)
}

/// Translate one native notification into operations under `root`.
pub fn operations_for_event(root: &Path, event: &Event) -> Vec<Operation> {
    let single = |make: fn(String, PathBuf) -> Operation| -> Vec<Operation> {
        event
            .paths
            .iter()
            .filter_map(|p| relative_path(root, p).map(|rel| make(rel, p.clone())))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => single(|rel, abs| Operation::create(rel, abs)),
        EventKind::Remove(_) => single(|rel, abs| Operation::delete(rel, abs)),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let [old, new] = event.paths.as_slice() else {
                return Vec::new();
            };
            match (relative_path(root, old), relative_path(root, new)) {
                (Some(old_rel), Some(new_rel)) => {
                    vec![Operation::rename(old_rel, old.clone(), new_rel, new.clone())]
                }
                // Moved in from outside the tree
                (None, Some(new_rel)) => vec![Operation::create(new_rel, new.clone())],
                // Moved out of the tree
                (Some(old_rel), None) => vec![Operation::delete(old_rel, old.clone())],
                (None, None) => Vec::new(),
            }
        }
        // The paired Both event carries the rename
        EventKind::Modify(ModifyKind::Name(RenameMode::From))
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter_map(|p| {
                let rel = relative_path(root, p)?;
                Some(if p.exists() {
                    Operation::change(rel, p.clone())
                } else {
                    Operation::delete(rel, p.clone())
                })
            })
            .collect(),
        EventKind::Modify(_) => single(|rel, abs| Operation::change(rel, abs)),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FileAction;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_event_mapping() {
        let root = Path::new("/w");

        let ops = operations_for_event(root, &event(EventKind::Create(CreateKind::File), &["/w/a"]));
        assert_eq!(ops[0].action(), FileAction::Create);

        let ops = operations_for_event(
            root,
            &event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/w/a"]),
        );
        assert_eq!(ops[0].action(), FileAction::Change);

        let ops = operations_for_event(root, &event(EventKind::Remove(RemoveKind::File), &["/w/a"]));
        assert_eq!(ops[0].action(), FileAction::Delete);

        let ops = operations_for_event(
            root,
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/w/a", "/w/b"]),
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].relative_path, "a");
        assert_eq!(ops[0].new_name(), Some("b"));

        let ops = operations_for_event(
            root,
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/w/a"]),
        );
        assert!(ops.is_empty());
    }

    #[test]
    fn test_events_outside_root_ignored() {
        let root = Path::new("/w");
        let ops = operations_for_event(
            root,
            &event(EventKind::Create(CreateKind::File), &["/elsewhere/a", "/w"]),
        );
        assert!(ops.is_empty());
    }

    #[test]
    fn test_rename_into_tree_is_create() {
        let root = Path::new("/w");
        let ops = operations_for_event(
            root,
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/tmp/x", "/w/x"]),
        );
        assert_eq!(ops[0].action(), FileAction::Create);
        assert_eq!(ops[0].relative_path, "x");
    }

    #[test]
    fn test_enumerate_dirs_as_create_files_as_change() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub/empty")).unwrap();
        fs::write(tmp.path().join("sub/a.txt"), "a").unwrap();
        fs::write(tmp.path().join("top.txt"), "t").unwrap();

        let channel = Arc::new(EventChannel::new());
        let monitor = DirectoryMonitor::new(tmp.path(), channel.clone()).unwrap();
        assert_eq!(monitor.enumerate().unwrap(), 4);

        let mut ops: Vec<_> = channel
            .snapshot()
            .map(|op| {
                let action = op.action();
                (op.relative_path, action)
            })
            .collect();
        ops.sort();
        assert_eq!(
            ops,
            vec![
                ("sub".to_string(), FileAction::Create),
                ("sub/a.txt".to_string(), FileAction::Change),
                ("sub/empty".to_string(), FileAction::Create),
                ("top.txt".to_string(), FileAction::Change),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_enumerates_existing_tree() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nested/deeper")).unwrap();
        fs::write(tmp.path().join("nested/deeper/leaf.txt"), "leaf").unwrap();

        let channel = Arc::new(EventChannel::new());
        let mut monitor = DirectoryMonitor::new(tmp.path(), channel.clone()).unwrap();
        assert_eq!(monitor.start().await.unwrap(), 3);
        monitor.stop();

        let paths: Vec<_> = channel.snapshot().map(|op| op.relative_path).collect();
        assert!(paths.contains(&"nested/deeper/leaf.txt".to_string()));
    }
}
