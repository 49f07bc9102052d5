//! Effective filesystem operations produced by the watcher and consumed by the
//! dispatcher.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Action tag, as carried in the dialog header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FileAction {
    Create = 0,
    Change = 1,
    Delete = 2,
    Rename = 3,
}

impl FileAction {
    pub const ALL: [FileAction; 4] = [
        FileAction::Create,
        FileAction::Change,
        FileAction::Delete,
        FileAction::Rename,
    ];

    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Create),
            1 => Some(Self::Change),
            2 => Some(Self::Delete),
            3 => Some(Self::Rename),
            _ => None,
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileAction::Create => "create",
            FileAction::Change => "change",
            FileAction::Delete => "delete",
            FileAction::Rename => "rename",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FileType {
    #[default]
    Unknown = 0,
    Regular = 1,
    Directory = 2,
}

impl FileType {
    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Unknown),
            1 => Some(Self::Regular),
            2 => Some(Self::Directory),
            _ => None,
        }
    }

    /// Probe the local filesystem. A path that no longer exists is `Unknown`.
    pub fn probe(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => FileType::Directory,
            Ok(_) => FileType::Regular,
            Err(_) => FileType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Change,
    Delete,
    Rename {
        /// New path relative to the watched root
        new_name: String,
        new_absolute_path: PathBuf,
    },
}

/// One effective change to synchronize.
///
/// `relative_path` is the subject path: for a rename it is the path before
/// the rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub file_type: FileType,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(relative_path: impl Into<String>, absolute_path: impl Into<PathBuf>, kind: OperationKind) -> Self {
        Self {
            relative_path: relative_path.into(),
            absolute_path: absolute_path.into(),
            file_type: FileType::Unknown,
            kind,
        }
    }

    pub fn create(relative_path: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path, absolute_path, OperationKind::Create)
    }

    pub fn change(relative_path: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path, absolute_path, OperationKind::Change)
    }

    pub fn delete(relative_path: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self::new(relative_path, absolute_path, OperationKind::Delete)
    }

    pub fn rename(
        relative_path: impl Into<String>,
        absolute_path: impl Into<PathBuf>,
        new_name: impl Into<String>,
        new_absolute_path: impl Into<PathBuf>,
    ) -> Self {
        Self::new(
            relative_path,
            absolute_path,
            OperationKind::Rename {
                new_name: new_name.into(),
                new_absolute_path: new_absolute_path.into(),
            },
        )
    }

    pub fn action(&self) -> FileAction {
        match self.kind {
            OperationKind::Create => FileAction::Create,
            OperationKind::Change => FileAction::Change,
            OperationKind::Delete => FileAction::Delete,
            OperationKind::Rename { .. } => FileAction::Rename,
        }
    }

    pub fn is_rename(&self) -> bool {
        matches!(self.kind, OperationKind::Rename { .. })
    }

    pub fn new_name(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::Rename { new_name, .. } => Some(new_name),
            _ => None,
        }
    }

    /// Path whose attributes describe this operation's target. After a rename
    /// the old path is gone, so the new one is probed.
    pub fn probe_path(&self) -> &Path {
        match &self.kind {
            OperationKind::Rename {
                new_absolute_path, ..
            } => new_absolute_path,
            _ => &self.absolute_path,
        }
    }
}

/// Express `path` relative to `root` as a '/'-separated string.
///
/// Returns `None` for the root itself and for paths outside it.
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
