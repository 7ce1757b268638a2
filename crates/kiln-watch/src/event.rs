use std::path::PathBuf;

use notify::EventKind;
use notify::event::{CreateKind, ModifyKind};

/// Kinds of change that can trigger a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOp {
    Create,
    Write,
    Remove,
    Rename,
}

/// A single qualifying change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub op: WatchOp,
    /// Whether the path was a directory when the event was observed.
    pub is_dir: bool,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: WatchOp) -> Self {
        Self {
            path: path.into(),
            op,
            is_dir: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, op: WatchOp) -> Self {
        Self {
            is_dir: true,
            ..Self::new(path, op)
        }
    }

    /// Splits a notify event into one event per path.
    ///
    /// Access and metadata-only changes yield nothing.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        let Some(op) = op_for(&event.kind) else {
            return Vec::new();
        };
        let folder = matches!(event.kind, EventKind::Create(CreateKind::Folder));
        event
            .paths
            .into_iter()
            .map(|path| {
                let is_dir = folder
                    || (matches!(op, WatchOp::Create | WatchOp::Rename) && path.is_dir());
                Self { path, op, is_dir }
            })
            .collect()
    }

    /// Whether this event could have introduced a directory to watch.
    pub fn adds_directory(&self) -> bool {
        self.is_dir && matches!(self.op, WatchOp::Create | WatchOp::Rename)
    }
}

fn op_for(kind: &EventKind) -> Option<WatchOp> {
    match kind {
        EventKind::Create(_) => Some(WatchOp::Create),
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(WatchOp::Rename),
        EventKind::Modify(_) | EventKind::Any => Some(WatchOp::Write),
        EventKind::Remove(_) => Some(WatchOp::Remove),
        EventKind::Access(_) | EventKind::Other => None,
    }
}
