use std::collections::VecDeque;
use std::path::Path;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::event::WatchEvent;

/// Stream of filesystem changes for the rebuild loop.
///
/// Watching is non-recursive: every directory of interest is registered
/// on its own, including ones created while the loop runs.
#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// Next change, `None` once the source can deliver no more.
    ///
    /// Must be cancel safe; the loop drops this future whenever another
    /// branch completes first.
    async fn next(&mut self) -> Option<Result<WatchEvent, WatchError>>;

    /// Registers a single directory or file with the OS watcher. Calling it
    /// again for a path that was removed and recreated watches it anew.
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// [`EventSource`] backed by the platform's native file watcher.
pub struct NotifySource {
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    pending: VecDeque<WatchEvent>,
}

impl NotifySource {
    pub fn new() -> Result<Self, WatchError> {
        let (tx, events) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if tx.send(result).is_err() {
                tracing::debug!("watch event dropped, receiver closed");
            }
        })
        .map_err(|source| WatchError::Init { source })?;

        Ok(Self {
            watcher,
            events,
            pending: VecDeque::new(),
        })
    }
}

impl EventSource for NotifySource {
    async fn next(&mut self) -> Option<Result<WatchEvent, WatchError>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            match self.events.recv().await? {
                Ok(event) => self.pending.extend(WatchEvent::from_notify(event)),
                Err(source) => return Some(Err(WatchError::Source { source })),
            }
        }
    }

    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Register {
                path: path.to_path_buf(),
                source,
            })
    }
}
