//! Debounced rebuild loop.
//!
//! ```text
//!            event               timer fires
//!   Idle ───────────▶ Debouncing ───────────▶ Building
//!    ▲                  ▲    │ event (re-arm)    │
//!    │                  └────┘                   │ event
//!    └───────────── session finished ◀───────────┘
//! ```
//!
//! When the timer fires the active session is cancelled without waiting for
//! it. The next session's task awaits its predecessor before calling the
//! pipeline, so two sessions never run the pipeline at once.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, WatchError};
use crate::event::{WatchEvent, WatchOp};
use crate::filter::IgnorePolicy;
use crate::source::EventSource;
use crate::target::{HandlerIndex, Target};

/// Quiet period after the last change before a rebuild starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Handed to the pipeline for each rebuild.
///
/// The pipeline is expected to return promptly once `cancel` fires.
#[derive(Debug, Clone)]
pub struct RebuildContext {
    pub target: Target,
    pub cancel: CancellationToken,
}

impl RebuildContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerState {
    Idle,
    Building,
    Debouncing,
}

type SessionHandle = JoinHandle<Result<(), PipelineError>>;

struct RebuildSession {
    id: u64,
    target: Target,
    cancel: CancellationToken,
    started: Instant,
    handle: SessionHandle,
}

impl RebuildSession {
    /// Cancels a still-running session and returns its task for the
    /// successor to await. A session that already finished is settled here.
    async fn supersede(mut self) -> Result<Option<SessionHandle>, WatchError> {
        if self.handle.is_finished() {
            let joined = (&mut self.handle).await;
            self.settle(joined)?;
            return Ok(None);
        }
        info!(session = self.id, target = %self.target, "cancelling in-flight rebuild");
        self.cancel.cancel();
        Ok(Some(self.handle))
    }

    fn settle(self, joined: Result<Result<(), PipelineError>, JoinError>) -> Result<(), WatchError> {
        match joined {
            Ok(Ok(())) => {
                info!(
                    session = self.id,
                    target = %self.target,
                    elapsed_secs = self.started.elapsed().as_secs_f64(),
                    "rebuild finished"
                );
                Ok(())
            }
            Ok(Err(source)) => Err(WatchError::Pipeline {
                target: self.target.to_string(),
                source,
            }),
            Err(e) if e.is_panic() => Err(WatchError::PipelinePanicked {
                target: self.target.to_string(),
                detail: e.to_string(),
            }),
            Err(e) => {
                warn!(session = self.id, error = %e, "rebuild task aborted");
                Ok(())
            }
        }
    }

    /// Cancels the session and waits for it to wind down.
    async fn stop(self) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(Ok(())) => debug!(session = self.id, "rebuild stopped"),
            Ok(Err(e)) => warn!(session = self.id, error = %e, "rebuild failed while stopping"),
            // arch-lint: allow(no-error-swallowing) reason="shutdown proceeds whatever the stopped session did"
            Err(e) => warn!(session = self.id, error = %e, "rebuild task ended abnormally"),
        }
    }
}

/// Resolves once the active session's task exits; never without one.
async fn finished(
    session: &mut Option<RebuildSession>,
) -> Result<Result<(), PipelineError>, JoinError> {
    match session {
        Some(active) => (&mut active.handle).await,
        None => std::future::pending().await,
    }
}

/// Watches handler directories and re-runs a pipeline after each burst of
/// changes.
pub struct RebuildTrigger<S> {
    source: S,
    index: HandlerIndex,
    policy: IgnorePolicy,
    debounce: Duration,
    shutdown: CancellationToken,
    state: TriggerState,
    sessions: u64,
    watched: HashSet<PathBuf>,
}

impl<S: EventSource> RebuildTrigger<S> {
    pub fn new(source: S, index: HandlerIndex, policy: IgnorePolicy) -> Self {
        Self {
            source,
            index,
            policy,
            debounce: DEFAULT_DEBOUNCE,
            shutdown: CancellationToken::new(),
            state: TriggerState::Idle,
            sessions: 0,
            watched: HashSet::new(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Cancelling `shutdown` ends [`run`](Self::run) with `Ok(())`.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Builds everything once, then rebuilds after every debounced batch
    /// of changes until shutdown.
    ///
    /// A pipeline error or panic in the active session ends the loop, as
    /// does losing the event source.
    pub async fn run<P, Fut, E>(mut self, pipeline: P) -> Result<(), WatchError>
    where
        P: Fn(RebuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<PipelineError> + 'static,
    {
        self.register()?;

        let pipeline = Arc::new(pipeline);
        let mut session = Some(self.start(&pipeline, Target::All, None));
        let mut pending: Option<Target> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("stopping watch");
                    if let Some(active) = session.take() {
                        active.stop().await;
                    }
                    return Ok(());
                }

                joined = finished(&mut session) => {
                    if let Some(done) = session.take() {
                        done.settle(joined)?;
                    }
                    let next = if deadline.is_some() {
                        TriggerState::Debouncing
                    } else {
                        TriggerState::Idle
                    };
                    self.transition(next);
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let target = pending.take().unwrap_or(Target::All);
                    let predecessor = match session.take() {
                        Some(active) => active.supersede().await?,
                        None => None,
                    };
                    session = Some(self.start(&pipeline, target, predecessor));
                }

                event = self.source.next() => match event {
                    Some(Ok(event)) => {
                        if let Some(target) = self.observe(event) {
                            pending = Some(match pending.take() {
                                Some(batch) => batch.coalesce(target),
                                None => target,
                            });
                            deadline = Some(Instant::now() + self.debounce);
                            self.transition(TriggerState::Debouncing);
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Err(WatchError::EventsClosed),
                },
            }
        }
    }

    fn start<P, Fut, E>(
        &mut self,
        pipeline: &Arc<P>,
        target: Target,
        predecessor: Option<SessionHandle>,
    ) -> RebuildSession
    where
        P: Fn(RebuildContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<PipelineError> + 'static,
    {
        self.sessions += 1;
        let id = self.sessions;
        let cancel = self.shutdown.child_token();
        let context = RebuildContext {
            target: target.clone(),
            cancel: cancel.clone(),
        };
        let pipeline = Arc::clone(pipeline);

        let handle = tokio::spawn(async move {
            if let Some(previous) = predecessor {
                match previous.await {
                    Ok(Ok(())) => debug!(session = id, "previous rebuild stopped"),
                    Ok(Err(e)) => debug!(session = id, error = %e, "previous rebuild ended with error"),
                    // arch-lint: allow(no-error-swallowing) reason="a superseded session's fate does not affect its successor"
                    Err(e) => debug!(session = id, error = %e, "previous rebuild task ended abnormally"),
                }
            }
            if context.is_cancelled() {
                return Ok(());
            }
            (*pipeline)(context).await.map_err(Into::into)
        });

        info!(session = id, target = %target, "rebuilding");
        self.transition(TriggerState::Building);
        RebuildSession {
            id,
            target,
            cancel,
            started: Instant::now(),
            handle,
        }
    }

    /// Returns the rebuild target for a qualifying event.
    fn observe(&mut self, event: WatchEvent) -> Option<Target> {
        let is_stack_file = self.index.is_stack_file(&event.path);
        if !is_stack_file && self.policy.is_ignored(&event.path, event.is_dir) {
            debug!(path = %event.path.display(), op = ?event.op, "ignored change");
            return None;
        }

        if matches!(event.op, WatchOp::Remove | WatchOp::Rename) {
            self.forget(&event.path);
        }
        if event.adds_directory() && self.index.owns(&event.path) {
            // arch-lint: allow(no-error-swallowing) reason="the rest of the handler tree stays watched"
            if let Err(e) = self.watch_tree(&event.path) {
                warn!(path = %event.path.display(), error = %e, "unable to watch new directory");
            }
        }

        let target = self.index.resolve(&event.path);
        info!(path = %event.path.display(), op = ?event.op, target = %target, "change detected");
        Some(target)
    }

    /// Registers every handler tree and the stack file.
    fn register(&mut self) -> Result<(), WatchError> {
        let handler_dirs: Vec<PathBuf> =
            self.index.handler_dirs().map(Path::to_path_buf).collect();
        for dir in &handler_dirs {
            self.watch_tree(dir)?;
        }
        if let Some(stack_file) = self.index.stack_file().map(Path::to_path_buf) {
            self.watch(&stack_file)?;
        }
        Ok(())
    }

    fn watch_tree(&mut self, dir: &Path) -> Result<(), WatchError> {
        if self.policy.is_ignored(dir, true) {
            return Ok(());
        }
        self.watch(dir)?;

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "unable to list directory");
                return Ok(());
            }
        };
        for entry in entries {
            let (path, file_type) =
                match entry.and_then(|entry| entry.file_type().map(|t| (entry.path(), t))) {
                    Ok(pair) => pair,
                    Err(e) => {
                        debug!(path = %dir.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
            if file_type.is_dir() {
                self.watch_tree(&path)?;
            }
        }
        Ok(())
    }

    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        if self.watched.contains(path) {
            return Ok(());
        }
        self.source.watch(path)?;
        debug!(path = %path.display(), "watching");
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    /// Drops `path` and everything below it from the watch set. The OS
    /// watch went away with the directory, so a recreated one must be
    /// registered again.
    fn forget(&mut self, path: &Path) {
        let before = self.watched.len();
        self.watched.retain(|watched| !watched.starts_with(path));
        if self.watched.len() != before {
            debug!(path = %path.display(), dropped = before - self.watched.len(), "no longer watching");
        }
    }

    fn transition(&mut self, next: TriggerState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "watch state");
            self.state = next;
        }
    }
}
