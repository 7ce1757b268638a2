use std::path::PathBuf;

/// Boxed error returned by a rebuild pipeline.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to start file watcher: {source}")]
    Init { source: notify::Error },

    #[error("failed to watch {path}: {source}")]
    Register {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("file watcher error: {source}")]
    Source { source: notify::Error },

    #[error("file watcher stopped delivering events")]
    EventsClosed,

    #[error("rebuild of {target} failed: {source}")]
    Pipeline {
        target: String,
        source: PipelineError,
    },

    #[error("rebuild of {target} panicked: {detail}")]
    PipelinePanicked { target: String, detail: String },
}
