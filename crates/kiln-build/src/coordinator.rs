use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_core::settings::append_additional_packages;
use kiln_core::{BuildMode, BuildSettings, FunctionSpec, StackSection, TagValues};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::{ContextAssembler, ContextError};
use crate::docker::{self, DockerError};
use crate::executor::{DockerExecutor, RealExecutor};

/// A function ready to hand to docker.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub function: FunctionSpec,
    pub image: String,
    pub context: PathBuf,
    pub build_args: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Extra environment for the docker process.
    pub env: Vec<(String, String)>,
}

/// Result of building one function in a round.
#[derive(Debug)]
pub enum BuildOutcome {
    Built {
        function: String,
        image: String,
        elapsed: Duration,
    },
    Failed {
        function: String,
        error: BuildError,
    },
}

impl BuildOutcome {
    pub fn function(&self) -> &str {
        match self {
            Self::Built { function, .. } | Self::Failed { function, .. } => function,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Renders failed outcomes as one bullet per function, or `None` when every
/// build succeeded.
pub fn summarize_failures(outcomes: &[BuildOutcome]) -> Option<String> {
    let mut summary = String::from("Errors received during build:\n");
    let mut failed = false;
    for outcome in outcomes {
        if let BuildOutcome::Failed { error, .. } = outcome {
            failed = true;
            summary.push_str(&format!("- {error}\n"));
        }
    }
    failed.then_some(summary)
}

/// Runs build rounds: a bounded pool of workers pulling functions from a
/// shared queue, each failure isolated to its own outcome.
pub struct BuildCoordinator<E: DockerExecutor = RealExecutor> {
    shared: Arc<Shared<E>>,
}

struct Shared<E> {
    executor: Arc<E>,
    assembler: ContextAssembler,
    settings: BuildSettings,
    stack: StackSection,
    tag_values: TagValues,
    cancel: CancellationToken,
}

impl<E> Clone for Shared<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            assembler: self.assembler.clone(),
            settings: self.settings.clone(),
            stack: self.stack.clone(),
            tag_values: self.tag_values.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl BuildCoordinator<RealExecutor> {
    pub fn new(assembler: ContextAssembler, settings: BuildSettings) -> Self {
        Self::with_executor(RealExecutor, assembler, settings)
    }
}

impl<E: DockerExecutor> BuildCoordinator<E> {
    pub fn with_executor(executor: E, assembler: ContextAssembler, settings: BuildSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor: Arc::new(executor),
                assembler,
                settings,
                stack: StackSection::default(),
                tag_values: TagValues::default(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Stack-wide extra paths and build args merged into every function.
    pub fn with_stack(mut self, stack: StackSection) -> Self {
        Arc::make_mut(&mut self.shared).stack = stack;
        self
    }

    /// Revision and branch captured for this round's tags.
    pub fn with_tag_values(mut self, tag_values: TagValues) -> Self {
        Arc::make_mut(&mut self.shared).tag_values = tag_values;
        self
    }

    /// Once `cancel` fires, workers stop taking jobs and running docker
    /// invocations are killed. [`run`](Self::run) still waits for every
    /// worker, so no context is being written when it returns.
    ///
    /// Callers cannot get this by dropping the `run` future instead: its
    /// spawned workers would keep writing contexts after the drop.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        Arc::make_mut(&mut self.shared).cancel = cancel;
        self
    }

    pub fn executor(&self) -> &E {
        &self.shared.executor
    }

    /// Configuration checks run before any worker starts.
    pub fn validate(&self, functions: &[FunctionSpec]) -> Result<(), BuildError> {
        let assembler = &self.shared.assembler;
        for function in functions.iter().filter(|f| !f.skip_build) {
            if function.language.trim().is_empty() {
                return Err(BuildError::MissingLanguage {
                    function: function.name.clone(),
                });
            }
            let handler = assembler.handler_path(&function.handler);
            if function.handler.trim().is_empty() || !handler.exists() {
                return Err(BuildError::InvalidHandler {
                    function: function.name.clone(),
                    path: handler,
                });
            }
        }

        for extra in self.shared.settings.merged_extra_paths(&self.shared.stack.copy_extra) {
            assembler
                .scoped_path(&extra)
                .map_err(|source| BuildError::ExtraPath { source })?;
        }
        Ok(())
    }

    /// One-off docker setup that must precede a publish round.
    pub async fn prepare(&self, reset_qemu: bool) -> Result<(), BuildError> {
        let shared = &self.shared;
        if shared.settings.mode != BuildMode::Publish || shared.settings.shrinkwrap {
            return Ok(());
        }
        let cwd = shared.assembler.project_dir();

        if reset_qemu {
            shared
                .executor
                .run(&docker::reset_qemu_command(), cwd, &[], false)
                .await
                .map_err(|source| BuildError::Setup { source })?;
            println!("Ran qemu-user-static --reset. OK.");
        }

        shared
            .executor
            .run(&docker::buildx_create_command(), cwd, &[], false)
            .await
            .map_err(|source| BuildError::Setup { source })?;
        println!("Created buildx node: \"multiarch\"");
        Ok(())
    }

    /// Builds every non-skipped function with exactly `parallel` workers.
    ///
    /// Outcomes arrive in completion order. A failed function never stops
    /// the round; only cancellation does.
    pub async fn run(&self, functions: Vec<FunctionSpec>, parallel: NonZeroUsize) -> Vec<BuildOutcome> {
        let started = Instant::now();

        let (job_tx, job_rx) = mpsc::channel::<FunctionSpec>(1);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for index in 0..parallel.get() {
            let shared = Arc::clone(&self.shared);
            let jobs = Arc::clone(&job_rx);
            let outcomes = outcome_tx.clone();
            workers.spawn(worker(index, shared, jobs, outcomes));
        }
        drop(job_rx);
        drop(outcome_tx);

        for function in functions {
            if self.shared.cancel.is_cancelled() {
                break;
            }
            if function.skip_build {
                info!(function = %function.name, "skipping build");
                continue;
            }
            if job_tx.send(function).await.is_err() {
                if !self.shared.cancel.is_cancelled() {
                    error!("build workers exited before the queue was drained");
                }
                break;
            }
        }
        drop(job_tx);

        while let Some(joined) = workers.join_next().await {
            // arch-lint: allow(no-error-swallowing) reason="workers hold no outcomes of their own; every built function was already reported"
            if let Err(e) = joined {
                error!(error = %e, "build worker terminated abnormally");
            }
        }

        let mut outcomes = Vec::new();
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }

        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            built = outcomes.iter().filter(|o| !o.is_failure()).count(),
            failed = outcomes.iter().filter(|o| o.is_failure()).count(),
            "total build time"
        );
        outcomes
    }
}

async fn worker<E: DockerExecutor>(
    index: usize,
    shared: Arc<Shared<E>>,
    jobs: Arc<Mutex<mpsc::Receiver<FunctionSpec>>>,
    outcomes: mpsc::UnboundedSender<BuildOutcome>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => None,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(function) = next else {
            break;
        };

        let name = function.name.clone();
        let started = Instant::now();
        info!(worker = index, function = %name, "> building");

        // Panics surface as this function's outcome.
        let result = match tokio::spawn(Arc::clone(&shared).build(function)).await {
            Ok(result) => result,
            Err(e) => Err(BuildError::Panicked {
                function: name.clone(),
                detail: e.to_string(),
            }),
        };

        let elapsed = started.elapsed();
        info!(
            worker = index,
            function = %name,
            elapsed_secs = elapsed.as_secs_f64(),
            "< done"
        );

        let outcome = match result {
            Ok(image) => BuildOutcome::Built {
                function: name,
                image,
                elapsed,
            },
            Err(error) => {
                warn!(worker = index, function = %name, error = %error, "build failed");
                BuildOutcome::Failed {
                    function: name,
                    error,
                }
            }
        };
        if outcomes.send(outcome).is_err() {
            error!(worker = index, "outcome channel closed; stopping worker");
            break;
        }
    }
    info!(worker = index, "worker done");
}

impl<E: DockerExecutor> Shared<E> {
    async fn build(self: Arc<Self>, function: FunctionSpec) -> Result<String, BuildError> {
        let job = self.plan(function).await?;
        let name = job.function.name.as_str();

        if self.settings.shrinkwrap {
            println!("{name} shrink-wrapped to {}", job.context.display());
            return Ok(job.image);
        }

        let args = docker::build_command(&job.image, &job.build_args, &job.labels, &self.settings);
        println!(
            "Building: {} with {} template. Please wait..",
            job.image, job.function.language
        );
        let result = tokio::select! {
            result = self.executor.run(&args, &job.context, &job.env, !self.settings.quiet) => result,
            _ = self.cancel.cancelled() => {
                return Err(BuildError::Cancelled {
                    function: name.to_owned(),
                });
            }
        };
        result.map_err(|source| BuildError::Docker {
            function: name.to_owned(),
            source,
        })?;
        println!("Image: {} built.", job.image);
        Ok(job.image)
    }

    /// Merges settings, resolves the tag and assembles the context.
    async fn plan(self: &Arc<Self>, function: FunctionSpec) -> Result<BuildJob, BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled {
                function: function.name,
            });
        }
        let mut build_args = self
            .settings
            .merged_build_args(&self.stack.build_args, &function);
        let labels = self.settings.merged_build_labels(&function);
        let extra_paths = self.settings.merged_extra_paths(&self.stack.copy_extra);
        let build_options = self.settings.merged_build_options(&function);
        let image = self
            .tag_values
            .resolve(self.settings.tag_format, &function.image);

        let shared = Arc::clone(self);
        let (name, handler, language) = (
            function.name.clone(),
            function.handler.clone(),
            function.language.clone(),
        );
        let assembled = tokio::task::spawn_blocking(move || {
            let template = shared
                .assembler
                .template(&language)
                .map_err(|source| BuildError::Context {
                    function: name.clone(),
                    source,
                })?;
            // Shrink-wrapped contexts never reach docker, so options are not checked.
            let packages = if shared.settings.shrinkwrap {
                Vec::new()
            } else {
                template
                    .manifest
                    .packages_for(&language, &build_options)
                    .map_err(|source| BuildError::BuildOption {
                        function: name.clone(),
                        source,
                    })?
            };
            let context = shared
                .assembler
                .assemble_with(&template, &name, &handler, &extra_paths)
                .map_err(|source| BuildError::Context {
                    function: name.clone(),
                    source,
                })?;
            Ok::<_, BuildError>((context, packages, template.manifest.mount_ssh))
        })
        .await
        .map_err(|e| BuildError::Panicked {
            function: function.name.clone(),
            detail: e.to_string(),
        })?;
        let (context, packages, mount_ssh) = assembled?;

        append_additional_packages(&mut build_args, &packages);
        let mut env = Vec::new();
        if mount_ssh {
            env.push(("DOCKER_BUILDKIT".to_owned(), "1".to_owned()));
        }

        Ok(BuildJob {
            function,
            image,
            context,
            build_args,
            labels,
            env,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    // ── Configuration ──
    #[error("please provide a valid language for function {function}")]
    MissingLanguage { function: String },

    #[error("building {function}, {} is an invalid path", path.display())]
    InvalidHandler { function: String, path: PathBuf },

    #[error("invalid extra path: {source}")]
    ExtraPath { source: ContextError },

    #[error("docker setup failed: {source}")]
    Setup { source: DockerError },

    // ── Per function ──
    #[error("[{function}] failed to assemble build context: {source}")]
    Context {
        function: String,
        source: ContextError,
    },

    #[error("[{function}] {source}")]
    BuildOption {
        function: String,
        source: kiln_core::Error,
    },

    #[error("[{function}] {source}")]
    Docker {
        function: String,
        source: DockerError,
    },

    #[error("[{function}] build cancelled")]
    Cancelled { function: String },

    #[error("[{function}] build task panicked: {detail}")]
    Panicked { function: String, detail: String },
}
