use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiln_core::BuildMode;
use kiln_watch::{HandlerIndex, IgnorePolicy, NotifySource, RebuildContext, RebuildTrigger, Target};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{BuildArgs, Project, build_round, check_outcomes, push_images};

/// Build and optionally push; with `watch`, keep rebuilding on changes until
/// interrupted.
pub async fn up(stack_file: &Path, args: BuildArgs, push: bool, watch: bool) -> anyhow::Result<()> {
    let project = Project::load(stack_file)?;
    // Surface flag errors before anything starts.
    args.settings(BuildMode::Build, project.stack())?;

    if !watch {
        return round(&project, &args, push, None).await;
    }

    let handlers = project.handlers(args.filter.as_deref())?;
    let index = HandlerIndex::new(project.dir(), handlers.iter().cloned())
        .with_stack_file(project.stack_file());

    let stack = project.stack();
    let mut policy = IgnorePolicy::new(project.dir())
        .ignore_dir(&stack.build.build_root)
        .ignore_dir(&stack.build.template_dir);
    for dir in &stack.watch.ignore {
        policy = policy.ignore_dir(dir);
    }

    let shutdown = CancellationToken::new();
    shutdown_on_signal(shutdown.clone());

    let trigger = RebuildTrigger::new(NotifySource::new()?, index, policy)
        .with_debounce(Duration::from_millis(stack.watch.debounce_ms))
        .with_shutdown(shutdown);

    println!("Watching for changes. Press Ctrl+C to stop.");
    let current = Arc::new(Mutex::new(Arc::new(project)));
    let handlers = Arc::new(handlers);
    let pipeline = move |ctx: RebuildContext| {
        let current = Arc::clone(&current);
        let handlers = Arc::clone(&handlers);
        let args = args.clone();
        async move {
            let filter = args.filter.as_deref();
            let Some(project) = refresh(&current, &ctx.target, &handlers, filter).await else {
                return Ok(());
            };
            round(&project, &args, push, Some(ctx)).await
        }
    };
    trigger.run(pipeline).await?;
    Ok(())
}

/// The project a watch round builds. Full rounds re-read the stack file so
/// edits to it take effect; `None` skips the round while it does not load.
async fn refresh(
    current: &Mutex<Arc<Project>>,
    target: &Target,
    watched: &[(String, String)],
    filter: Option<&str>,
) -> Option<Arc<Project>> {
    let mut current = current.lock().await;
    if *target != Target::All {
        return Some(Arc::clone(&current));
    }

    let project = match current.reload() {
        Ok(project) => project,
        Err(e) => {
            tracing::error!(
                stack = %current.stack_file().display(),
                error = %format!("{e:#}"),
                "stack file did not load, waiting for the next change"
            );
            return None;
        }
    };
    match project.handlers(filter) {
        Ok(handlers) if handlers != watched => tracing::warn!(
            "function handlers changed; restart `kiln up --watch` to watch the new set"
        ),
        Ok(_) => {}
        // arch-lint: allow(no-error-swallowing) reason="the round reports an unknown filter itself"
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "unable to compare watched handlers"),
    }
    *current = Arc::new(project);
    Some(Arc::clone(&current))
}

/// One build (and push) round. Under watch, `ctx` narrows the round to the
/// changed function and carries its cancellation.
async fn round(
    project: &Project,
    args: &BuildArgs,
    push: bool,
    ctx: Option<RebuildContext>,
) -> anyhow::Result<()> {
    let settings = args.settings(BuildMode::Build, project.stack())?;
    let (quiet, shrinkwrap) = (settings.quiet, settings.shrinkwrap);
    let filter = match ctx.as_ref().map(|c| &c.target) {
        Some(Target::Function(name)) => Some(name.as_str()),
        _ => args.filter.as_deref(),
    };
    let cancel = ctx.as_ref().map(|c| c.cancel.clone());

    let Some(outcomes) = build_round(project, settings, filter, cancel.clone()).await? else {
        return Ok(());
    };
    check_outcomes(&outcomes)?;

    if !push {
        return Ok(());
    }
    if shrinkwrap {
        println!("Skipping push, images were only shrink-wrapped.");
        return Ok(());
    }
    match cancel {
        Some(cancel) => tokio::select! {
            result = push_images(project.dir(), &outcomes, quiet) => result,
            _ = cancel.cancelled() => Ok(()),
        },
        None => push_images(project.dir(), &outcomes, quiet).await,
    }
}

fn shutdown_on_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "unable to listen for SIGTERM");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "unable to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
