use std::path::Path;

use kiln_core::BuildMode;

use super::{BuildArgs, Project, check_outcomes};

/// Flags only `publish` accepts.
#[derive(clap::Args, Debug, Clone)]
pub struct PublishArgs {
    /// Target platforms, comma separated (default: [build].platforms)
    #[arg(long)]
    pub platforms: Option<String>,
    /// Additional tag pushed alongside the resolved one, repeatable
    #[arg(long = "extra-tag")]
    pub extra_tags: Vec<String>,
    /// Register qemu binfmt handlers before building
    #[arg(long)]
    pub reset_qemu: bool,
}

/// Build multi-arch images with buildx and push them to the registry.
pub async fn publish(stack_file: &Path, args: BuildArgs, publish: PublishArgs) -> anyhow::Result<()> {
    let project = Project::load(stack_file)?;
    let mut settings = args.settings(BuildMode::Publish, project.stack())?;
    if let Some(platforms) = publish.platforms {
        settings.platforms = platforms;
    }
    settings.extra_tags = publish.extra_tags;

    let parallel = settings.parallel;
    let functions = project.stack().select(args.filter.as_deref())?;
    let coordinator = project.coordinator(settings)?;
    coordinator.validate(&functions)?;
    coordinator.prepare(publish.reset_qemu).await?;

    let outcomes = coordinator.run(functions, parallel).await;
    check_outcomes(&outcomes)
}
