use std::path::Path;

use kiln_core::BuildMode;

use super::{BuildArgs, Project, build_round, check_outcomes};

/// Build every selected function into a local image.
pub async fn build(stack_file: &Path, args: BuildArgs) -> anyhow::Result<()> {
    let project = Project::load(stack_file)?;
    let settings = args.settings(BuildMode::Build, project.stack())?;

    let Some(outcomes) = build_round(&project, settings, args.filter.as_deref(), None).await? else {
        return Ok(());
    };
    check_outcomes(&outcomes)
}
