mod build;
mod publish;
mod up;

use std::path::{Path, PathBuf};

use anyhow::Context;
use kiln_build::{
    BuildCoordinator, BuildOutcome, ContextAssembler, DockerExecutor, GitInfo, RealExecutor,
    docker, summarize_failures,
};
use kiln_core::settings::{parse_build_args, parse_map};
use kiln_core::{BuildMode, BuildSettings, StackConfig, TagFormat, TagValues};
use tokio_util::sync::CancellationToken;

pub use build::build;
pub use publish::{PublishArgs, publish};
pub use up::up;

/// Flags shared by `build`, `publish` and `up`.
#[derive(clap::Args, Debug, Clone)]
pub struct BuildArgs {
    /// Build a single function from the stack
    #[arg(long)]
    pub filter: Option<String>,
    /// Number of concurrent build workers (default: [build].parallel)
    #[arg(long)]
    pub parallel: Option<usize>,
    /// Image tag format: latest, sha or branch
    #[arg(long, default_value = "latest")]
    pub tag: TagFormat,
    /// Docker build-arg KEY=VALUE, repeatable
    #[arg(long = "build-arg", short = 'b')]
    pub build_args: Vec<String>,
    /// Image label KEY=VALUE, repeatable
    #[arg(long = "build-label")]
    pub build_labels: Vec<String>,
    /// Extra path copied into every build context, repeatable
    #[arg(long = "copy-extra")]
    pub copy_extra: Vec<String>,
    /// Template build option, e.g. dev, repeatable
    #[arg(long = "build-option", short = 'o')]
    pub build_options: Vec<String>,
    /// Do not use the docker build cache
    #[arg(long)]
    pub no_cache: bool,
    /// Squash image layers (experimental docker feature)
    #[arg(long)]
    pub squash: bool,
    /// Always pull newer base images
    #[arg(long)]
    pub pull: bool,
    /// Do not stream docker output
    #[arg(long)]
    pub quiet: bool,
    /// Only assemble build contexts, do not run docker
    #[arg(long)]
    pub shrinkwrap: bool,
}

impl BuildArgs {
    /// Run-level settings from flags, falling back to the stack's defaults.
    pub fn settings(&self, mode: BuildMode, stack: &StackConfig) -> anyhow::Result<BuildSettings> {
        let requested = match self.parallel {
            Some(parallel) => parallel,
            None => stack.build.parallel,
        };
        let parallel = BuildSettings::parallelism(requested)?;
        Ok(BuildSettings {
            mode,
            no_cache: self.no_cache,
            squash: self.squash,
            pull: self.pull,
            quiet: self.quiet,
            shrinkwrap: self.shrinkwrap,
            tag_format: self.tag,
            build_args: parse_build_args(&self.build_args)?,
            build_labels: parse_map(&self.build_labels, "build-label")?,
            copy_extra: self.copy_extra.clone(),
            build_options: self.build_options.clone(),
            platforms: stack.build.platforms.clone(),
            extra_tags: Vec::new(),
            parallel,
            http_proxy: proxy_from_env("http_proxy"),
            https_proxy: proxy_from_env("https_proxy"),
        })
    }
}

/// A loaded stack and the directory it lives in.
pub(crate) struct Project {
    dir: PathBuf,
    stack_file: PathBuf,
    stack: StackConfig,
}

impl Project {
    pub(crate) fn load(stack_file: &Path) -> anyhow::Result<Self> {
        let stack_file = std::path::absolute(stack_file)
            .with_context(|| format!("invalid stack file path {}", stack_file.display()))?;
        let stack = StackConfig::load(&stack_file)?;
        let dir = stack_file
            .parent()
            .map(Path::to_path_buf)
            .context("stack file has no parent directory")?;
        Ok(Self {
            dir,
            stack_file,
            stack,
        })
    }

    /// Re-reads the stack file this project was loaded from.
    pub(crate) fn reload(&self) -> anyhow::Result<Self> {
        Self::load(&self.stack_file)
    }

    /// `(function, handler)` pairs for the selected functions that get built.
    pub(crate) fn handlers(&self, filter: Option<&str>) -> anyhow::Result<Vec<(String, String)>> {
        Ok(self
            .stack
            .select(filter)?
            .into_iter()
            .filter(|f| !f.skip_build)
            .map(|f| (f.name, f.handler))
            .collect())
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn stack_file(&self) -> &Path {
        &self.stack_file
    }

    pub(crate) fn stack(&self) -> &StackConfig {
        &self.stack
    }

    pub(crate) fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(&self.dir)
            .with_build_root(&self.stack.build.build_root)
            .with_template_dir(&self.stack.build.template_dir)
    }

    /// Coordinator for one round; tag values are captured from git here.
    pub(crate) fn coordinator(
        &self,
        settings: BuildSettings,
    ) -> anyhow::Result<BuildCoordinator<RealExecutor>> {
        let tag_values = TagValues::for_format(settings.tag_format, &GitInfo::new(&self.dir))?;
        Ok(BuildCoordinator::new(self.assembler(), settings)
            .with_stack(self.stack.stack.clone())
            .with_tag_values(tag_values))
    }
}

/// Validates and runs one build round.
///
/// Returns `None` when `cancel` fired before the round finished.
pub(crate) async fn build_round(
    project: &Project,
    settings: BuildSettings,
    filter: Option<&str>,
    cancel: Option<CancellationToken>,
) -> anyhow::Result<Option<Vec<BuildOutcome>>> {
    let functions = project.stack().select(filter)?;
    let parallel = settings.parallel;
    let mut coordinator = project.coordinator(settings)?;
    if let Some(cancel) = &cancel {
        coordinator = coordinator.with_cancellation(cancel.clone());
    }

    coordinator.validate(&functions)?;
    let outcomes = coordinator.run(functions, parallel).await;

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Ok(None);
    }
    Ok(Some(outcomes))
}

/// Fails with the bulleted summary if any function failed.
pub(crate) fn check_outcomes(outcomes: &[BuildOutcome]) -> anyhow::Result<()> {
    match summarize_failures(outcomes) {
        Some(summary) => anyhow::bail!("{}", summary.trim_end()),
        None => Ok(()),
    }
}

/// Pushes every built image in order, stopping at the first failure.
pub(crate) async fn push_images(
    dir: &Path,
    outcomes: &[BuildOutcome],
    quiet: bool,
) -> anyhow::Result<()> {
    let executor = RealExecutor;
    for outcome in outcomes {
        let BuildOutcome::Built {
            function, image, ..
        } = outcome
        else {
            continue;
        };
        println!("Pushing: {function} [{image}]");
        executor
            .run(&docker::push_command(image), dir, &[], !quiet)
            .await
            .with_context(|| format!("failed to push {image}"))?;
    }
    Ok(())
}

fn proxy_from_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        Ok(_) | Err(std::env::VarError::NotPresent) => None,
        Err(e) => {
            tracing::warn!(variable = name, error = %e, "ignoring unreadable proxy setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const STACK: &str = r#"
[functions.hello]
lang = "python"
handler = "./hello"
image = "hello"
"#;

    fn stack_file(tmp: &TempDir, contents: &str) -> PathBuf {
        let path = tmp.path().join("kiln.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reload_picks_up_added_functions() {
        let tmp = TempDir::new().unwrap();
        let path = stack_file(&tmp, STACK);
        let project = Project::load(&path).unwrap();

        stack_file(
            &tmp,
            &format!("{STACK}\n[functions.bye]\nlang = \"python\"\nhandler = \"./bye\"\nimage = \"bye\"\n"),
        );
        let reloaded = project.reload().unwrap();

        assert_eq!(project.handlers(None).unwrap().len(), 1);
        assert_eq!(
            reloaded.handlers(None).unwrap(),
            vec![
                ("bye".to_owned(), "./bye".to_owned()),
                ("hello".to_owned(), "./hello".to_owned()),
            ]
        );
        assert_eq!(reloaded.stack_file(), project.stack_file());
    }

    #[test]
    fn reload_reports_broken_stack_file() {
        let tmp = TempDir::new().unwrap();
        let path = stack_file(&tmp, STACK);
        let project = Project::load(&path).unwrap();

        stack_file(&tmp, "[functions.hello");

        assert!(project.reload().is_err());
    }

    #[test]
    fn handlers_skip_functions_that_are_not_built() {
        let tmp = TempDir::new().unwrap();
        let path = stack_file(
            &tmp,
            &format!("{STACK}\n[functions.legacy]\nlang = \"dockerfile\"\nhandler = \"./legacy\"\nimage = \"legacy\"\nskip_build = true\n"),
        );
        let project = Project::load(&path).unwrap();

        assert_eq!(
            project.handlers(None).unwrap(),
            vec![("hello".to_owned(), "./hello".to_owned())]
        );
    }
}
