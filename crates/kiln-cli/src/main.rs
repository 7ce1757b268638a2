mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{BuildArgs, PublishArgs};
use kiln_core::DEFAULT_STACK_FILE;

#[derive(Parser)]
#[command(name = "kiln", about = "Build and publish function images from a kiln.toml stack")]
#[command(version)]
struct Cli {
    /// Path to the stack file
    #[arg(long, short = 'f', global = true, default_value = DEFAULT_STACK_FILE)]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build function images locally
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },
    /// Build multi-arch images with buildx and push them to the registry
    Publish {
        #[command(flatten)]
        args: BuildArgs,
        #[command(flatten)]
        publish: PublishArgs,
    },
    /// Build, optionally push, and optionally rebuild on changes
    Up {
        #[command(flatten)]
        args: BuildArgs,
        /// Push images after a successful build
        #[arg(long)]
        push: bool,
        /// Rebuild whenever handler files or the stack file change
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // arch-lint: allow(no-silent-result-drop) reason="an unset or unparsable RUST_LOG falls back to info"
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build { args } => commands::build(&cli.file, args).await?,
        Commands::Publish { args, publish } => commands::publish(&cli.file, args, publish).await?,
        Commands::Up { args, push, watch } => commands::up(&cli.file, args, push, watch).await?,
    }

    Ok(())
}
