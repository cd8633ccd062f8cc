mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use strata_build::BuildError;

#[derive(Parser)]
#[command(name = "strata", about = "Build cache-layered service images and launch them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a strata.toml and .dockerignore into the current directory
    Init,
    /// Show every build step with its layer fingerprint and cache status
    Plan,
    /// Build the image, reusing cached layers
    Build {
        /// Image tag (default: [image].tag from strata.toml)
        #[arg(long, short = 't')]
        tag: Option<String>,
    },
    /// Print the Dockerfile equivalent of the build plan
    Dockerfile,
    /// Eject the Dockerfile for manual customization
    Eject,
    /// Start the server process described by a built image
    Launch {
        /// Image tag (default: [image].tag from strata.toml)
        #[arg(long, short = 't')]
        tag: Option<String>,
        /// Print the command line without starting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a built image's manifest
    Inspect {
        /// Image tag (default: [image].tag from strata.toml)
        #[arg(long, short = 't')]
        tag: Option<String>,
    },
    /// Delete cached layers and image manifests
    Clean {
        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(failure_code(&err))
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Init => commands::init_project()?,
        Commands::Plan => commands::plan()?,
        Commands::Build { tag } => commands::build(tag.as_deref()).await?,
        Commands::Dockerfile => commands::dockerfile()?,
        Commands::Eject => commands::eject()?,
        Commands::Launch { tag, dry_run } => {
            let code = commands::launch(tag.as_deref(), dry_run).await?;
            return Ok(ExitCode::from(status_byte(code)));
        }
        Commands::Inspect { tag } => commands::inspect(tag.as_deref())?,
        Commands::Clean { yes } => commands::clean(yes)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// A failing RUN step's exit code becomes strata's; anything else exits 1.
fn failure_code(err: &anyhow::Error) -> u8 {
    match err
        .chain()
        .find_map(|cause| cause.downcast_ref::<BuildError>())
        .and_then(BuildError::exit_code)
    {
        Some(code) if code != 0 => status_byte(code),
        _ => 1,
    }
}

fn status_byte(code: i32) -> u8 {
    if (0..=255).contains(&code) {
        code as u8
    } else {
        1
    }
}
