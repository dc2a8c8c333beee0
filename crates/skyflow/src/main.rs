mod commands;
mod manifest;
mod reconcile;
mod session;

use clap::{Parser, Subcommand};
use skyflow_cloud::ResourceKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sky")]
#[command(about = "Declare your servers. Sky makes them so.", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update every declared resource
    Apply {
        /// Desired-state file (defaults to sky.yaml lookup)
        #[arg(short, long, env = "SKYFLOW_CONFIG_PATH")]
        file: Option<PathBuf>,
    },
    /// Read back every tracked resource and drop the ones that vanished
    Show,
    /// Start tracking an existing resource
    Import {
        /// server, ip or security_group_rule
        kind: ResourceKind,
        /// Name to track it under
        name: String,
        /// Provider identifier (`<group>/<rule>` for rules)
        id: String,
    },
    /// Delete every tracked resource
    Destroy {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let project_root = std::env::current_dir()?;

    match cli.command {
        Commands::Apply { file } => commands::apply::handle(&project_root, file).await?,
        Commands::Show => commands::show::handle(&project_root).await?,
        Commands::Import { kind, name, id } => {
            commands::import::handle(&project_root, kind, &name, id).await?
        }
        Commands::Destroy { yes } => commands::destroy::handle(&project_root, yes).await?,
        Commands::Version => println!("skyflow {}", env!("CARGO_PKG_VERSION")),
    }

    Ok(())
}
