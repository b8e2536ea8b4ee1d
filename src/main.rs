mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::kubernetes::KubernetesCommands;

#[derive(Parser)]
#[command(name = "edge-builder")]
#[command(about = "Kubernetes bootstrap configuration for edge OS images", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Derive cluster configuration, fetch artefacts and render the installer
    Kubernetes {
        #[command(subcommand)]
        command: KubernetesCommands,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    commands::handle_command(cli.command)
}
