//! Kubernetes configuration commands

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use edge_builder::combustion::{self, cluster_documents, configure_kubernetes};
use edge_builder::config::BuildConfig;
use edge_builder::definition::{ImageDefinition, load_definition};
use edge_builder::kubernetes::artefacts::select_artefacts;
use edge_builder::kubernetes::installer::{AGENT_CONFIG_FILE, SERVER_CONFIG_FILE};
use edge_builder::kubernetes::selinux::resolve_policy;
use edge_builder::kubernetes::{Distribution, build_cluster_with};
use edge_builder::utils::HttpDownloader;

#[derive(Subcommand, Clone)]
pub enum KubernetesCommands {
    /// Write cluster configs, artefacts and the installer script into a combustion directory
    Build {
        /// Image definition (TOML)
        #[arg(long, short = 'd')]
        definition: PathBuf,
        /// Directory holding kubernetes/config/{server,agent}.yaml
        #[arg(long, short = 'c')]
        config_dir: PathBuf,
        /// Combustion output directory
        #[arg(long, short = 'o')]
        output: PathBuf,
        /// Do not download release artefacts
        #[arg(long)]
        skip_artefacts: bool,
    },
    /// Print the derived configuration and selected artefacts (no network access)
    Show {
        /// Image definition (TOML)
        #[arg(long, short = 'd')]
        definition: PathBuf,
        /// Directory holding kubernetes/config/{server,agent}.yaml
        #[arg(long, short = 'c')]
        config_dir: PathBuf,
    },
}

pub fn handle_kubernetes(command: KubernetesCommands) -> Result<()> {
    let mut build = BuildConfig::from_env()?;

    match command {
        KubernetesCommands::Build {
            definition,
            config_dir,
            output,
            skip_artefacts,
        } => {
            build.skip_artefacts |= skip_artefacts;
            let downloader = HttpDownloader::new(build.download_timeout)
                .context("Failed to set up artefact downloads")?;
            let ctx = combustion::Context {
                definition: load_definition(&definition)?,
                config_dir,
                combustion_dir: output,
                build,
            };

            if configure_kubernetes(&ctx, &downloader)?.is_none() {
                println!(
                    "⚠️  No Kubernetes version in {}, nothing to do",
                    definition.display()
                );
            }
            Ok(())
        }
        KubernetesCommands::Show {
            definition,
            config_dir,
        } => show(&load_definition(&definition)?, &config_dir, &build),
    }
}

fn show(definition: &ImageDefinition, config_dir: &Path, build: &BuildConfig) -> Result<()> {
    let kubernetes = &definition.kubernetes;
    let distribution = Distribution::from_version(&kubernetes.version)?;
    let user_config = config_dir.join("kubernetes").join("config");

    let cluster = build_cluster_with(
        kubernetes,
        &user_config.join(SERVER_CONFIG_FILE),
        &user_config.join(AGENT_CONFIG_FILE),
        &build.cluster,
    )
    .context("Failed to derive cluster configuration")?;

    println!("Kubernetes {} ({}, {})", kubernetes.version, distribution, definition.arch);
    if cluster.is_multi_node() {
        println!("  Initialiser: {}", cluster.initialiser);
    }
    for warning in &cluster.warnings {
        println!("⚠️  {}", warning);
    }
    println!();

    for (name, config) in cluster_documents(&cluster) {
        println!("# {}", name);
        let yaml = config
            .to_yaml_string()
            .map_err(|e| anyhow::anyhow!("Failed to serialize {}: {:?}", name, e))?;
        println!("{}", yaml);
    }

    let selection = select_artefacts(distribution, definition.arch, &cluster.server_config)?;
    println!("Install artefacts:");
    println!("  {}", selection.install_script());
    for artefact in &selection.install {
        println!("  {}", artefact);
    }
    println!("Image artefacts:");
    for artefact in &selection.images {
        println!("  {}", artefact);
    }

    if cluster.server_config.selinux_enabled() {
        let policy = resolve_policy(&kubernetes.version, &build.sources)?;
        println!(
            "SELinux: {} from {} (priority {})",
            policy.package, policy.repository.url, policy.priority
        );
    }

    Ok(())
}
