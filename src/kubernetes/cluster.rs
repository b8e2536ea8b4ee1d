//! Cluster topology and role-specific configuration derivation

use std::path::Path;

use super::cni::CNI_DEFAULT;
use super::document::{CniSetting, ConfigWarning, KubernetesConfig};
use super::platform::Distribution;
use super::tls_san::{TlsSanPolicy, merge_tls_san, normalize_tls_san};
use super::token::TokenPolicy;
use crate::definition::{Kubernetes, Network, Node, NodeType};
use crate::error::{KubernetesError, Result};

/// Knobs for the open choices in configuration derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterOptions {
    pub token: TokenPolicy,
    pub tls_san: TlsSanPolicy,
}

/// Derived configuration for every node role.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Hostname of the node bootstrapping the control plane. Empty for
    /// single-node clusters.
    pub initialiser: String,
    /// Server configuration without the join address.
    pub initialiser_config: Option<KubernetesConfig>,
    pub server_config: KubernetesConfig,
    pub agent_config: Option<KubernetesConfig>,
    pub warnings: Vec<ConfigWarning>,
}

impl Cluster {
    pub fn is_multi_node(&self) -> bool {
        self.agent_config.is_some()
    }
}

/// Derive the cluster configuration with default options.
pub fn build_cluster(
    kubernetes: &Kubernetes,
    server_config_path: &Path,
    agent_config_path: &Path,
) -> Result<Cluster> {
    build_cluster_with(
        kubernetes,
        server_config_path,
        agent_config_path,
        &ClusterOptions::default(),
    )
}

/// Derive the cluster configuration from the definition and any
/// user-supplied partial server/agent documents.
pub fn build_cluster_with(
    kubernetes: &Kubernetes,
    server_config_path: &Path,
    agent_config_path: &Path,
    options: &ClusterOptions,
) -> Result<Cluster> {
    let mut server_config = KubernetesConfig::load(server_config_path)?;
    let mut warnings = Vec::new();

    if !kubernetes.is_multi_node() {
        apply_cni_default(&mut server_config);
        warnings.extend(append_api_addresses(
            &mut server_config,
            &kubernetes.network,
            options.tls_san,
        ));
        // Nothing to join in a single-node cluster.
        server_config.server = None;

        return Ok(Cluster {
            initialiser: String::new(),
            initialiser_config: None,
            server_config,
            agent_config: None,
            warnings,
        });
    }

    apply_cni_default(&mut server_config);
    if server_config.token.is_none() {
        server_config.token = Some(options.token.token());
    }
    // Versions without a distribution marker are treated as RKE2.
    let port = Distribution::from_version(&kubernetes.version)
        .unwrap_or(Distribution::Rke2)
        .join_port();
    match join_address(&kubernetes.network, port) {
        Some(address) => server_config.server = Some(address),
        None => warnings.push(ConfigWarning::MissingApiVip),
    }
    warnings.extend(append_api_addresses(
        &mut server_config,
        &kubernetes.network,
        options.tls_san,
    ));

    let mut agent_config = KubernetesConfig::load(agent_config_path)?;
    agent_config.token = server_config.token.clone();
    agent_config.cni = server_config.cni.clone();
    agent_config.server = server_config.server.clone();
    agent_config.tls_san = server_config.tls_san.clone();

    let mut initialiser_config = server_config.clone();
    initialiser_config.server = None;

    let initialiser = find_initialiser(&kubernetes.nodes)
        .ok_or(KubernetesError::NoInitialiser)?
        .to_string();

    Ok(Cluster {
        initialiser,
        initialiser_config: Some(initialiser_config),
        server_config,
        agent_config: Some(agent_config),
        warnings,
    })
}

/// The node flagged as initializer, otherwise the first server node.
pub fn find_initialiser(nodes: &[Node]) -> Option<&str> {
    nodes
        .iter()
        .find(|node| node.initializer)
        .or_else(|| nodes.iter().find(|node| node.node_type == NodeType::Server))
        .map(|node| node.hostname.as_str())
}

fn apply_cni_default(config: &mut KubernetesConfig) {
    if config.cni == CniSetting::Absent {
        config.cni = CniSetting::Single(CNI_DEFAULT.to_string());
    }
}

fn join_address(network: &Network, port: u16) -> Option<String> {
    if !network.api_vip.is_empty() {
        Some(format!("https://{}:{}", network.api_vip, port))
    } else if !network.api_vip6.is_empty() {
        Some(format!("https://[{}]:{}", network.api_vip6, port))
    } else {
        None
    }
}

fn append_api_addresses(
    config: &mut KubernetesConfig,
    network: &Network,
    policy: TlsSanPolicy,
) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    for address in [&network.api_vip, &network.api_vip6, &network.api_host] {
        if address.is_empty() {
            continue;
        }
        warnings.extend(merge_tls_san(config, address, policy));
    }
    warnings.extend(normalize_tls_san(config));
    warnings
}
