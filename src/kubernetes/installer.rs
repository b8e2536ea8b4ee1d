//! Installer script emitter
//!
//! Picks the single-node or multi-node bootstrap script and assembles the
//! values handed to the template renderer. Paths are relative to the
//! combustion directory the script runs from.

use serde::Serialize;

use super::artefacts::ArtefactSelection;
use super::cluster::Cluster;
use super::platform::Distribution;
use crate::definition::{Kubernetes, Network, NodeType};
use crate::error::Result;
use crate::templates::{
    MULTI_NODE_INSTALLER, SINGLE_NODE_INSTALLER, TemplateRenderer, VIP_MANIFEST,
};

pub const SERVER_CONFIG_FILE: &str = "server.yaml";
pub const INIT_SERVER_CONFIG_FILE: &str = "init_server.yaml";
pub const AGENT_CONFIG_FILE: &str = "agent.yaml";
pub const VIP_MANIFEST_FILE: &str = "k8s-vip.yaml";
pub const INSTALL_SCRIPT_FILE: &str = "15-kubernetes-install.sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerVariant {
    SingleNode,
    MultiNode,
}

impl InstallerVariant {
    pub fn for_cluster(cluster: &Cluster) -> Self {
        if cluster.is_multi_node() {
            InstallerVariant::MultiNode
        } else {
            InstallerVariant::SingleNode
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            InstallerVariant::SingleNode => SINGLE_NODE_INSTALLER,
            InstallerVariant::MultiNode => MULTI_NODE_INSTALLER,
        }
    }
}

/// Directories the script copies from, relative to the combustion directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerPaths {
    pub install: String,
    pub images: String,
    pub config: String,
}

impl Default for InstallerPaths {
    fn default() -> Self {
        Self {
            install: "kubernetes/install".to_string(),
            images: "kubernetes/images".to_string(),
            config: "kubernetes/config".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRole {
    pub hostname: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallerValues {
    pub distribution: String,
    pub install_path: String,
    pub images_path: String,
    pub install_script: String,
    /// Distribution binary installed directly by k3s scripts.
    pub binary: String,
    pub config_dir: String,
    pub server_config_file: String,
    pub agent_config_file: String,
    pub initialiser_config_file: String,
    pub initialiser: String,
    pub vip_manifest: Option<String>,
    pub selinux: Option<SelinuxInstall>,
    pub nodes: Vec<NodeRole>,
}

/// SELinux policy installation performed by the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelinuxInstall {
    pub package: String,
    pub repository_file: String,
    /// Repository signing key, absent when artefacts were not fetched.
    pub signing_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VipAddress {
    pub address: String,
    pub prefix_length: u8,
}

/// Values for the MetalLB pool fronting the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VipValues {
    pub addresses: Vec<VipAddress>,
    /// `IPv4` and/or `IPv6`, in address order.
    pub ip_families: Vec<String>,
    pub rke2: bool,
}

impl VipValues {
    pub fn is_dual_stack(&self) -> bool {
        self.ip_families.len() > 1
    }
}

/// VIP manifest values for a multi-node cluster with an API address.
pub fn vip_values(kubernetes: &Kubernetes, distribution: Distribution) -> Option<VipValues> {
    if !kubernetes.is_multi_node() {
        return None;
    }

    let Network { api_vip, api_vip6, .. } = &kubernetes.network;
    let mut addresses = Vec::new();
    let mut ip_families = Vec::new();
    if !api_vip.is_empty() {
        addresses.push(VipAddress {
            address: api_vip.clone(),
            prefix_length: 32,
        });
        ip_families.push("IPv4".to_string());
    }
    if !api_vip6.is_empty() {
        addresses.push(VipAddress {
            address: api_vip6.clone(),
            prefix_length: 128,
        });
        ip_families.push("IPv6".to_string());
    }
    if addresses.is_empty() {
        return None;
    }

    Some(VipValues {
        addresses,
        ip_families,
        rke2: distribution == Distribution::Rke2,
    })
}

/// Assemble the installer values.
///
/// `vip_manifest` and the SELinux files are paths relative to the combustion
/// directory.
pub fn installer_values(
    kubernetes: &Kubernetes,
    cluster: &Cluster,
    selection: &ArtefactSelection,
    paths: &InstallerPaths,
    vip_manifest: Option<String>,
    selinux: Option<SelinuxInstall>,
) -> InstallerValues {
    let nodes = if cluster.is_multi_node() {
        kubernetes
            .nodes
            .iter()
            .map(|node| NodeRole {
                hostname: node.hostname.clone(),
                role: match node.node_type {
                    NodeType::Server => "server".to_string(),
                    NodeType::Agent => "agent".to_string(),
                },
            })
            .collect()
    } else {
        Vec::new()
    };

    InstallerValues {
        distribution: selection.distribution.name().to_string(),
        install_path: paths.install.clone(),
        images_path: paths.images.clone(),
        install_script: selection.install_script(),
        binary: selection.install.first().cloned().unwrap_or_default(),
        config_dir: paths.config.clone(),
        server_config_file: SERVER_CONFIG_FILE.to_string(),
        agent_config_file: AGENT_CONFIG_FILE.to_string(),
        initialiser_config_file: INIT_SERVER_CONFIG_FILE.to_string(),
        initialiser: cluster.initialiser.clone(),
        vip_manifest,
        selinux,
        nodes,
    }
}

pub fn render_installer(
    renderer: &TemplateRenderer,
    variant: InstallerVariant,
    values: &InstallerValues,
) -> Result<String> {
    renderer.render(variant.template(), values)
}

pub fn render_vip_manifest(renderer: &TemplateRenderer, values: &VipValues) -> Result<String> {
    renderer.render(VIP_MANIFEST, values)
}
