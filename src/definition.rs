//! Image definition input
//!
//! Only deserialization happens here. Topology validation (unique hostnames,
//! sensible node types) is expected to have been done by the caller.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::kubernetes::platform::Arch;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageDefinition {
    pub arch: Arch,
    pub kubernetes: Kubernetes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Kubernetes {
    /// Release version, e.g. `v1.30.3+rke2r1`.
    pub version: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Network {
    #[serde(default, rename = "apiVIP")]
    pub api_vip: String,
    #[serde(default, rename = "apiVIP6")]
    pub api_vip6: String,
    #[serde(default, rename = "apiHost")]
    pub api_host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Server,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Node {
    pub hostname: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub initializer: bool,
}

impl Kubernetes {
    pub fn is_multi_node(&self) -> bool {
        self.nodes.len() >= 2
    }
}

/// Load an image definition from a TOML file
pub fn load_definition(path: &Path) -> Result<ImageDefinition> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse definition file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_definition() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("definition.toml");
        fs::write(
            &path,
            r#"
arch = "x86_64"

[kubernetes]
version = "v1.30.3+rke2r1"

[kubernetes.network]
apiVIP = "192.168.122.100"
apiHost = "api.cluster01.example.com"

[[kubernetes.nodes]]
hostname = "node1"
type = "server"
initializer = true

[[kubernetes.nodes]]
hostname = "node2"
type = "agent"
"#,
        )
        .unwrap();

        let definition = load_definition(&path).unwrap();
        assert_eq!(definition.arch, Arch::X86_64);
        assert_eq!(definition.kubernetes.network.api_vip, "192.168.122.100");
        assert!(definition.kubernetes.network.api_vip6.is_empty());
        assert_eq!(definition.kubernetes.nodes.len(), 2);
        assert!(definition.kubernetes.nodes[0].initializer);
        assert_eq!(definition.kubernetes.nodes[1].node_type, NodeType::Agent);
        assert!(!definition.kubernetes.nodes[1].initializer);
        assert!(definition.kubernetes.is_multi_node());
    }

    #[test]
    fn test_rejects_unknown_arch() {
        let result: std::result::Result<ImageDefinition, _> =
            toml::from_str("arch = \"riscv64\"\n[kubernetes]\nversion = \"v1.30.3+k3s1\"\n");
        assert!(result.is_err());
    }
}
