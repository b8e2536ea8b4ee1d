//! Target platform: Kubernetes distribution and CPU architecture

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{KubernetesError, Result};

/// Kubernetes distribution embedded in a definition's version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Rke2,
    K3s,
}

impl Distribution {
    /// Detect the distribution from a version such as `v1.30.3+rke2r1`.
    pub fn from_version(version: &str) -> Result<Self> {
        if version.contains("rke2") {
            Ok(Distribution::Rke2)
        } else if version.contains("k3s") {
            Ok(Distribution::K3s)
        } else {
            Err(KubernetesError::UnknownDistribution(version.to_string()))
        }
    }

    /// Port secondary servers and agents register with.
    pub fn join_port(&self) -> u16 {
        match self {
            Distribution::Rke2 => 9345,
            Distribution::K3s => 6443,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Rke2 => "rke2",
            Distribution::K3s => "k3s",
        }
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Target CPU architecture of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    /// Architecture suffix used in upstream release artefact names.
    pub fn release_name(&self) -> &'static str {
        match self {
            Arch::X86_64 => "amd64",
            Arch::Aarch64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86_64 => f.write_str("x86_64"),
            Arch::Aarch64 => f.write_str("aarch64"),
        }
    }
}

impl FromStr for Arch {
    type Err = KubernetesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(KubernetesError::UnsupportedArch(other.to_string())),
        }
    }
}

impl TryFrom<String> for Arch {
    type Error = KubernetesError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
