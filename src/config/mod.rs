//! Build configuration
//!
//! Everything is read from the environment (a `.env` file in the working
//! directory is honored):
//! - EDGE_BUILDER_DOWNLOAD_TIMEOUT: per-download timeout in seconds (default: 600)
//! - EDGE_BUILDER_CLUSTER_TOKEN: "random" (default) or "placeholder"
//! - EDGE_BUILDER_TLS_SAN: "append" (default) or "dedupe"
//! - EDGE_BUILDER_SKIP_ARTEFACTS: skip artefact downloads ("true"/"1")
//! - EDGE_BUILDER_RKE2_RELEASES / EDGE_BUILDER_K3S_RELEASES: release download base URLs
//! - EDGE_BUILDER_RKE2_INSTALL_SCRIPT / EDGE_BUILDER_K3S_INSTALL_SCRIPT: install script URLs
//! - EDGE_BUILDER_RKE2_SELINUX_REPO / EDGE_BUILDER_K3S_SELINUX_REPO: SELinux RPM repositories
//! - EDGE_BUILDER_SELINUX_KEY: signing key of the SELinux RPM repositories

use anyhow::{Result, bail};
use std::time::Duration;

use crate::kubernetes::cluster::ClusterOptions;
use crate::kubernetes::platform::Distribution;
use crate::kubernetes::tls_san::TlsSanPolicy;
use crate::kubernetes::token::TokenPolicy;

const ENV_PREFIX: &str = "EDGE_BUILDER_";
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Where release artefacts, install scripts and SELinux packages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSources {
    pub rke2_releases: String,
    pub k3s_releases: String,
    pub rke2_install_script: String,
    pub k3s_install_script: String,
    pub rke2_selinux_repository: String,
    pub k3s_selinux_repository: String,
    pub selinux_signing_key: String,
}

impl Default for ReleaseSources {
    fn default() -> Self {
        Self {
            rke2_releases: "https://github.com/rancher/rke2/releases/download".to_string(),
            k3s_releases: "https://github.com/k3s-io/k3s/releases/download".to_string(),
            rke2_install_script: "https://get.rke2.io".to_string(),
            k3s_install_script: "https://get.k3s.io".to_string(),
            rke2_selinux_repository: "https://rpm.rancher.io/rke2/stable/common/slemicro/noarch"
                .to_string(),
            k3s_selinux_repository: "https://rpm.rancher.io/k3s/stable/common/slemicro/noarch"
                .to_string(),
            selinux_signing_key: "https://rpm.rancher.io/public.key".to_string(),
        }
    }
}

impl ReleaseSources {
    pub fn releases(&self, distribution: Distribution) -> &str {
        match distribution {
            Distribution::Rke2 => &self.rke2_releases,
            Distribution::K3s => &self.k3s_releases,
        }
    }

    pub fn install_script(&self, distribution: Distribution) -> &str {
        match distribution {
            Distribution::Rke2 => &self.rke2_install_script,
            Distribution::K3s => &self.k3s_install_script,
        }
    }

    pub fn selinux_repository(&self, distribution: Distribution) -> &str {
        match distribution {
            Distribution::Rke2 => &self.rke2_selinux_repository,
            Distribution::K3s => &self.k3s_selinux_repository,
        }
    }

    /// Download URL of a release artefact. `+` in versions such as
    /// `v1.30.3+rke2r1` is escaped.
    pub fn artefact_url(
        &self,
        distribution: Distribution,
        version: &str,
        artefact: &str,
    ) -> String {
        format!(
            "{}/{}/{}",
            self.releases(distribution).trim_end_matches('/'),
            version.replace('+', "%2B"),
            artefact
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub sources: ReleaseSources,
    pub download_timeout: Duration,
    pub cluster: ClusterOptions,
    pub skip_artefacts: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            sources: ReleaseSources::default(),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            cluster: ClusterOptions::default(),
            skip_artefacts: false,
        }
    }
}

impl BuildConfig {
    /// Load from the process environment, including `.env`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Keys are given without the prefix.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(value) = get("DOWNLOAD_TIMEOUT") {
            let secs: u64 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid {ENV_PREFIX}DOWNLOAD_TIMEOUT: {value}"))?;
            config.download_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = get("CLUSTER_TOKEN") {
            config.cluster.token = match value.to_lowercase().as_str() {
                "random" => TokenPolicy::Random,
                "placeholder" => TokenPolicy::Placeholder,
                _ => bail!(
                    "Invalid {ENV_PREFIX}CLUSTER_TOKEN: {value} \
                     (expected 'random' or 'placeholder')"
                ),
            };
        }

        if let Some(value) = get("TLS_SAN") {
            config.cluster.tls_san = match value.to_lowercase().as_str() {
                "append" => TlsSanPolicy::Append,
                "dedupe" | "deduplicate" => TlsSanPolicy::Deduplicate,
                _ => bail!("Invalid {ENV_PREFIX}TLS_SAN: {value} (expected 'append' or 'dedupe')"),
            };
        }

        if let Some(value) = get("SKIP_ARTEFACTS") {
            config.skip_artefacts = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        let sources = &mut config.sources;
        for (name, field) in [
            ("RKE2_RELEASES", &mut sources.rke2_releases),
            ("K3S_RELEASES", &mut sources.k3s_releases),
            ("RKE2_INSTALL_SCRIPT", &mut sources.rke2_install_script),
            ("K3S_INSTALL_SCRIPT", &mut sources.k3s_install_script),
            ("RKE2_SELINUX_REPO", &mut sources.rke2_selinux_repository),
            ("K3S_SELINUX_REPO", &mut sources.k3s_selinux_repository),
            ("SELINUX_KEY", &mut sources.selinux_signing_key),
        ] {
            if let Some(value) = get(name) {
                *field = value;
            }
        }

        Ok(config)
    }
}
