//! SELinux policy packages for SELinux-enabled clusters

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::platform::Distribution;
use crate::config::ReleaseSources;
use crate::error::{KubernetesError, Result};
use crate::templates::{SELINUX_REPOSITORY, TemplateRenderer};
use crate::utils::download::{DownloadError, Downloader};

/// Priority of the policy repository relative to the OS repositories.
pub const REPOSITORY_PRIORITY: u32 = 99;

/// File name of the stored repository signing key.
pub const SIGNING_KEY_FILE: &str = "rancher-public.key";

/// Where the signing key is installed on the node.
pub const SIGNING_KEY_INSTALL_DIR: &str = "/etc/pki/rpm-gpg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmRepository {
    pub url: String,
    /// Whether packages are installed without signature verification.
    pub unsigned: bool,
}

/// Package and repository providing the distribution's SELinux policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelinuxPolicy {
    pub package: String,
    pub repository: RpmRepository,
    pub priority: u32,
}

impl SelinuxPolicy {
    /// File name of the repository definition, e.g. `rke2-selinux.repo`.
    pub fn repository_file(&self) -> String {
        format!("{}.repo", self.package)
    }
}

#[derive(Serialize)]
struct RepositoryValues<'a> {
    name: &'a str,
    url: &'a str,
    priority: u32,
    gpgcheck: bool,
    gpgkey: String,
}

/// Render the zypper repository definition providing the policy package.
pub fn render_repository(renderer: &TemplateRenderer, policy: &SelinuxPolicy) -> Result<String> {
    let values = RepositoryValues {
        name: &policy.package,
        url: &policy.repository.url,
        priority: policy.priority,
        gpgcheck: !policy.repository.unsigned,
        gpgkey: format!("{SIGNING_KEY_INSTALL_DIR}/{SIGNING_KEY_FILE}"),
    };
    renderer.render(SELINUX_REPOSITORY, &values)
}

/// Resolve the policy package for a version such as `v1.30.3+k3s1`.
pub fn resolve_policy(version: &str, sources: &ReleaseSources) -> Result<SelinuxPolicy> {
    let distribution = Distribution::from_version(version)?;

    Ok(SelinuxPolicy {
        package: format!("{}-selinux", distribution.name()),
        repository: RpmRepository {
            url: sources.selinux_repository(distribution).to_string(),
            unsigned: false,
        },
        priority: REPOSITORY_PRIORITY,
    })
}

/// Fetch the policy repository's signing key into `keys_dir`.
pub fn download_signing_key(
    sources: &ReleaseSources,
    keys_dir: &Path,
    downloader: &dyn Downloader,
) -> Result<PathBuf> {
    let key_path = keys_dir.join(SIGNING_KEY_FILE);
    let to_error = |source| KubernetesError::ArtefactDownload {
        artefact: SIGNING_KEY_FILE.to_string(),
        source,
    };

    fs::create_dir_all(keys_dir).map_err(|source| {
        to_error(DownloadError::Io {
            path: keys_dir.to_path_buf(),
            source,
        })
    })?;
    downloader
        .download(&sources.selinux_signing_key, &key_path)
        .map_err(to_error)?;

    Ok(key_path)
}
