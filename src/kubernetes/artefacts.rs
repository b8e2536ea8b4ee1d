//! Release artefact selection and download
//!
//! Installer artefacts (distribution binary, checksums, install script) go to
//! the `install/` directory; compressed container image bundles go to
//! `images/`. Everything is fetched one at a time and the first failure aborts
//! the rest.

use std::fs;
use std::path::{Path, PathBuf};

use super::cni::{CNI_CALICO, CNI_CANAL, CNI_CILIUM, CNI_MULTUS, CNI_NONE, extract_cni};
use super::document::KubernetesConfig;
use super::platform::{Arch, Distribution};
use crate::config::ReleaseSources;
use crate::error::{KubernetesError, Result};
use crate::utils::download::{DownloadError, Downloader};

/// Artefacts required for a given distribution, architecture and CNI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactSelection {
    pub distribution: Distribution,
    pub install: Vec<String>,
    pub images: Vec<String>,
}

impl ArtefactSelection {
    /// File name of the downloaded upstream install script.
    pub fn install_script(&self) -> String {
        install_script_name(self.distribution)
    }
}

/// Where the downloaded artefacts ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactPaths {
    pub install: PathBuf,
    pub images: PathBuf,
}

impl ArtefactPaths {
    pub const INSTALL_DIR: &'static str = "install";
    pub const IMAGES_DIR: &'static str = "images";

    pub fn under(destination: &Path) -> Self {
        Self {
            install: destination.join(Self::INSTALL_DIR),
            images: destination.join(Self::IMAGES_DIR),
        }
    }
}

pub fn install_script_name(distribution: Distribution) -> String {
    format!("{}-install.sh", distribution.name())
}

/// Image bundles needed by an RKE2 node.
///
/// Calico, Cilium and Multus are only published for x86_64.
pub fn image_artefacts(arch: Arch, cni: &str, multus_enabled: bool) -> Result<Vec<String>> {
    let arch_name = arch.release_name();
    let bundle = |name: &str| format!("rke2-images-{name}.linux-{arch_name}.tar.zst");

    let mut artefacts = vec![bundle("core")];

    match cni {
        CNI_NONE => {}
        CNI_CANAL => artefacts.push(bundle(CNI_CANAL)),
        CNI_CALICO | CNI_CILIUM => {
            if arch == Arch::Aarch64 {
                return Err(KubernetesError::UnsupportedPlatform {
                    component: cni.to_string(),
                    arch,
                });
            }
            artefacts.push(bundle(cni));
        }
        "" => {
            return Err(KubernetesError::CniFormat("cni not specified".to_string()));
        }
        other => {
            return Err(KubernetesError::CniFormat(format!("unsupported cni '{other}'")));
        }
    }

    if multus_enabled {
        if arch == Arch::Aarch64 {
            return Err(KubernetesError::UnsupportedPlatform {
                component: CNI_MULTUS.to_string(),
                arch,
            });
        }
        artefacts.push(bundle(CNI_MULTUS));
    }

    Ok(artefacts)
}

/// Distribution binary and checksum file.
pub fn installer_artefacts(distribution: Distribution, arch: Arch) -> Vec<String> {
    let arch_name = arch.release_name();
    let binary = match (distribution, arch) {
        (Distribution::Rke2, _) => format!("rke2.linux-{arch_name}.tar.gz"),
        (Distribution::K3s, Arch::X86_64) => "k3s".to_string(),
        (Distribution::K3s, Arch::Aarch64) => format!("k3s-{arch_name}"),
    };
    vec![binary, format!("sha256sum-{arch_name}.txt")]
}

/// Select everything a node of this cluster needs.
///
/// For RKE2 the CNI is read from the server document. K3s embeds its own CNI
/// in the airgap image bundle.
pub fn select_artefacts(
    distribution: Distribution,
    arch: Arch,
    server_config: &KubernetesConfig,
) -> Result<ArtefactSelection> {
    let images = match distribution {
        Distribution::Rke2 => {
            let (cni, multus_enabled) = extract_cni(server_config)?;
            image_artefacts(arch, &cni, multus_enabled)?
        }
        Distribution::K3s => vec![format!("k3s-airgap-images-{}.tar.zst", arch.release_name())],
    };

    Ok(ArtefactSelection {
        distribution,
        install: installer_artefacts(distribution, arch),
        images,
    })
}

/// Download the selection into `install/` and `images/` under `destination`.
pub fn download_artefacts(
    selection: &ArtefactSelection,
    version: &str,
    sources: &ReleaseSources,
    downloader: &dyn Downloader,
    destination: &Path,
) -> Result<ArtefactPaths> {
    let paths = ArtefactPaths::under(destination);
    let install_dir = paths.install.as_path();
    let images_dir = paths.images.as_path();
    create_dir(install_dir)?;
    create_dir(images_dir)?;

    let distribution = selection.distribution;
    let script_url = sources.install_script(distribution);
    fetch(
        downloader,
        script_url,
        &install_dir.join(selection.install_script()),
        &selection.install_script(),
    )?;

    for artefact in &selection.install {
        let url = sources.artefact_url(distribution, version, artefact);
        fetch(downloader, &url, &install_dir.join(artefact), artefact)?;
    }

    for artefact in &selection.images {
        let url = sources.artefact_url(distribution, version, artefact);
        fetch(downloader, &url, &images_dir.join(artefact), artefact)?;
    }

    Ok(paths)
}

fn fetch(
    downloader: &dyn Downloader,
    url: &str,
    destination: &Path,
    artefact: &str,
) -> Result<()> {
    tracing::info!(artefact, url, "downloading artefact");
    downloader
        .download(url, destination)
        .map_err(|source| KubernetesError::ArtefactDownload {
            artefact: artefact.to_string(),
            source,
        })
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| KubernetesError::ArtefactDownload {
        artefact: dir.display().to_string(),
        source: DownloadError::Io {
            path: dir.to_path_buf(),
            source,
        },
    })
}
