//! Combustion output for Kubernetes
//!
//! Runs the derivation engine against an image definition and writes
//! everything the first-boot installer needs into the combustion directory:
//!
//! ```text
//! <combustion>/
//!   15-kubernetes-install.sh
//!   kubernetes/config/{server,init_server,agent}.yaml
//!   kubernetes/install/...
//!   kubernetes/images/...
//!   kubernetes/manifests/k8s-vip.yaml
//!   kubernetes/gpg-keys/rancher-public.key
//!   kubernetes/rpm-repos/<distribution>-selinux.repo
//! ```

use anyhow::{Context as _, Result, anyhow};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::config::BuildConfig;
use crate::definition::ImageDefinition;
use crate::kubernetes::artefacts::{
    ArtefactPaths, ArtefactSelection, download_artefacts, select_artefacts,
};
use crate::kubernetes::cluster::{Cluster, build_cluster_with};
use crate::kubernetes::document::KubernetesConfig;
use crate::kubernetes::installer::{
    AGENT_CONFIG_FILE, INIT_SERVER_CONFIG_FILE, INSTALL_SCRIPT_FILE, InstallerPaths,
    InstallerVariant, SERVER_CONFIG_FILE, SelinuxInstall, VIP_MANIFEST_FILE, installer_values,
    render_installer, render_vip_manifest, vip_values,
};
use crate::kubernetes::platform::Distribution;
use crate::kubernetes::selinux::{
    SIGNING_KEY_FILE, SelinuxPolicy, download_signing_key, render_repository, resolve_policy,
};
use crate::templates::TemplateRenderer;
use crate::utils::download::Downloader;

const KUBERNETES_DIR: &str = "kubernetes";
const CONFIG_DIR: &str = "config";
const MANIFESTS_DIR: &str = "manifests";
const GPG_KEYS_DIR: &str = "gpg-keys";
const RPM_REPOS_DIR: &str = "rpm-repos";
const SCRIPT_MODE: u32 = 0o744;

/// Inputs of a single image build.
#[derive(Debug, Clone)]
pub struct Context {
    pub definition: ImageDefinition,
    /// User configuration directory holding `kubernetes/config/{server,agent}.yaml`.
    pub config_dir: PathBuf,
    pub combustion_dir: PathBuf,
    pub build: BuildConfig,
}

impl Context {
    pub fn user_config_path(&self, file: &str) -> PathBuf {
        self.config_dir.join(KUBERNETES_DIR).join(CONFIG_DIR).join(file)
    }

    fn kubernetes_dir(&self) -> PathBuf {
        self.combustion_dir.join(KUBERNETES_DIR)
    }
}

/// What `configure_kubernetes` produced.
#[derive(Debug, Clone)]
pub struct KubernetesOutput {
    pub script: PathBuf,
    pub config_files: Vec<PathBuf>,
    pub artefacts: Option<ArtefactPaths>,
    pub selinux: Option<SelinuxPolicy>,
    pub vip_manifest: Option<PathBuf>,
}

/// Derive, download and render everything Kubernetes needs.
///
/// Returns `None` when the definition carries no Kubernetes version.
pub fn configure_kubernetes(
    ctx: &Context,
    downloader: &dyn Downloader,
) -> Result<Option<KubernetesOutput>> {
    if ctx.definition.kubernetes.version.is_empty() {
        tracing::info!("kubernetes not configured, skipping");
        return Ok(None);
    }

    match configure(ctx, downloader) {
        Ok(output) => {
            println!("✓ Kubernetes configured: {}", output.script.display());
            Ok(Some(output))
        }
        Err(err) => {
            println!("✗ Configuring Kubernetes failed: {}", err);
            tracing::error!(error = ?err, "configuring kubernetes");
            Err(err)
        }
    }
}

fn configure(ctx: &Context, downloader: &dyn Downloader) -> Result<KubernetesOutput> {
    let kubernetes = &ctx.definition.kubernetes;
    let distribution = Distribution::from_version(&kubernetes.version)?;
    tracing::info!(
        version = %kubernetes.version,
        %distribution,
        nodes = kubernetes.nodes.len(),
        "configuring kubernetes"
    );

    let cluster = build_cluster_with(
        kubernetes,
        &ctx.user_config_path(SERVER_CONFIG_FILE),
        &ctx.user_config_path(AGENT_CONFIG_FILE),
        &ctx.build.cluster,
    )
    .context("Failed to derive cluster configuration")?;

    for warning in &cluster.warnings {
        tracing::warn!(%warning, "cluster configuration");
        println!("⚠️  {}", warning);
    }

    let config_files = write_cluster_configs(&cluster, &ctx.kubernetes_dir().join(CONFIG_DIR))?;

    let selection = select_artefacts(distribution, ctx.definition.arch, &cluster.server_config)
        .context("Failed to select Kubernetes artefacts")?;
    let artefacts = if ctx.build.skip_artefacts {
        println!("⚠️  Skipping artefact downloads");
        None
    } else {
        Some(fetch_artefacts(ctx, &selection, downloader)?)
    };

    let renderer = TemplateRenderer::from_embedded()?;
    let (selinux, selinux_install) = if cluster.server_config.selinux_enabled() {
        let (policy, install) = configure_selinux(ctx, &renderer, downloader)?;
        (Some(policy), Some(install))
    } else {
        (None, None)
    };

    let vip_manifest = match vip_values(kubernetes, distribution) {
        Some(values) => {
            let manifest = render_vip_manifest(&renderer, &values)?;
            let dir = ctx.kubernetes_dir().join(MANIFESTS_DIR);
            let path = dir.join(VIP_MANIFEST_FILE);
            write_file(&path, &manifest)?;
            let addresses: Vec<&str> = values
                .addresses
                .iter()
                .map(|vip| vip.address.as_str())
                .collect();
            println!("✓ VIP manifest written for {}", addresses.join(", "));
            Some(path)
        }
        None => None,
    };

    let variant = InstallerVariant::for_cluster(&cluster);
    let values = installer_values(
        kubernetes,
        &cluster,
        &selection,
        &InstallerPaths::default(),
        vip_manifest
            .as_ref()
            .map(|_| format!("{KUBERNETES_DIR}/{MANIFESTS_DIR}/{VIP_MANIFEST_FILE}")),
        selinux_install,
    );
    let script_contents = render_installer(&renderer, variant, &values)?;
    let script = ctx.combustion_dir.join(INSTALL_SCRIPT_FILE);
    write_file(&script, &script_contents)?;
    fs::set_permissions(&script, fs::Permissions::from_mode(SCRIPT_MODE))
        .with_context(|| format!("Failed to set permissions on {}", script.display()))?;
    tracing::debug!(?variant, script = %script.display(), "installer script written");

    Ok(KubernetesOutput {
        script,
        config_files,
        artefacts,
        selinux,
        vip_manifest,
    })
}

/// Role documents paired with their file names. `init_server.yaml` and
/// `agent.yaml` only exist for multi-node clusters.
pub fn cluster_documents(cluster: &Cluster) -> Vec<(&'static str, &KubernetesConfig)> {
    let mut documents = vec![(SERVER_CONFIG_FILE, &cluster.server_config)];
    if let Some(config) = &cluster.initialiser_config {
        documents.push((INIT_SERVER_CONFIG_FILE, config));
    }
    if let Some(config) = &cluster.agent_config {
        documents.push((AGENT_CONFIG_FILE, config));
    }
    documents
}

fn write_cluster_configs(cluster: &Cluster, dir: &Path) -> Result<Vec<PathBuf>> {
    let documents = cluster_documents(cluster);
    let mut written = Vec::with_capacity(documents.len());
    for (name, config) in documents {
        let contents = config
            .to_yaml_string()
            .map_err(|e| anyhow!("Failed to serialize {}: {:?}", name, e))?;
        let path = dir.join(name);
        write_file(&path, &contents)?;
        println!("✓ Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

fn fetch_artefacts(
    ctx: &Context,
    selection: &ArtefactSelection,
    downloader: &dyn Downloader,
) -> Result<ArtefactPaths> {
    let total = selection.install.len() + selection.images.len() + 1;
    println!("Downloading {} Kubernetes artefacts...", total);

    let paths = download_artefacts(
        selection,
        &ctx.definition.kubernetes.version,
        &ctx.build.sources,
        downloader,
        &ctx.kubernetes_dir(),
    )
    .context("Failed to download Kubernetes artefacts")?;

    println!("✓ Artefacts downloaded to {}", ctx.kubernetes_dir().display());
    Ok(paths)
}

/// Resolve the policy, write its repository definition and fetch the
/// signing key. Returns what the installer script needs to install it.
fn configure_selinux(
    ctx: &Context,
    renderer: &TemplateRenderer,
    downloader: &dyn Downloader,
) -> Result<(SelinuxPolicy, SelinuxInstall)> {
    let policy = resolve_policy(&ctx.definition.kubernetes.version, &ctx.build.sources)
        .context("Failed to resolve SELinux policy")?;
    tracing::info!(
        package = %policy.package,
        repository = %policy.repository.url,
        priority = policy.priority,
        "selinux policy resolved"
    );

    let repository_file = policy.repository_file();
    let repository = render_repository(renderer, &policy)?;
    write_file(
        &ctx.kubernetes_dir().join(RPM_REPOS_DIR).join(&repository_file),
        &repository,
    )?;

    let signing_key = if ctx.build.skip_artefacts {
        tracing::debug!("skipping signing key download");
        None
    } else {
        let key = download_signing_key(
            &ctx.build.sources,
            &ctx.kubernetes_dir().join(GPG_KEYS_DIR),
            downloader,
        )
        .context("Failed to download SELinux repository signing key")?;
        tracing::debug!(key = %key.display(), "signing key stored");
        Some(format!("{KUBERNETES_DIR}/{GPG_KEYS_DIR}/{SIGNING_KEY_FILE}"))
    };

    println!("✓ SELinux policy package: {}", policy.package);
    let install = SelinuxInstall {
        package: policy.package.clone(),
        repository_file: format!("{KUBERNETES_DIR}/{RPM_REPOS_DIR}/{repository_file}"),
        signing_key,
    };
    Ok((policy, install))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Kubernetes, Network, Node, NodeType};
    use crate::kubernetes::platform::Arch;
    use crate::utils::download::testing::RecordingDownloader;
    use tempfile::TempDir;

    fn node(hostname: &str, node_type: NodeType, initializer: bool) -> Node {
        Node {
            hostname: hostname.to_string(),
            node_type,
            initializer,
        }
    }

    fn context(temp_dir: &TempDir, version: &str, nodes: Vec<Node>) -> Context {
        Context {
            definition: ImageDefinition {
                arch: Arch::X86_64,
                kubernetes: Kubernetes {
                    version: version.to_string(),
                    network: Network {
                        api_vip: "192.168.122.100".to_string(),
                        api_vip6: String::new(),
                        api_host: "api.cluster01.example.com".to_string(),
                    },
                    nodes,
                },
            },
            config_dir: temp_dir.path().join("config"),
            combustion_dir: temp_dir.path().join("combustion"),
            build: BuildConfig::default(),
        }
    }

    fn write_user_config(ctx: &Context, name: &str, contents: &str) {
        let path = ctx.user_config_path(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn three_nodes() -> Vec<Node> {
        vec![
            node("node1", NodeType::Server, false),
            node("node2", NodeType::Server, true),
            node("node3", NodeType::Agent, false),
        ]
    }

    #[test]
    fn test_skipped_without_version() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir, "", Vec::new());
        let downloader = RecordingDownloader::default();

        assert!(configure_kubernetes(&ctx, &downloader).unwrap().is_none());
        assert!(!ctx.combustion_dir.exists());
        assert!(downloader.urls().is_empty());
    }

    #[test]
    fn test_single_node_rke2() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(
            &temp_dir,
            "v1.30.3+rke2r1",
            vec![node("node1", NodeType::Server, false)],
        );
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        assert_eq!(output.config_files.len(), 1);
        assert!(output.vip_manifest.is_none());
        assert!(output.selinux.is_none());

        let server = fs::read_to_string(&output.config_files[0]).unwrap();
        assert!(server.contains("cni: canal"));
        assert!(server.contains("192.168.122.100"));
        assert!(!server.contains("server:"));

        let script = fs::read_to_string(&output.script).unwrap();
        assert!(script.contains("systemctl enable rke2-server.service"));
        let mode = fs::metadata(&output.script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o744);

        let paths = output.artefacts.unwrap();
        assert!(paths.install.join("rke2-install.sh").exists());
        assert!(
            paths
                .images
                .join("rke2-images-canal.linux-amd64.tar.zst")
                .exists()
        );
    }

    #[test]
    fn test_multi_node_rke2() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir, "v1.30.3+rke2r1", three_nodes());
        write_user_config(&ctx, SERVER_CONFIG_FILE, "cni: cilium\nselinux: true\n");
        write_user_config(&ctx, AGENT_CONFIG_FILE, "node-label:\n  - role=worker\n");
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        assert_eq!(output.config_files.len(), 3);
        let config_dir = ctx.combustion_dir.join("kubernetes/config");
        let init = fs::read_to_string(config_dir.join(INIT_SERVER_CONFIG_FILE)).unwrap();
        let server = fs::read_to_string(config_dir.join(SERVER_CONFIG_FILE)).unwrap();
        let agent = fs::read_to_string(config_dir.join(AGENT_CONFIG_FILE)).unwrap();
        assert!(!init.contains("server:"));
        assert!(server.contains("https://192.168.122.100:9345"));
        assert!(agent.contains("role=worker"));
        assert!(agent.contains("cni: cilium"));

        let script = fs::read_to_string(&output.script).unwrap();
        assert!(script.contains("if [ \"$HOSTNAME\" = \"node2\" ]; then"));

        let manifest = fs::read_to_string(output.vip_manifest.unwrap()).unwrap();
        assert!(manifest.contains("192.168.122.100/32"));

        assert_eq!(output.selinux.unwrap().package, "rke2-selinux");
        assert!(
            ctx.combustion_dir
                .join("kubernetes/gpg-keys/rancher-public.key")
                .exists()
        );
        let repo =
            fs::read_to_string(ctx.combustion_dir.join("kubernetes/rpm-repos/rke2-selinux.repo"))
                .unwrap();
        assert!(
            repo.contains("baseurl=https://rpm.rancher.io/rke2/stable/common/slemicro/noarch")
        );
        assert!(repo.contains("gpgkey=file:///etc/pki/rpm-gpg/rancher-public.key"));
        assert!(script.contains("rpm --import kubernetes/gpg-keys/rancher-public.key"));
        assert!(script.contains("cp kubernetes/rpm-repos/rke2-selinux.repo /etc/zypp/repos.d/"));
        assert!(script.contains("zypper --non-interactive install rke2-selinux"));
        assert!(
            downloader
                .urls()
                .iter()
                .any(|url| url.ends_with("rke2-images-cilium.linux-amd64.tar.zst"))
        );
    }

    #[test]
    fn test_skip_artefacts() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = context(&temp_dir, "v1.30.3+k3s1", three_nodes());
        ctx.build.skip_artefacts = true;
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        assert!(output.artefacts.is_none());
        assert!(downloader.urls().is_empty());
        assert!(output.script.exists());
    }

    #[test]
    fn test_multi_node_k3s_join_port() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = context(
            &temp_dir,
            "v1.30.3+k3s1",
            vec![
                node("node1", NodeType::Server, false),
                node("node2", NodeType::Agent, false),
            ],
        );
        ctx.build.skip_artefacts = true;
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        let agent =
            fs::read_to_string(ctx.combustion_dir.join("kubernetes/config/agent.yaml")).unwrap();
        assert!(agent.contains("https://192.168.122.100:6443"));
        assert!(!agent.contains(":9345"));

        let manifest = fs::read_to_string(output.vip_manifest.unwrap()).unwrap();
        assert!(manifest.contains("port: 6443"));
        assert!(!manifest.contains("port: 9345"));
    }

    #[test]
    fn test_dual_stack_vip_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = context(&temp_dir, "v1.30.3+rke2r1", three_nodes());
        ctx.definition.kubernetes.network.api_vip6 = "fd12::100".to_string();
        ctx.build.skip_artefacts = true;
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        let server =
            fs::read_to_string(ctx.combustion_dir.join("kubernetes/config/server.yaml")).unwrap();
        assert!(server.contains("fd12::100"));

        let manifest = fs::read_to_string(output.vip_manifest.unwrap()).unwrap();
        assert!(manifest.contains("- 192.168.122.100/32"));
        assert!(manifest.contains("- fd12::100/128"));
        assert!(manifest.contains("ipFamilyPolicy: PreferDualStack"));
    }

    #[test]
    fn test_selinux_without_artefacts() {
        let temp_dir = TempDir::new().unwrap();
        let mut ctx = context(
            &temp_dir,
            "v1.30.3+k3s1",
            vec![node("node1", NodeType::Server, false)],
        );
        write_user_config(&ctx, SERVER_CONFIG_FILE, "selinux: true
");
        ctx.build.skip_artefacts = true;
        let downloader = RecordingDownloader::default();

        let output = configure_kubernetes(&ctx, &downloader).unwrap().unwrap();

        assert!(downloader.urls().is_empty());
        assert!(
            ctx.combustion_dir
                .join("kubernetes/rpm-repos/k3s-selinux.repo")
                .exists()
        );
        let script = fs::read_to_string(&output.script).unwrap();
        assert!(script.contains("zypper --non-interactive install k3s-selinux"));
        assert!(!script.contains("rpm --import"));
    }

    #[test]
    fn test_download_failure_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(
            &temp_dir,
            "v1.30.3+rke2r1",
            vec![node("node1", NodeType::Server, false)],
        );
        let downloader = RecordingDownloader::failing_on("rke2-images-core");

        assert!(configure_kubernetes(&ctx, &downloader).is_err());
        assert!(!ctx.combustion_dir.join(INSTALL_SCRIPT_FILE).exists());
    }

    #[test]
    fn test_malformed_user_config() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(&temp_dir, "v1.30.3+rke2r1", three_nodes());
        write_user_config(&ctx, SERVER_CONFIG_FILE, "cni: [unterminated\n");
        let downloader = RecordingDownloader::default();

        assert!(configure_kubernetes(&ctx, &downloader).is_err());
        assert!(downloader.urls().is_empty());
    }
}
