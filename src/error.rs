//! Error kinds for Kubernetes bootstrap derivation

use std::path::PathBuf;

use crate::kubernetes::platform::Arch;
use crate::utils::download::DownloadError;

/// Errors raised while deriving cluster configuration or fetching its artefacts.
#[derive(Debug, thiserror::Error)]
pub enum KubernetesError {
    #[error("parsing kubernetes config '{}': {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("reading kubernetes config '{}'", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed determining cluster initialiser: no server node found")]
    NoInitialiser,

    #[error("invalid cni: {0}")]
    CniFormat(String),

    #[error("{component} is not supported on {arch} platforms")]
    UnsupportedPlatform { component: String, arch: Arch },

    #[error("unsupported architecture '{0}' (expected x86_64 or aarch64)")]
    UnsupportedArch(String),

    #[error("unknown kubernetes distribution in version '{0}'")]
    UnknownDistribution(String),

    #[error("downloading artefact '{artefact}'")]
    ArtefactDownload {
        artefact: String,
        #[source]
        source: DownloadError,
    },

    #[error("rendering template '{template}'")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },
}

pub type Result<T> = std::result::Result<T, KubernetesError>;
