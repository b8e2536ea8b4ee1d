//! Kubernetes bootstrap configuration derivation

pub mod artefacts;
pub mod cluster;
pub mod cni;
pub mod document;
pub mod installer;
pub mod platform;
pub mod selinux;
pub mod tls_san;
pub mod token;

pub use cluster::{Cluster, ClusterOptions, build_cluster, build_cluster_with};
pub use document::{ConfigWarning, KubernetesConfig};
pub use platform::{Arch, Distribution};
