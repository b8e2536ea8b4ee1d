//! Kubernetes bootstrap configuration for edge OS images
//!
//! Derives role-specific RKE2/K3s configuration documents from an image
//! definition, selects and downloads the release artefacts a node needs, and
//! renders the first-boot installer script.

pub mod combustion;
pub mod config;
pub mod definition;
pub mod error;
pub mod kubernetes;
pub mod templates;
pub mod utils;

pub use error::{KubernetesError, Result};
