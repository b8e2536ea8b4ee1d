//! Embedded Tera templates for the installer script and VIP manifest

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::{KubernetesError, Result};

pub const SINGLE_NODE_INSTALLER: &str = "single-node-installer.sh";
pub const MULTI_NODE_INSTALLER: &str = "multi-node-installer.sh";
pub const VIP_MANIFEST: &str = "k8s-vip.yaml";
pub const SELINUX_REPOSITORY: &str = "selinux.repo";

/// Templates compiled into the binary as `(name, content)` pairs.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    (
        SINGLE_NODE_INSTALLER,
        include_str!("single-node-installer.sh.tera"),
    ),
    (
        MULTI_NODE_INSTALLER,
        include_str!("multi-node-installer.sh.tera"),
    ),
    (VIP_MANIFEST, include_str!("k8s-vip.yaml.tera")),
    (SELINUX_REPOSITORY, include_str!("selinux.repo.tera")),
];

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Load every embedded template.
    pub fn from_embedded() -> Result<Self> {
        let mut tera = Tera::default();
        for (name, content) in ALL_TEMPLATES {
            tera.add_raw_template(name, content)
                .map_err(|source| KubernetesError::Render {
                    template: name.to_string(),
                    source,
                })?;
            tracing::debug!(template = name, "loaded embedded template");
        }
        Ok(Self { tera })
    }

    /// Render `name` with the fields of `values` as the template context.
    pub fn render<T: Serialize>(&self, name: &str, values: &T) -> Result<String> {
        let to_error = |source| KubernetesError::Render {
            template: name.to_string(),
            source,
        };
        let context = Context::from_serialize(values).map_err(to_error)?;
        self.tera.render(name, &context).map_err(to_error)
    }
}
