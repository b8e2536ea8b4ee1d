//! CNI selection normalization

use super::document::{CniSetting, KubernetesConfig};
use crate::error::{KubernetesError, Result};

pub const CNI_DEFAULT: &str = "canal";
pub const CNI_NONE: &str = "none";
pub const CNI_CANAL: &str = "canal";
pub const CNI_CALICO: &str = "calico";
pub const CNI_CILIUM: &str = "cilium";
pub const CNI_MULTUS: &str = "multus";

/// Resolve the `cni` value of a server document into `(plugin, multus_enabled)`.
///
/// `multus` can only be combined with exactly one primary plugin and has to be
/// listed first.
pub fn extract_cni(config: &KubernetesConfig) -> Result<(String, bool)> {
    let entries: Vec<String> = match &config.cni {
        CniSetting::Single(value) => value.split(',').map(|s| s.trim().to_string()).collect(),
        CniSetting::List(values) => values.iter().map(|s| s.trim().to_string()).collect(),
        CniSetting::Other(value) => {
            return Err(KubernetesError::CniFormat(format!(
                "unsupported type {value:?}"
            )));
        }
        CniSetting::Absent => {
            return Err(KubernetesError::CniFormat("cni not configured".to_string()));
        }
    };

    match entries.as_slice() {
        [] => Err(KubernetesError::CniFormat("no cni specified".to_string())),
        [plugin] if plugin == CNI_MULTUS => Err(KubernetesError::CniFormat(
            "multus must be used alongside another primary cni selection".to_string(),
        )),
        [plugin] => Ok((plugin.clone(), false)),
        [first, plugin] if first == CNI_MULTUS => Ok((plugin.clone(), true)),
        [_, _] => Err(KubernetesError::CniFormat(
            "multiple cni values are only allowed if multus is the first one".to_string(),
        )),
        _ => Err(KubernetesError::CniFormat(format!(
            "unsupported cni setup: {}",
            entries.join(",")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> KubernetesConfig {
        KubernetesConfig::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn test_single_plugin() {
        assert_eq!(
            extract_cni(&config("cni: calico\n")).unwrap(),
            ("calico".to_string(), false)
        );
    }

    #[test]
    fn test_comma_separated_multus() {
        assert_eq!(
            extract_cni(&config("cni: multus, calico\n")).unwrap(),
            ("calico".to_string(), true)
        );
    }

    #[test]
    fn test_list_multus() {
        assert_eq!(
            extract_cni(&config("cni:\n  - multus\n  - cilium\n")).unwrap(),
            ("cilium".to_string(), true)
        );
    }

    #[test]
    fn test_multus_alone_fails() {
        assert!(extract_cni(&config("cni: multus\n")).is_err());
        assert!(extract_cni(&config("cni: [multus]\n")).is_err());
    }

    #[test]
    fn test_multus_not_first_fails() {
        assert!(extract_cni(&config("cni: calico,multus\n")).is_err());
        assert!(extract_cni(&config("cni: [canal, calico]\n")).is_err());
    }

    #[test]
    fn test_three_entries_fail() {
        assert!(extract_cni(&config("cni: [multus, canal, calico]\n")).is_err());
    }

    #[test]
    fn test_unsupported_types_fail() {
        assert!(matches!(
            extract_cni(&config("cni: 6\n")),
            Err(KubernetesError::CniFormat(_))
        ));
        assert!(extract_cni(&config("cni: [multus, 6]\n")).is_err());
        assert!(extract_cni(&config("token: abc\n")).is_err());
    }
}
