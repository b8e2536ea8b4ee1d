//! Accumulation of API addresses into `tls-san`

use super::document::{ConfigWarning, KubernetesConfig, TlsSan};

/// How repeated addresses are handled when merging into `tls-san`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsSanPolicy {
    /// Always append, even if the address is already listed.
    #[default]
    Append,
    /// Skip addresses that are already present.
    Deduplicate,
}

/// Append `address` to the document's `tls-san` list.
///
/// An empty address is skipped with a warning. A string value is split on
/// commas first. Values of any other type are discarded and replaced by a list
/// holding only `address`. Calling this twice with the same address lists it
/// twice.
pub fn append_tls_san(config: &mut KubernetesConfig, address: &str) -> Option<ConfigWarning> {
    merge_tls_san(config, address, TlsSanPolicy::Append)
}

/// Same as [`append_tls_san`] with an explicit duplicate policy.
pub fn merge_tls_san(
    config: &mut KubernetesConfig,
    address: &str,
    policy: TlsSanPolicy,
) -> Option<ConfigWarning> {
    if address.is_empty() {
        return Some(ConfigWarning::EmptyTlsSanAddress);
    }

    let (mut list, warning) = take_as_list(config);
    if policy == TlsSanPolicy::Append || !list.iter().any(|existing| existing == address) {
        list.push(address.to_string());
    }
    config.tls_san = TlsSan::List(list);

    warning
}

/// Convert any string form of `tls-san` into a list without adding entries.
///
/// Unsupported values are discarded with a warning.
pub fn normalize_tls_san(config: &mut KubernetesConfig) -> Option<ConfigWarning> {
    if config.tls_san == TlsSan::Absent {
        return None;
    }
    let (list, warning) = take_as_list(config);
    config.tls_san = TlsSan::List(list);
    warning
}

fn take_as_list(config: &mut KubernetesConfig) -> (Vec<String>, Option<ConfigWarning>) {
    match std::mem::take(&mut config.tls_san) {
        TlsSan::Absent => (Vec::new(), None),
        TlsSan::Single(value) => (split_addresses(&value), None),
        TlsSan::List(list) => (list, None),
        TlsSan::Other(value) => (
            Vec::new(),
            Some(ConfigWarning::DiscardedTlsSan(format!("{value:?}"))),
        ),
    }
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
