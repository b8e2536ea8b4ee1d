//! Kubernetes configuration documents (`server.yaml`, `agent.yaml`)
//!
//! The engine understands four reserved keys: `token`, `cni`, `server` and
//! `tls-san`. Every other key is an engine option passed through untouched.
//! `cni` and `tls-san` may be written either as a string or as a list, so both
//! are resolved into tagged variants when the document is parsed.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use yaml_rust::yaml::Hash;
use yaml_rust::{Yaml, YamlEmitter, YamlLoader};

use crate::error::{KubernetesError, Result};

pub const TOKEN_KEY: &str = "token";
pub const CNI_KEY: &str = "cni";
pub const SERVER_KEY: &str = "server";
pub const TLS_SAN_KEY: &str = "tls-san";

/// Value of the `cni` key as it was written.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CniSetting {
    #[default]
    Absent,
    /// A single plugin, or a comma separated list of plugins.
    Single(String),
    List(Vec<String>),
    /// Anything else, kept so that normalization can report it.
    Other(Yaml),
}

impl CniSetting {
    fn from_yaml(value: Yaml) -> Self {
        match value {
            Yaml::Null => CniSetting::Absent,
            Yaml::String(s) => CniSetting::Single(s),
            Yaml::Array(items) => {
                if items.iter().all(|item| item.as_str().is_some()) {
                    CniSetting::List(
                        items
                            .into_iter()
                            .filter_map(|item| item.into_string())
                            .collect(),
                    )
                } else {
                    CniSetting::Other(Yaml::Array(items))
                }
            }
            other => CniSetting::Other(other),
        }
    }

    fn to_yaml(&self) -> Option<Yaml> {
        match self {
            CniSetting::Absent => None,
            CniSetting::Single(s) => Some(Yaml::String(s.clone())),
            CniSetting::List(items) => Some(string_array(items)),
            CniSetting::Other(value) => Some(value.clone()),
        }
    }
}

/// Value of the `tls-san` key as it was written.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TlsSan {
    #[default]
    Absent,
    /// Comma separated addresses.
    Single(String),
    /// A list of scalars; non-string scalars are kept in their textual form.
    List(Vec<String>),
    /// Unsupported shape (mapping, nested list, bare number...).
    Other(Yaml),
}

impl TlsSan {
    fn from_yaml(value: Yaml) -> Self {
        match value {
            Yaml::Null => TlsSan::Absent,
            Yaml::String(s) => TlsSan::Single(s),
            Yaml::Array(items) => {
                let scalars: Option<Vec<String>> = items.iter().map(scalar_string).collect();
                match scalars {
                    Some(list) => TlsSan::List(list),
                    None => TlsSan::Other(Yaml::Array(items)),
                }
            }
            other => TlsSan::Other(other),
        }
    }

    fn to_yaml(&self) -> Option<Yaml> {
        match self {
            TlsSan::Absent => None,
            TlsSan::Single(s) => Some(Yaml::String(s.clone())),
            TlsSan::List(items) => Some(string_array(items)),
            TlsSan::Other(value) => Some(value.clone()),
        }
    }

    /// Addresses when the value is a list, `None` for any other shape.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            TlsSan::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Non-fatal conditions found while deriving configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// An empty address was offered to `tls-san` and skipped.
    EmptyTlsSanAddress,
    /// The existing `tls-san` value had an unsupported type and was replaced.
    DiscardedTlsSan(String),
    /// A multi-node cluster has no API VIP, so no join address was set.
    MissingApiVip,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::EmptyTlsSanAddress => {
                write!(f, "empty address, skipping adding it to {TLS_SAN_KEY}")
            }
            ConfigWarning::DiscardedTlsSan(value) => write!(
                f,
                "ignoring invalid {TLS_SAN_KEY} value {value}, replacing it with a new list"
            ),
            ConfigWarning::MissingApiVip => write!(
                f,
                "no API VIP configured, agents and secondary servers will not have a join address"
            ),
        }
    }
}

/// A server or agent configuration document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KubernetesConfig {
    pub token: Option<String>,
    pub cni: CniSetting,
    pub server: Option<String>,
    pub tls_san: TlsSan,
    extra: BTreeMap<String, Yaml>,
}

impl KubernetesConfig {
    /// Load a document from disk. A missing file yields an empty document.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(KubernetesError::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_yaml_str(&contents).map_err(|reason| KubernetesError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse a document from YAML text.
    pub fn from_yaml_str(contents: &str) -> std::result::Result<Self, String> {
        let docs = YamlLoader::load_from_str(contents).map_err(|e| e.to_string())?;

        let hash = match docs.into_iter().next() {
            None | Some(Yaml::Null) => return Ok(Self::default()),
            Some(Yaml::Hash(hash)) => hash,
            Some(_) => return Err("expected a mapping at the top level".to_string()),
        };

        let mut config = Self::default();
        for (key, value) in hash {
            let key = match key {
                Yaml::String(key) => key,
                other => return Err(format!("unsupported non-string key {other:?}")),
            };

            match key.as_str() {
                TOKEN_KEY => config.token = reserved_scalar(TOKEN_KEY, &value)?,
                SERVER_KEY => config.server = reserved_scalar(SERVER_KEY, &value)?,
                CNI_KEY => config.cni = CniSetting::from_yaml(value),
                TLS_SAN_KEY => config.tls_san = TlsSan::from_yaml(value),
                _ => {
                    config.extra.insert(key, value);
                }
            }
        }

        Ok(config)
    }

    /// Pass-through option by key. Reserved keys are only reachable through
    /// their typed fields.
    pub fn get(&self, key: &str) -> Option<&Yaml> {
        self.extra.get(key)
    }

    /// Set a pass-through option. Reserved keys are rejected.
    pub fn insert(&mut self, key: impl Into<String>, value: Yaml) -> bool {
        let key = key.into();
        if is_reserved(&key) {
            return false;
        }
        self.extra.insert(key, value);
        true
    }

    /// Whether the document enables SELinux support (`selinux: true`).
    pub fn selinux_enabled(&self) -> bool {
        matches!(self.get("selinux"), Some(Yaml::Boolean(true)))
    }

    /// Build the YAML mapping, keys sorted.
    pub fn to_yaml(&self) -> Yaml {
        let mut entries: BTreeMap<String, Yaml> = self.extra.clone();
        if let Some(token) = &self.token {
            entries.insert(TOKEN_KEY.to_string(), Yaml::String(token.clone()));
        }
        if let Some(server) = &self.server {
            entries.insert(SERVER_KEY.to_string(), Yaml::String(server.clone()));
        }
        if let Some(cni) = self.cni.to_yaml() {
            entries.insert(CNI_KEY.to_string(), cni);
        }
        if let Some(tls_san) = self.tls_san.to_yaml() {
            entries.insert(TLS_SAN_KEY.to_string(), tls_san);
        }

        let mut hash = Hash::new();
        for (key, value) in entries {
            hash.insert(Yaml::String(key), value);
        }
        Yaml::Hash(hash)
    }

    pub fn to_yaml_string(&self) -> std::result::Result<String, yaml_rust::EmitError> {
        let mut out = String::new();
        let mut emitter = YamlEmitter::new(&mut out);
        emitter.dump(&self.to_yaml())?;
        out.push('\n');
        Ok(out)
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, TOKEN_KEY | CNI_KEY | SERVER_KEY | TLS_SAN_KEY)
}

fn reserved_scalar(key: &str, value: &Yaml) -> std::result::Result<Option<String>, String> {
    if value.is_null() {
        return Ok(None);
    }
    scalar_string(value)
        .map(Some)
        .ok_or_else(|| format!("'{key}' must be a scalar value"))
}

/// Textual form of a scalar YAML value.
pub(crate) fn scalar_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) | Yaml::Real(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_array(items: &[String]) -> Yaml {
    Yaml::Array(items.iter().cloned().map(Yaml::String).collect())
}
