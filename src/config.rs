//! Registry configuration: a serde JSON document plus `MOUNTREG_*` environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::TenantId;
use crate::error::RegistryResult;
use crate::method::Method;
use crate::mount::Mount;
use crate::pipeline::LifecyclePhase;
use crate::remote::RemoteConfiguration;
use crate::system_paths::LOCAL_BASE_PATH;

pub const ENV_NODE_ID: &str = "MOUNTREG_NODE_ID";
pub const ENV_READ_ONLY: &str = "MOUNTREG_READ_ONLY";
pub const ENV_CACHE: &str = "MOUNTREG_CACHE";
pub const ENV_CONFIG: &str = "MOUNTREG_CONFIG";

pub type Properties = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub class: String,
    #[serde(default)]
    pub properties: Properties,
}

/// One configured handler registration, instantiated through the factory map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub class: String,
    /// `None` registers for every method.
    #[serde(default)]
    pub methods: Option<Vec<Method>>,
    #[serde(default)]
    pub phase: LifecyclePhase,
    /// Tenant for the tenant-specific phase.
    #[serde(default)]
    pub tenant: Option<TenantId>,
    #[serde(default)]
    pub properties: Properties,
    /// `None` matches every path.
    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

fn generated_node_id() -> String { format!("node-{}", Uuid::new_v4()) }

fn default_local_base() -> String { LOCAL_BASE_PATH.to_string() }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "generated_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub cache_enabled: bool,
    #[serde(default = "default_local_base")]
    pub local_base_path: String,
    /// Overrides the storage engine's own connection id in cache keys.
    #[serde(default)]
    pub connection_id: Option<String>,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub remote_instances: Vec<RemoteConfiguration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_id: generated_node_id(),
            read_only: false,
            cache_enabled: false,
            local_base_path: default_local_base(),
            connection_id: None,
            handlers: Vec::new(),
            mounts: Vec::new(),
            remote_instances: Vec::new(),
        }
    }
}

impl RegistryConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let cfg: RegistryConfig = serde_json::from_str(&text)?;
        info!(
            target: "mountreg::config",
            "loaded '{}': node_id={} handlers={} mounts={} remotes={}",
            path.as_ref().display(), cfg.node_id, cfg.handlers.len(), cfg.mounts.len(), cfg.remote_instances.len()
        );
        Ok(cfg)
    }

    /// File named by `MOUNTREG_CONFIG` (else defaults), then the other overrides.
    pub fn from_env() -> RegistryResult<Self> {
        let mut cfg = match env::var(ENV_CONFIG) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim())?,
            _ => Self::default(),
        };
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Ok(node) = env::var(ENV_NODE_ID) {
            if !node.trim().is_empty() {
                self.node_id = node.trim().to_string();
            }
        }
        if let Some(b) = parse_bool_env(ENV_READ_ONLY) {
            self.read_only = b;
        }
        if let Some(b) = parse_bool_env(ENV_CACHE) {
            self.cache_enabled = b;
        }
        debug!(target: "mountreg::config", "effective node_id={} read_only={} cache={}", self.node_id, self.read_only, self.cache_enabled);
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfiguration) -> Self {
        self.remote_instances.push(remote);
        self
    }

    pub fn with_handler(mut self, handler: HandlerConfig) -> Self {
        self.handlers.push(handler);
        self
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_bool_env(name: &str) -> Option<bool> { env::var(name).ok().and_then(|v| parse_bool(&v)) }

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
