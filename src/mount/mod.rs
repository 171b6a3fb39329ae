//! Mounts: symbolic links to another local subtree and remote mounts onto another registry
//! instance. `MountRegistry` owns the live handler registrations behind them plus the
//! bookkeeping that lets them be recreated after a restart.

use serde::{Deserialize, Serialize};

use crate::path::normalize_path;

mod bootstrap;
mod registry;

pub use registry::{ActiveMount, MountRegistry};

/// Where a mount point redirects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    /// Another subtree of the same registry and tenant.
    Local { target: String },
    /// A configured remote instance, offset by `sub_path` inside its chroot.
    Remote { instance_id: String, sub_path: String },
}

impl LinkTarget {
    pub fn local(target: &str) -> Self { LinkTarget::Local { target: normalize_path(target) } }

    pub fn remote(instance_id: impl Into<String>, sub_path: &str) -> Self {
        LinkTarget::Remote { instance_id: instance_id.into(), sub_path: normalize_path(sub_path) }
    }

    pub fn is_remote(&self) -> bool { matches!(self, LinkTarget::Remote { .. }) }

    /// Target path (local) or sub path (remote).
    pub fn sub_path(&self) -> &str {
        match self {
            LinkTarget::Local { target } => target,
            LinkTarget::Remote { sub_path, .. } => sub_path,
        }
    }
}

/// Persisted mount descriptor, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub path: String,
    /// Empty for a symbolic link, else the id of a configured remote instance.
    #[serde(default)]
    pub instance_id: String,
    pub target_sub_path: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub r#virtual: bool,
    /// Remote mounts only: register once for every tenant instead of per tenant.
    #[serde(default)]
    pub for_all_tenants: bool,
}

impl Mount {
    pub fn symlink(path: &str, target: &str) -> Self {
        Self {
            path: normalize_path(path),
            instance_id: String::new(),
            target_sub_path: normalize_path(target),
            overwrite: false,
            r#virtual: false,
            for_all_tenants: false,
        }
    }

    pub fn remote(path: &str, instance_id: impl Into<String>, sub_path: &str) -> Self {
        Self { instance_id: instance_id.into(), ..Self::symlink(path, sub_path) }
    }

    pub fn overwriting(mut self) -> Self {
        self.overwrite = true;
        self
    }

    pub fn virtualized(mut self) -> Self {
        self.r#virtual = true;
        self
    }

    pub fn for_all_tenants(mut self) -> Self {
        self.for_all_tenants = true;
        self
    }

    pub fn is_remote(&self) -> bool { !self.instance_id.is_empty() }

    pub fn target(&self) -> LinkTarget {
        if self.is_remote() {
            LinkTarget::remote(self.instance_id.clone(), &self.target_sub_path)
        } else {
            LinkTarget::local(&self.target_sub_path)
        }
    }
}
