//! Remote registry instances reachable through remote mounts.
//!
//! The wire protocol is not ours to define: a `RemoteConnector` turns a `RemoteConfiguration`
//! into a `RemoteTarget`, and the mount handler only ever talks to that trait.
//! `InProcessConnector` reaches other `RegistryContext`s living in the same process.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::{Operation, Reply, SUPER_TENANT_ID};
use crate::error::{RegistryError, RegistryResult};
use crate::path::{ResourcePath, ROOT_PATH};
use crate::registry::{Registry, RegistryContext};

fn default_chroot() -> String { ROOT_PATH.to_string() }

/// Connection settings for one remote registry instance, looked up by `id`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfiguration {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub trusted_user: String,
    #[serde(default)]
    pub trusted_password: String,
    #[serde(default)]
    pub db_config: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub cache_enabled: bool,
    /// Subtree of the remote instance the mount is confined to.
    #[serde(default = "default_chroot")]
    pub chroot: String,
}

impl RemoteConfiguration {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            trusted_user: String::new(),
            trusted_password: String::new(),
            db_config: String::new(),
            read_only: false,
            cache_enabled: false,
            chroot: default_chroot(),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_chroot(mut self, chroot: impl Into<String>) -> Self {
        self.chroot = chroot.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.trusted_user = user.into();
        self.trusted_password = password.into();
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}

impl Debug for RemoteConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfiguration")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("trusted_user", &self.trusted_user)
            .field("trusted_password", &"***")
            .field("db_config", &self.db_config)
            .field("read_only", &self.read_only)
            .field("cache_enabled", &self.cache_enabled)
            .field("chroot", &self.chroot)
            .finish()
    }
}

/// A connected remote instance. Paths are absolute in the remote's namespace.
pub trait RemoteTarget: Send + Sync {
    fn execute(&self, path: ResourcePath, operation: Operation) -> RegistryResult<Reply>;
}

pub trait RemoteConnector: Send + Sync {
    fn connect(&self, config: &RemoteConfiguration) -> RegistryResult<Arc<dyn RemoteTarget>>;
}

impl RemoteTarget for Registry {
    fn execute(&self, path: ResourcePath, operation: Operation) -> RegistryResult<Reply> {
        self.execute_path(path, operation)
    }
}

struct Instance {
    context: Arc<RegistryContext>,
    password: Option<String>,
}

/// Connector for registry instances hosted in the same process, addressed by URL.
#[derive(Default)]
pub struct InProcessConnector {
    instances: RwLock<HashMap<String, Instance>>,
}

impl InProcessConnector {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, url: impl Into<String>, context: Arc<RegistryContext>) {
        self.instances.write().insert(url.into(), Instance { context, password: None });
    }

    /// Like `register`, but connections must present `password` as the trusted password.
    pub fn register_secured(&self, url: impl Into<String>, context: Arc<RegistryContext>, password: impl Into<String>) {
        self.instances.write().insert(url.into(), Instance { context, password: Some(password.into()) });
    }

    pub fn unregister(&self, url: &str) -> bool { self.instances.write().remove(url).is_some() }
}

impl RemoteConnector for InProcessConnector {
    fn connect(&self, config: &RemoteConfiguration) -> RegistryResult<Arc<dyn RemoteTarget>> {
        let context = {
            let guard = self.instances.read();
            let instance = guard
                .get(&config.url)
                .ok_or_else(|| RegistryError::failed(format!("remote instance '{}' at '{}' is unreachable", config.id, config.url)))?;
            if let Some(expected) = &instance.password {
                if expected != &config.trusted_password {
                    return Err(RegistryError::permission(format!("remote instance '{}' rejected the trusted credentials", config.id)));
                }
            }
            instance.context.clone()
        };
        let user = if config.trusted_user.is_empty() { "remote" } else { config.trusted_user.as_str() };
        debug!(target: "mountreg::mount", "connect remote id='{}' url='{}' user='{}'", config.id, config.url, user);
        let registry = context.registry(SUPER_TENANT_ID, user)?;
        Ok(Arc::new(registry))
    }
}
