use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::context::{TenantId, SUPER_TENANT_ID};
use crate::error::{RegistryError, RegistryResult};
use crate::handlers::{MountHandler, SymLinkHandler};
use crate::path::{is_under, normalize_path, rebase, ResourcePath};
use crate::pipeline::{Handler, HandlerManager, LifecyclePhase, MountFilter, Registration};
use crate::registry::MAX_REDIRECT_DEPTH;
use crate::remote::{RemoteConfiguration, RemoteConnector};
use crate::resource::{props, Resource};
use crate::storage::{ensure_parents, StorageEngine};
use crate::system_paths::{is_mount_bookkeeping, mount_marker_path};

use super::{LinkTarget, Mount};

/// `None` scope means the mount applies to every tenant.
type Scope = Option<TenantId>;

/// A live mount and the pipeline registration behind it.
#[derive(Clone)]
pub struct ActiveMount {
    pub path: String,
    pub target: LinkTarget,
    pub author: String,
    pub tenant: Scope,
    pub phase: LifecyclePhase,
    handler: Arc<dyn Handler>,
}

impl Debug for ActiveMount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveMount")
            .field("path", &self.path)
            .field("target", &self.target)
            .field("author", &self.author)
            .field("tenant", &self.tenant)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Installs and removes mount handlers and keeps the arena of live mounts, keyed by
/// `(scope, mount path)` so a mount path has at most one live redirection per scope.
pub struct MountRegistry {
    pub(super) storage: Arc<dyn StorageEngine>,
    handlers: Arc<HandlerManager>,
    remotes: RwLock<BTreeMap<String, RemoteConfiguration>>,
    connector: Arc<dyn RemoteConnector>,
    active: Mutex<BTreeMap<(Scope, String), ActiveMount>>,
}

impl MountRegistry {
    pub fn new(
        storage: Arc<dyn StorageEngine>,
        handlers: Arc<HandlerManager>,
        remotes: impl IntoIterator<Item = RemoteConfiguration>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        Self {
            storage,
            handlers,
            remotes: RwLock::new(remotes.into_iter().map(|r| (r.id.clone(), r)).collect()),
            connector,
            active: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn add_remote(&self, config: RemoteConfiguration) { self.remotes.write().insert(config.id.clone(), config); }

    pub fn remote(&self, id: &str) -> Option<RemoteConfiguration> { self.remotes.read().get(id).cloned() }

    pub fn remotes(&self) -> Vec<RemoteConfiguration> { self.remotes.read().values().cloned().collect() }

    /// Live mounts visible to `tenant` (its own plus all-tenant ones), ordered by path.
    pub fn active(&self, tenant: TenantId) -> Vec<ActiveMount> {
        let mut out: Vec<ActiveMount> = self
            .active
            .lock()
            .values()
            .filter(|m| m.tenant.is_none() || m.tenant == Some(tenant))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    /// Whether `path` lies at or below a live mount visible to `tenant`.
    pub fn covers(&self, tenant: TenantId, path: &str) -> bool {
        self.active
            .lock()
            .values()
            .any(|m| (m.tenant.is_none() || m.tenant == Some(tenant)) && is_under(&m.path, path))
    }

    pub fn len(&self) -> usize { self.active.lock().len() }

    pub fn is_empty(&self) -> bool { self.active.lock().is_empty() }

    fn check_mount_path(path: &str) -> RegistryResult<()> {
        if is_mount_bookkeeping(path) {
            return Err(RegistryError::mount(format!("'{path}' is reserved for mount bookkeeping")));
        }
        Ok(())
    }

    /// Reject targets that would lead a redirect back under `path`, following live symlinks.
    fn check_cycle(active: &BTreeMap<(Scope, String), ActiveMount>, tenant: TenantId, path: &str, target: &str) -> RegistryResult<()> {
        if is_under(path, target) {
            return Err(RegistryError::mount(format!("link '{path}' cannot target '{target}' inside itself")));
        }
        let mut current = target.to_string();
        for _ in 0..MAX_REDIRECT_DEPTH {
            let hop = active
                .iter()
                .filter(|((scope, p), _)| p != path && (scope.is_none() || *scope == Some(tenant)))
                .filter_map(|((_, p), m)| match &m.target {
                    LinkTarget::Local { target } if is_under(p, &current) => Some((p, target)),
                    _ => None,
                })
                .max_by_key(|(p, _)| p.len())
                .and_then(|(p, t)| rebase(&current, p, t));
            match hop {
                None => return Ok(()),
                Some(next) if is_under(path, &next) => {
                    return Err(RegistryError::mount(format!("link '{path}' -> '{target}' forms a cycle through '{next}'")));
                }
                Some(next) => current = next,
            }
        }
        Err(RegistryError::mount(format!("link '{path}' -> '{target}' resolves through too many links")))
    }

    /// Register `handler` for `(scope, path)`. Returns false when the same target is already live.
    fn activate(
        &self,
        active: &mut BTreeMap<(Scope, String), ActiveMount>,
        scope: Scope,
        path: &str,
        target: LinkTarget,
        author: &str,
        handler: Arc<dyn Handler>,
    ) -> RegistryResult<bool> {
        let key = (scope, path.to_string());
        if let Some(existing) = active.get(&key) {
            if existing.target == target {
                debug!(target: "mountreg::mount", "mount '{}' already active for {:?}", path, scope);
                return Ok(false);
            }
            self.handlers.remove_handler(&existing.handler, existing.phase, existing.tenant);
            info!(target: "mountreg::mount", "replaced stale mount '{}' ({:?}) for {:?}", path, existing.target, scope);
            active.remove(&key);
        }
        let filter = Arc::new(MountFilter::new(path)?);
        let (registration, phase) = match scope {
            Some(tenant) => (Registration::new(filter, handler.clone()).for_tenant(tenant), LifecyclePhase::TenantSpecific),
            None => (Registration::new(filter, handler.clone()).in_phase(LifecyclePhase::UserDefined), LifecyclePhase::UserDefined),
        };
        self.handlers.add(registration)?;
        info!(target: "mountreg::mount", "mounted '{}' -> {:?} for {:?} by '{}'", path, target, scope, author);
        active.insert(key, ActiveMount { path: path.to_string(), target, author: author.to_string(), tenant: scope, phase, handler });
        Ok(true)
    }

    /// Install a symbolic link handler for one tenant. Returns whether a registration was added.
    pub fn install_symbolic_link(&self, tenant: TenantId, path: &str, target: &str, author: &str) -> RegistryResult<bool> {
        let path = normalize_path(path);
        let target = normalize_path(target);
        Self::check_mount_path(&path)?;
        let mut active = self.active.lock();
        Self::check_cycle(&active, tenant, &path, &target)?;
        let handler: Arc<dyn Handler> = Arc::new(SymLinkHandler::new(path.clone(), target.clone(), author));
        self.activate(&mut active, Some(tenant), &path, LinkTarget::Local { target }, author, handler)
    }

    /// Install a remote mount handler. Unknown instance ids are logged and register nothing.
    pub fn install_remote_mount(
        &self,
        tenant: TenantId,
        path: &str,
        instance_id: &str,
        sub_path: &str,
        author: &str,
        for_all_tenants: bool,
    ) -> RegistryResult<bool> {
        let path = normalize_path(path);
        let sub_path = normalize_path(sub_path);
        Self::check_mount_path(&path)?;
        let Some(config) = self.remote(instance_id) else {
            warn!(target: "mountreg::mount", "remote instance '{}' for mount '{}' is not configured; mount skipped", instance_id, path);
            return Ok(false);
        };
        let target = LinkTarget::Remote { instance_id: instance_id.to_string(), sub_path: sub_path.clone() };
        let mut active = self.active.lock();
        if active.get(&(None, path.clone())).map(|g| g.target == target).unwrap_or(false) {
            return Ok(false);
        }
        let scope = if for_all_tenants { None } else { Some(tenant) };
        let handler: Arc<dyn Handler> = Arc::new(MountHandler::new(path.clone(), sub_path, author, config, self.connector.clone()));
        self.activate(&mut active, scope, &path, target, author, handler)
    }

    pub(super) fn install(&self, tenant: TenantId, mount: &Mount, author: &str) -> RegistryResult<bool> {
        match mount.target() {
            LinkTarget::Local { target } => self.install_symbolic_link(tenant, &mount.path, &target, author),
            LinkTarget::Remote { instance_id, sub_path } => {
                self.install_remote_mount(tenant, &mount.path, &instance_id, &sub_path, author, mount.for_all_tenants)
            }
        }
    }

    /// Drop the live registration for `path` in the tenant's scope (and the global scope for the
    /// super tenant). Returns whether anything was removed.
    fn uninstall(&self, tenant: TenantId, path: &str) -> bool {
        let mut active = self.active.lock();
        let mut scopes = vec![Some(tenant)];
        if tenant == SUPER_TENANT_ID {
            scopes.push(None);
        }
        let mut removed = false;
        for scope in scopes {
            if let Some(m) = active.remove(&(scope, path.to_string())) {
                self.handlers.remove_handler(&m.handler, m.phase, m.tenant);
                info!(target: "mountreg::mount", "unmounted '{}' ({:?}) for {:?}", path, m.target, scope);
                removed = true;
            }
        }
        removed
    }

    pub(super) fn placeholder(path: &str, target: &LinkTarget, author: &str) -> Resource {
        let mut r = Resource::new()
            .with_property(props::LINK, "true")
            .with_property(props::MOUNT_POINT, path)
            .with_property(props::AUTHOR, author);
        r.author = author.to_string();
        match target {
            LinkTarget::Local { target } => r.set_property(props::TARGET_POINT, target.clone()),
            LinkTarget::Remote { instance_id, sub_path } => {
                r.set_property(props::MOUNT, "true");
                r.set_property(props::INSTANCE, instance_id.clone());
                r.set_property(props::SUB_PATH, sub_path.clone());
                r.set_property(props::TARGET_POINT, sub_path.clone());
            }
        }
        r
    }

    fn write_placeholder(&self, tenant: TenantId, path: &str, placeholder: Resource) -> RegistryResult<()> {
        ensure_parents(self.storage.as_ref(), tenant, path)?;
        self.storage.put(tenant, path, placeholder)?;
        Ok(())
    }

    pub(super) fn link(&self, tenant: TenantId, path: &str, target: &LinkTarget, author: &str, for_all_tenants: bool) -> RegistryResult<()> {
        let path = normalize_path(path);
        Self::check_mount_path(&path)?;
        match target {
            LinkTarget::Local { target } => {
                self.install_symbolic_link(tenant, &path, target, author)?;
            }
            LinkTarget::Remote { instance_id, sub_path } => {
                if self.remote(instance_id).is_none() {
                    return Err(RegistryError::mount(format!("unknown remote instance '{instance_id}' for link '{path}'")));
                }
                self.install_remote_mount(tenant, &path, instance_id, sub_path, author, for_all_tenants)?;
            }
        }
        if let Err(e) = self.write_placeholder(tenant, &path, Self::placeholder(&path, target, author)) {
            self.uninstall(tenant, &path);
            return Err(e);
        }
        Ok(())
    }

    /// Install a link and persist its placeholder at `path`.
    pub fn create_link(&self, tenant: TenantId, path: &str, target: &LinkTarget, author: &str) -> RegistryResult<()> {
        self.link(tenant, path, target, author, false)
    }

    /// Placeholder-backed link for tenants that cannot register cross-tenant handlers directly:
    /// the placeholder records the descriptor and the handler is restored from it.
    pub fn create_pseudo_link(&self, tenant: TenantId, mount: &Mount, author: &str) -> RegistryResult<()> {
        let path = normalize_path(&mount.path);
        Self::check_mount_path(&path)?;
        let restoration = serde_json::to_string(mount)?;
        let placeholder = Self::placeholder(&path, &mount.target(), author)
            .with_property(props::NON_RECURSIVE, "true")
            .with_property(props::LINK_RESTORATION, restoration);
        self.install(tenant, mount, author)?;
        if let Err(e) = self.write_placeholder(tenant, &path, placeholder) {
            self.uninstall(tenant, &path);
            return Err(e);
        }
        debug!(target: "mountreg::mount", "pseudo-link '{}' for tenant {}", path, tenant);
        Ok(())
    }

    /// Deregister the handler and delete the placeholder and fixed-mount marker.
    pub fn remove_link(&self, tenant: TenantId, path: &str) -> RegistryResult<()> {
        let path = normalize_path(path);
        let unmounted = self.uninstall(tenant, &path);
        let placeholder = self.storage.get(tenant, &ResourcePath::new(&path))?.filter(Resource::is_link);
        if placeholder.is_some() {
            self.storage.delete(tenant, &path)?;
        }
        let marker = self.storage.delete(tenant, &mount_marker_path(&path))?;
        if !unmounted && placeholder.is_none() && !marker {
            return Err(RegistryError::not_found(path));
        }
        Ok(())
    }

    /// Deregister every live mount; used on shutdown.
    pub fn clear(&self) {
        let mut active = self.active.lock();
        for m in active.values() {
            self.handlers.remove_handler(&m.handler, m.phase, m.tenant);
        }
        active.clear();
    }
}
