//! Bootstrap reconciliation: recreate configured mounts once per tenant, idempotently across
//! restarts, using fixed-mount markers under the mount bookkeeping collection.

use tracing::{debug, error, info, warn};

use crate::context::{Operation, TenantId, SUPER_TENANT_ID};
use crate::error::{RegistryError, RegistryResult};
use crate::path::{normalize_path, ResourcePath};
use crate::registry::Registry;
use crate::resource::{props, Resource};
use crate::storage::{ensure_parents, SearchCriteria};
use crate::system_paths::{mount_marker_path, MOUNT_BOOKKEEPING_PATH};

use super::{Mount, MountRegistry};

impl MountRegistry {
    /// Whether the mount at `path` has been durably recorded for `tenant`.
    ///
    /// For the super tenant the marker must also record `target_path` as its sub path; for any
    /// other tenant an existing fixed marker is enough.
    pub fn is_fixed_mount(&self, tenant: TenantId, path: &str, target_path: &str) -> RegistryResult<bool> {
        let marker = self.storage.get(tenant, &ResourcePath::new(&mount_marker_path(path)))?;
        Ok(match marker {
            None => false,
            Some(m) if tenant == SUPER_TENANT_ID => {
                m.flag(props::MARKER_FIXED) && m.property(props::MARKER_SUB_PATH) == Some(normalize_path(target_path).as_str())
            }
            Some(m) => m.flag(props::MARKER_FIXED),
        })
    }

    /// Write (or rewrite) the fixed-mount marker for `mount`.
    pub fn mark_fixed(&self, tenant: TenantId, mount: &Mount, author: &str) -> RegistryResult<()> {
        let path = normalize_path(&mount.path);
        let target = normalize_path(&mount.target_sub_path);
        let marker = Resource::new()
            .with_property(props::MARKER_PATH, path.clone())
            .with_property(props::MARKER_TARGET, target.clone())
            .with_property(props::MARKER_SUB_PATH, target)
            .with_property(props::MARKER_AUTHOR, author)
            .with_property(props::MARKER_FIXED, "true")
            .with_property(props::MARKER_VIRTUAL, mount.r#virtual.to_string())
            .with_property(props::MARKER_INSTANCE, mount.instance_id.clone());
        let marker_path = mount_marker_path(&path);
        ensure_parents(self.storage.as_ref(), tenant, &marker_path)?;
        self.storage.put(tenant, &marker_path, marker)?;
        Ok(())
    }

    /// Real link for the super tenant, pseudo-link for everyone else.
    fn establish(&self, tenant: TenantId, mount: &Mount, author: &str) -> RegistryResult<()> {
        if tenant == SUPER_TENANT_ID {
            self.link(tenant, &mount.path, &mount.target(), author, mount.for_all_tenants)
        } else {
            self.create_pseudo_link(tenant, mount, author)
        }
    }

    /// Reconcile one descriptor. Returns whether a mount was newly established.
    pub fn setup_mount(&self, tenant: TenantId, mount: &Mount, author: &str) -> RegistryResult<bool> {
        let path = normalize_path(&mount.path);
        if mount.is_remote() && self.remote(&mount.instance_id).is_none() {
            warn!(target: "mountreg::mount", "mount '{}' names unknown remote instance '{}'; skipped", path, mount.instance_id);
            return Ok(false);
        }

        if self.is_fixed_mount(tenant, &path, &mount.target_sub_path)? {
            self.mark_fixed(tenant, mount, author)?;
            debug!(target: "mountreg::mount", "mount '{}' already fixed for tenant {}", path, tenant);
            return Ok(false);
        }

        let existing = self.storage.get(tenant, &ResourcePath::new(&path))?;
        match existing {
            None => {}
            Some(_) if mount.overwrite => {
                self.storage.delete(tenant, &path)?;
                info!(target: "mountreg::mount", "overwrote existing resource at mount '{}'", path);
            }
            Some(r) if mount.r#virtual => {
                if r.is_link() {
                    error!(target: "mountreg::mount", "virtual mount '{}' skipped: path is already a link", path);
                    return Ok(false);
                }
                self.install(tenant, mount, author)?;
                self.mark_fixed(tenant, mount, author)?;
                return Ok(true);
            }
            Some(_) => {
                error!(
                    target: "mountreg::mount",
                    "mount '{}' skipped: a resource already exists there and the mount is neither overwrite nor virtual",
                    path
                );
                return Ok(false);
            }
        }
        self.establish(tenant, mount, author)?;
        self.mark_fixed(tenant, mount, author)?;
        Ok(true)
    }

    /// Run `setup_mount` for every descriptor in order. One failing descriptor never blocks the
    /// rest. Returns how many mounts were newly established.
    pub fn setup_mounts(&self, registry: &Registry, mounts: &[Mount]) -> usize {
        let tenant = registry.tenant_id();
        let mut established = 0;
        for mount in mounts {
            match self.setup_mount(tenant, mount, registry.user()) {
                Ok(true) => established += 1,
                Ok(false) => {}
                Err(e) => error!(target: "mountreg::mount", "mount '{}' for tenant {} failed: {}", mount.path, tenant, e),
            }
            let probe = ResourcePath::new(&mount.path);
            if let Err(e) = registry.execute_path(probe, Operation::ResourceExists) {
                warn!(target: "mountreg::mount", "mount '{}' not reachable yet: {}", mount.path, e);
            }
        }
        established
    }

    /// Reinstall handlers for persisted placeholders and virtual markers of `tenant`.
    /// Already-live mounts are left alone. Returns how many were reinstalled.
    pub fn restore_links(&self, tenant: TenantId) -> RegistryResult<usize> {
        let mut restored = 0;
        let links = SearchCriteria::default().with_property(props::LINK, Some("true".to_string()));
        for path in self.storage.search(tenant, &links)? {
            let Some(placeholder) = self.storage.get(tenant, &ResourcePath::new(&path))? else { continue };
            match self.restore_link(tenant, &placeholder) {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => warn!(target: "mountreg::mount", "link '{}' not restored: {}", path, e),
            }
        }

        let virtuals = SearchCriteria::under(MOUNT_BOOKKEEPING_PATH).with_property(props::MARKER_VIRTUAL, Some("true".to_string()));
        for marker_path in self.storage.search(tenant, &virtuals)? {
            let Some(marker) = self.storage.get(tenant, &ResourcePath::new(&marker_path))? else { continue };
            let Some(mount) = Self::mount_from_marker(&marker) else { continue };
            let author = marker.property(props::MARKER_AUTHOR).unwrap_or_default().to_string();
            match self.install(tenant, &mount, &author) {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => warn!(target: "mountreg::mount", "virtual mount '{}' not restored: {}", mount.path, e),
            }
        }
        if restored > 0 {
            info!(target: "mountreg::mount", "restored {} link(s) for tenant {}", restored, tenant);
        }
        Ok(restored)
    }

    fn restore_link(&self, tenant: TenantId, placeholder: &Resource) -> RegistryResult<bool> {
        let author = placeholder.property(props::AUTHOR).unwrap_or(placeholder.author.as_str()).to_string();
        if let Some(json) = placeholder.property(props::LINK_RESTORATION) {
            let mount: Mount = serde_json::from_str(json)?;
            return self.install(tenant, &mount, &author);
        }
        let path = placeholder.property(props::MOUNT_POINT).map(normalize_path).unwrap_or_else(|| placeholder.path.clone());
        if placeholder.is_remote_mount() {
            let instance = placeholder
                .property(props::INSTANCE)
                .ok_or_else(|| RegistryError::mount(format!("remote link '{path}' has no instance id")))?;
            let sub_path = placeholder.property(props::SUB_PATH).unwrap_or("/");
            return self.install_remote_mount(tenant, &path, instance, sub_path, &author, false);
        }
        let target = placeholder
            .property(props::TARGET_POINT)
            .ok_or_else(|| RegistryError::mount(format!("link '{path}' has no target")))?;
        self.install_symbolic_link(tenant, &path, target, &author)
    }

    fn mount_from_marker(marker: &Resource) -> Option<Mount> {
        let path = marker.property(props::MARKER_PATH)?;
        let sub_path = marker.property(props::MARKER_SUB_PATH)?;
        let mut mount = match marker.property(props::MARKER_INSTANCE) {
            Some(id) if !id.is_empty() => Mount::remote(path, id.to_string(), sub_path),
            _ => Mount::symlink(path, sub_path),
        };
        mount.r#virtual = true;
        Some(mount)
    }
}
