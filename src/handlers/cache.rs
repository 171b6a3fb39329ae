//! Resource cache and the handler that fills and invalidates it.
//!
//! Entries are keyed by `(connection id, tenant, canonical path)`; paths under the node-local
//! base path also carry the node id, since nodes sharing one database must not share cache
//! entries for node-local data.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use xxhash_rust::xxh3::xxh3_64;

use crate::context::{Reply, RequestContext, TenantId};
use crate::method::Method;
use crate::path::{is_under, parent_of, PARAMETER_SEPARATOR};
use crate::pipeline::{Handler, LifecyclePhase, Outcome};
use crate::registry::Registry;
use crate::resource::Resource;
use crate::system_paths::is_local;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub connection_id: String,
    pub tenant_id: TenantId,
    /// Complete path, parameters included.
    pub path: String,
    /// Set only for node-local paths.
    pub node_id: Option<String>,
}

impl CacheKey {
    pub fn new(connection_id: &str, tenant_id: TenantId, complete_path: &str, node_id: &str, local_base: &str) -> Self {
        let plain = complete_path.split(PARAMETER_SEPARATOR).next().unwrap_or_default();
        Self {
            connection_id: connection_id.to_string(),
            tenant_id,
            path: complete_path.to_string(),
            node_id: is_local(local_base, plain).then(|| node_id.to_string()),
        }
    }

    fn plain_path(&self) -> &str { self.path.split(PARAMETER_SEPARATOR).next().unwrap_or_default() }

    /// Stable 64-bit digest, rendered as fixed-width lowercase hex.
    pub fn digest(&self) -> String {
        let mut buf = Vec::with_capacity(self.connection_id.len() + self.path.len() + 32);
        buf.extend_from_slice(self.connection_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&self.tenant_id.to_le_bytes());
        buf.extend_from_slice(self.path.as_bytes());
        buf.push(0);
        if let Some(node) = &self.node_id {
            buf.extend_from_slice(node.as_bytes());
        }
        format!("{:016x}", xxh3_64(&buf))
    }
}

/// Shared resource cache. Unbounded; entries leave only through invalidation.
#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: RwLock<HashMap<String, (CacheKey, Resource)>>,
}

impl ResourceCache {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &CacheKey) -> Option<Resource> {
        self.entries.read().get(&key.digest()).filter(|(k, _)| k == key).map(|(_, r)| r.clone())
    }

    pub fn insert(&self, key: CacheKey, resource: Resource) { self.entries.write().insert(key.digest(), (key, resource)); }

    /// Drop entries for `path`, its parent and its descendants (every version) in one tenant.
    pub fn invalidate(&self, connection_id: &str, tenant: TenantId, path: &str) -> usize {
        let parent = parent_of(path);
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, (k, _)| {
            if k.connection_id != connection_id || k.tenant_id != tenant {
                return true;
            }
            let p = k.plain_path();
            !(is_under(path, p) || parent.as_deref() == Some(p))
        });
        before - guard.len()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    pub fn clear(&self) { self.entries.write().clear(); }
}

/// Serves cached GETs in USER_DEFINED; populates and invalidates in REPORTING.
pub struct CachingHandler {
    cache: Arc<ResourceCache>,
    connection_id: String,
    node_id: String,
    local_base: String,
}

impl CachingHandler {
    pub fn new(cache: Arc<ResourceCache>, connection_id: impl Into<String>, node_id: impl Into<String>, local_base: impl Into<String>) -> Self {
        Self { cache, connection_id: connection_id.into(), node_id: node_id.into(), local_base: local_base.into() }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> { &self.cache }

    fn key(&self, ctx: &RequestContext) -> CacheKey {
        CacheKey::new(&self.connection_id, ctx.effective_tenant(), &ctx.path.complete_path(), &self.node_id, &self.local_base)
    }

    fn report(&self, ctx: &RequestContext) {
        let method = ctx.method();
        if method == Method::Get {
            // only storage results; redirected reads are cached under their target path
            if let (false, Some(Reply::Resource(r))) = (ctx.is_handled(), ctx.result.as_ref()) {
                self.cache.insert(self.key(ctx), r.clone());
            }
            return;
        }
        if !method.is_mutating() {
            return;
        }
        let tenant = ctx.effective_tenant();
        self.cache.invalidate(&self.connection_id, tenant, ctx.path.path());
        if let Some(target) = ctx.operation.target_path() {
            let plain = crate::path::normalize_path(target.split(PARAMETER_SEPARATOR).next().unwrap_or_default());
            self.cache.invalidate(&self.connection_id, tenant, &plain);
        }
    }
}

impl Handler for CachingHandler {
    fn name(&self) -> &str { "CachingHandler" }

    fn handle(&self, ctx: &mut RequestContext, _registry: &Registry) -> Outcome {
        match ctx.phase {
            LifecyclePhase::Reporting => {
                self.report(ctx);
                Outcome::Declined
            }
            _ if ctx.method() == Method::Get => match self.cache.get(&self.key(ctx)) {
                Some(hit) => Outcome::Handled(Reply::Resource(hit)),
                None => Outcome::Declined,
            },
            _ => Outcome::Declined,
        }
    }
}
