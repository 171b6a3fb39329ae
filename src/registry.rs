//! Registry context and the dispatcher façade.
//!
//! `RegistryContext` is built once per registry instance and owns every shared collaborator:
//! storage engine, handler pipeline, mount registry, simulation state, cache and node id.
//! `Registry` is a cheap per-session view (tenant, user, chroot) through which every public
//! operation is parsed, dispatched through the pipeline and, when no handler takes it,
//! executed against the storage engine.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::context::{ContextInfo, Operation, Reply, RequestContext, TenantId, SUPER_TENANT_ID};
use crate::error::{RegistryError, RegistryResult};
use crate::factory::{build_registrations, FactoryEnv};
use crate::handlers::query::criteria_from;
use crate::handlers::{CachingHandler, ResourceCache, StatisticsHandler};
use crate::method::Method;
use crate::mount::{LinkTarget, MountRegistry};
use crate::path::{is_root, is_under, normalize_path, parent_of, rebase, to_absolute, to_relative, ResourcePath, PARAMETER_SEPARATOR, PATH_SEPARATOR, ROOT_PATH};
use crate::pipeline::{HandlerManager, LifecyclePhase, PathPatternFilter, Registration, Simulation};
use crate::remote::{InProcessConnector, RemoteConnector};
use crate::resource::{props, Association, Comment, Resource, Tag};
use crate::storage::{ensure_parents, SearchCriteria, StorageEngine};

/// Nested re-dispatches deeper than this fail; a runtime guard against redirect cycles.
pub const MAX_REDIRECT_DEPTH: u8 = 16;

/// Author recorded for bootstrap work.
pub const SYSTEM_USER: &str = "system";

pub struct RegistryContext {
    config: RegistryConfig,
    storage: Arc<dyn StorageEngine>,
    handlers: Arc<HandlerManager>,
    simulation: Arc<Simulation>,
    mounts: MountRegistry,
    cache: Arc<ResourceCache>,
    statistics: Arc<StatisticsHandler>,
    /// Per-tenant bootstrap; concurrent sessions block until it completes.
    tenants: Mutex<HashMap<TenantId, Arc<OnceCell<()>>>>,
    started: AtomicBool,
}

impl Debug for RegistryContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryContext")
            .field("node_id", &self.config.node_id)
            .field("connection_id", &self.connection_id())
            .field("read_only", &self.config.read_only)
            .field("handlers", &self.handlers.len())
            .field("mounts", &self.mounts.len())
            .finish()
    }
}

impl RegistryContext {
    pub fn new(config: RegistryConfig, storage: Arc<dyn StorageEngine>) -> Arc<Self> {
        Self::with_connector(config, storage, Arc::new(InProcessConnector::new()))
    }

    pub fn with_connector(config: RegistryConfig, storage: Arc<dyn StorageEngine>, connector: Arc<dyn RemoteConnector>) -> Arc<Self> {
        let simulation = Arc::new(Simulation::new());
        let handlers = Arc::new(HandlerManager::new(simulation.clone()));
        let mounts = MountRegistry::new(storage.clone(), handlers.clone(), config.remote_instances.clone(), connector);
        Arc::new(Self {
            config,
            storage,
            handlers,
            simulation,
            mounts,
            cache: Arc::new(ResourceCache::new()),
            statistics: Arc::new(StatisticsHandler::new()),
            tenants: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &RegistryConfig { &self.config }
    pub fn storage(&self) -> &Arc<dyn StorageEngine> { &self.storage }
    pub fn handlers(&self) -> &Arc<HandlerManager> { &self.handlers }
    pub fn mounts(&self) -> &MountRegistry { &self.mounts }
    pub fn cache(&self) -> &Arc<ResourceCache> { &self.cache }
    pub fn node_id(&self) -> &str { &self.config.node_id }

    pub fn connection_id(&self) -> String {
        self.config.connection_id.clone().unwrap_or_else(|| self.storage.connection_id())
    }

    pub fn is_started(&self) -> bool { self.started.load(Ordering::Acquire) }

    /// Register built-in and configured handlers. Idempotent.
    pub fn init(&self) -> RegistryResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let env = FactoryEnv {
            simulation: self.simulation.clone(),
            cache: self.cache.clone(),
            connection_id: self.connection_id(),
            node_id: self.config.node_id.clone(),
            local_base_path: self.config.local_base_path.clone(),
        };
        for registration in build_registrations(&self.config.handlers, &env) {
            let name = registration.handler.name().to_string();
            if let Err(e) = self.handlers.add(registration) {
                warn!(target: "mountreg::registry", "skipping handler '{}': {}", name, e);
            }
        }

        let everything = || -> RegistryResult<Arc<PathPatternFilter>> { Ok(Arc::new(PathPatternFilter::new(".*")?)) };
        if self.config.cache_enabled {
            let caching = Arc::new(CachingHandler::new(self.cache.clone(), env.connection_id.clone(), env.node_id.clone(), env.local_base_path.clone()));
            self.handlers.add(Registration::new(everything()?, caching.clone()).for_methods([Method::Get]))?;
            self.handlers.add(Registration::new(everything()?, caching).in_phase(LifecyclePhase::Reporting))?;
        }
        self.handlers.add(Registration::new(everything()?, self.statistics.clone()).in_phase(LifecyclePhase::Reporting))?;
        info!(
            target: "mountreg::registry",
            "registry started node_id={} connection={} handlers={} read_only={}",
            self.config.node_id, env.connection_id, self.handlers.len(), self.config.read_only
        );
        Ok(())
    }

    /// Drop every registration and live mount, forget initialised tenants and flush storage.
    pub fn shutdown(&self) -> RegistryResult<()> {
        self.mounts.clear();
        self.handlers.clear();
        self.cache.clear();
        self.tenants.lock().clear();
        self.started.store(false, Ordering::Release);
        self.storage.flush()?;
        info!(target: "mountreg::registry", "registry stopped node_id={}", self.config.node_id);
        Ok(())
    }

    /// Run mount bootstrap for `tenant` the first time it is seen. Returns whether this call ran
    /// it. A failed bootstrap is retried by the next caller.
    pub fn initialize_tenant(self: &Arc<Self>, tenant: TenantId) -> RegistryResult<bool> {
        self.init()?;
        let cell = self.tenants.lock().entry(tenant).or_default().clone();
        let mut ran = false;
        cell.get_or_try_init(|| -> RegistryResult<()> {
            ran = true;
            let system = Registry::new(self.clone(), tenant, SYSTEM_USER);
            let established = self.mounts.setup_mounts(&system, &self.config.mounts);
            let restored = self.mounts.restore_links(tenant)?;
            info!(target: "mountreg::registry", "tenant {} initialised: {} mount(s) established, {} restored", tenant, established, restored);
            Ok(())
        })?;
        Ok(ran)
    }

    /// Session view for `tenant`, initialising the tenant on first use.
    pub fn registry(self: &Arc<Self>, tenant: TenantId, user: &str) -> RegistryResult<Registry> {
        self.initialize_tenant(tenant)?;
        Ok(Registry::new(self.clone(), tenant, user))
    }

    pub fn system_registry(self: &Arc<Self>) -> RegistryResult<Registry> { self.registry(SUPER_TENANT_ID, SYSTEM_USER) }

    pub fn start_simulation(&self) { self.simulation.start(); }

    pub fn stop_simulation(&self) { self.simulation.stop(); }

    pub fn simulation_status(&self) -> HashMap<String, Vec<String>> { self.simulation.status() }

    pub fn is_simulating(&self) -> bool { self.simulation.is_active() }

    pub fn statistics(&self) -> BTreeMap<Method, u64> { self.statistics.counts() }
}

fn strip_parameters(complete: &str) -> &str { complete.split(PARAMETER_SEPARATOR).next().unwrap_or_default() }

#[derive(Debug, Serialize, Deserialize)]
struct DumpEntry {
    /// Relative to the dump root.
    path: String,
    resource: Resource,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DumpDocument {
    root: String,
    entries: Vec<DumpEntry>,
}

/// Per-session dispatcher. Paths given to and returned from a `Registry` are relative to its
/// chroot.
#[derive(Clone)]
pub struct Registry {
    context: Arc<RegistryContext>,
    tenant_id: TenantId,
    caller_tenant_id: Option<TenantId>,
    user: String,
    chroot: String,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("tenant_id", &self.tenant_id)
            .field("caller_tenant_id", &self.caller_tenant_id)
            .field("user", &self.user)
            .field("chroot", &self.chroot)
            .finish()
    }
}

impl Registry {
    fn new(context: Arc<RegistryContext>, tenant_id: TenantId, user: &str) -> Self {
        Self { context, tenant_id, caller_tenant_id: None, user: user.to_string(), chroot: ROOT_PATH.to_string() }
    }

    pub fn context(&self) -> &Arc<RegistryContext> { &self.context }
    pub fn tenant_id(&self) -> TenantId { self.tenant_id }
    pub fn caller_tenant_id(&self) -> Option<TenantId> { self.caller_tenant_id }
    pub fn user(&self) -> &str { &self.user }
    pub fn chroot(&self) -> &str { &self.chroot }

    /// Same session confined to `chroot` (relative to this view's chroot).
    pub fn with_chroot(&self, chroot: &str) -> Self {
        Self { chroot: to_absolute(&self.chroot, chroot), ..self.clone() }
    }

    /// Same session acting on behalf of another tenant's data.
    pub fn as_caller(&self, tenant: TenantId) -> RegistryResult<Self> {
        self.context.initialize_tenant(tenant)?;
        Ok(Self { caller_tenant_id: Some(tenant), ..self.clone() })
    }

    pub fn new_resource(&self) -> Resource { self.context.storage.new_resource() }

    pub fn new_collection(&self) -> Resource { self.context.storage.new_collection() }

    /// Parse `raw_path` and run `operation` on it.
    pub fn execute(&self, raw_path: &str, operation: Operation) -> RegistryResult<Reply> {
        self.execute_path(ResourcePath::parse(raw_path)?, operation)
    }

    /// Run `operation` on an already parsed path relative to this view's chroot.
    pub fn execute_path(&self, path: ResourcePath, mut operation: Operation) -> RegistryResult<Reply> {
        if !is_root(&self.chroot) {
            operation.rebase_targets(ROOT_PATH, &self.chroot);
            match &mut operation {
                Operation::CreateLink { target: LinkTarget::Local { target } } => *target = to_absolute(&self.chroot, target),
                Operation::ExecuteQuery { parameters } => {
                    let under = parameters.get("under").map(String::as_str).unwrap_or(ROOT_PATH);
                    let under = to_absolute(&self.chroot, under);
                    parameters.insert("under".to_string(), under);
                }
                _ => {}
            }
        }
        let searching = matches!(operation.method(), Method::GetResourcePathsWithTag | Method::ExecuteQuery | Method::SearchContent);
        let mut ctx = RequestContext::new(path.to_absolute(&self.chroot), operation, self.tenant_id, self.user.clone());
        ctx.caller_tenant_id = self.caller_tenant_id;
        let reply = self.run(ctx)?;
        if is_root(&self.chroot) {
            return Ok(reply);
        }
        let reply = match reply {
            // search hits outside the chroot are not part of this view
            Reply::Paths(paths) if searching => {
                Reply::Paths(paths.into_iter().filter(|p| is_under(&self.chroot, strip_parameters(p))).collect())
            }
            other => other,
        };
        Ok(reply.map_paths(|p| to_relative(&self.chroot, p)))
    }

    /// Re-enter the dispatcher with a context built by a redirecting handler. Paths are absolute.
    pub fn redirect(&self, ctx: RequestContext) -> RegistryResult<Reply> { self.run(ctx) }

    fn run(&self, mut ctx: RequestContext) -> RegistryResult<Reply> {
        if ctx.depth > MAX_REDIRECT_DEPTH {
            return Err(RegistryError::failed(format!(
                "{} on '{}' exceeded {} nested redirects",
                ctx.method(),
                ctx.path,
                MAX_REDIRECT_DEPTH
            )));
        }
        let method = ctx.method();
        if self.context.config.read_only && method.is_mutating() {
            return Err(RegistryError::permission(format!("{} on '{}' rejected: registry is read-only", method, ctx.path)));
        }
        if method == Method::ExecuteQuery {
            ctx.loaded = self.context.storage.get(ctx.effective_tenant(), &ctx.path.without_parameters())?;
        }
        let notification = match &ctx.operation {
            Operation::Put { resource } => Some(Operation::PutChild { child: resource.clone() }),
            Operation::Import { source_url, resource } => {
                Some(Operation::ImportChild { child: resource.clone(), source_url: source_url.clone() })
            }
            _ => None,
        };
        if let (Some(op), Some(parent)) = (notification, parent_of(ctx.path.path())) {
            let mut child = ctx.redirected(ResourcePath::new(&parent));
            child.depth = ctx.depth;
            child.operation = op;
            self.context.handlers.dispatch(&mut child, self, |_| Ok(Reply::Unit))?;
        }
        debug!(target: "mountreg::registry", "dispatch {} '{}' tenant={} depth={}", method, ctx.path, ctx.effective_tenant(), ctx.depth);
        let handlers = self.context.handlers.clone();
        handlers.dispatch(&mut ctx, self, |ctx| self.fallback(ctx))
    }

    /// Storage-engine execution: the implicit last handler of USER_DEFINED.
    fn fallback(&self, ctx: &mut RequestContext) -> RegistryResult<Reply> {
        let storage = self.context.storage.as_ref();
        let tenant = ctx.effective_tenant();
        let path = ctx.path.path().to_string();
        let reply = match &ctx.operation {
            Operation::Get => match storage.get(tenant, &ctx.path)? {
                Some(r) => Reply::Resource(r),
                None => return Err(RegistryError::not_found(ctx.path.complete_path())),
            },
            Operation::Put { resource } => {
                ensure_parents(storage, tenant, &path)?;
                Reply::Path(storage.put(tenant, &path, resource.clone())?)
            }
            Operation::Import { source_url, resource } => {
                let imported = resource.clone().with_property(props::IMPORT_SOURCE, source_url.clone());
                ensure_parents(storage, tenant, &path)?;
                Reply::Path(storage.put(tenant, &path, imported)?)
            }
            Operation::PutChild { .. } | Operation::ImportChild { .. } => Reply::Unit,
            Operation::Delete => {
                let existing = storage
                    .get(tenant, &ResourcePath::new(&path))?
                    .ok_or_else(|| RegistryError::not_found(path.clone()))?;
                if existing.is_link() {
                    self.context.mounts.remove_link(tenant, &path)?;
                } else {
                    storage.delete(tenant, &path)?;
                }
                Reply::Unit
            }
            Operation::Move { target } => Reply::Path(self.relocate_from(ctx, target, true)?),
            Operation::Copy { target } => Reply::Path(self.relocate_from(ctx, target, false)?),
            Operation::Rename { new_name } => {
                if new_name.is_empty() || new_name.contains(PATH_SEPARATOR) || new_name.contains(PARAMETER_SEPARATOR) {
                    return Err(RegistryError::invalid_path(new_name.clone(), "new name must be a single path segment"));
                }
                let parent = parent_of(&path).unwrap_or_else(|| ROOT_PATH.to_string());
                Reply::Path(self.relocate_from(ctx, &to_absolute(&parent, new_name), true)?)
            }
            Operation::CreateLink { target } => {
                self.context.mounts.create_link(tenant, &path, target, &ctx.user)?;
                Reply::Unit
            }
            Operation::RemoveLink => {
                self.context.mounts.remove_link(tenant, &path)?;
                Reply::Unit
            }
            Operation::ResourceExists => Reply::Bool(storage.resource_exists(tenant, &ctx.path)?),
            Operation::AddAssociation { target, kind } => {
                storage.add_association(tenant, Association { source: path, target: normalize_path(target), kind: kind.clone() })?;
                Reply::Unit
            }
            Operation::RemoveAssociation { target, kind } => {
                storage.remove_association(tenant, &Association { source: path, target: normalize_path(target), kind: kind.clone() })?;
                Reply::Unit
            }
            Operation::GetAssociations { kind } => Reply::Associations(storage.associations(tenant, &path, Some(kind))?),
            Operation::GetAllAssociations => Reply::Associations(storage.associations(tenant, &path, None)?),
            Operation::ApplyTag { tag } => {
                storage.apply_tag(tenant, &path, tag, &ctx.user)?;
                Reply::Unit
            }
            Operation::GetResourcePathsWithTag { tag } => {
                let mut paths = storage.paths_with_tag(tenant, tag)?;
                paths.append(&mut ctx.extra_paths);
                paths.sort();
                paths.dedup();
                Reply::Paths(paths)
            }
            Operation::GetTags => Reply::Tags(storage.tags(tenant, &path)?),
            Operation::RemoveTag { tag } => {
                storage.remove_tag(tenant, &path, tag)?;
                Reply::Unit
            }
            Operation::AddComment { text } => Reply::Path(storage.add_comment(tenant, &path, text, &ctx.user)?),
            Operation::EditComment { text } => {
                storage.edit_comment(tenant, &ctx.path, text)?;
                Reply::Unit
            }
            Operation::RemoveComment => {
                storage.remove_comment(tenant, &ctx.path)?;
                Reply::Unit
            }
            Operation::GetComments => Reply::Comments(storage.comments(tenant, &path)?),
            Operation::RateResource { rating } => {
                storage.rate(tenant, &path, &ctx.user, *rating)?;
                Reply::Unit
            }
            Operation::GetAverageRating => Reply::Rating(storage.average_rating(tenant, &path)?),
            Operation::GetRating { user } => Reply::UserRating(storage.rating(tenant, &path, user)?),
            Operation::CreateVersion => {
                let version = storage.create_version(tenant, &path)?;
                Reply::Path(ResourcePath::versioned(&path, version).complete_path())
            }
            Operation::GetVersions => Reply::Paths(
                storage
                    .versions(tenant, &path)?
                    .into_iter()
                    .map(|v| ResourcePath::versioned(&path, v).complete_path())
                    .collect(),
            ),
            Operation::RestoreVersion => {
                let version = ctx
                    .path
                    .version()
                    .ok_or_else(|| RegistryError::invalid_path(ctx.path.complete_path(), "restore requires a version parameter"))?;
                storage.restore_version(tenant, &path, version)?;
                Reply::Unit
            }
            Operation::ExecuteQuery { parameters } => Reply::Paths(storage.search(tenant, &criteria_from(parameters))?),
            Operation::SearchContent { keywords } => {
                let criteria = SearchCriteria { content_contains: Some(keywords.clone()), ..SearchCriteria::under(path) };
                Reply::Paths(storage.search(tenant, &criteria)?)
            }
            Operation::Dump => Reply::Bytes(self.dump_subtree(tenant, &path)?),
            Operation::Restore { dump } => {
                self.restore_subtree(tenant, &path, dump, &ctx.user)?;
                Reply::Unit
            }
            Operation::GetRegistryContext => Reply::Context(ContextInfo {
                tenant_id: tenant,
                user: ctx.user.clone(),
                chroot: self.chroot.clone(),
                node_id: self.context.config.node_id.clone(),
                read_only: self.context.config.read_only,
            }),
        };
        Ok(reply)
    }

    /// Relocate the request's subtree to `to`. A destination behind a live mount is written
    /// through the dispatcher instead of straight into storage.
    fn relocate_from(&self, ctx: &RequestContext, to: &str, remove_source: bool) -> RegistryResult<String> {
        let tenant = ctx.effective_tenant();
        let to = normalize_path(strip_parameters(to));
        if self.context.mounts.covers(tenant, &to) {
            return self.transfer(ctx, &to, remove_source);
        }
        self.relocate(tenant, ctx.path.path(), &to, remove_source)
    }

    /// Relocation across handlers: every read, write and delete is dispatched, so the mounts
    /// on either side apply their own redirects and read-only rules.
    pub(crate) fn transfer(&self, ctx: &RequestContext, to: &str, remove_source: bool) -> RegistryResult<String> {
        let from = ctx.path.path().to_string();
        if is_under(&from, to) {
            return Err(RegistryError::failed(format!("cannot relocate '{from}' into its own subtree '{to}'")));
        }
        let dispatch = |path: &str, operation: Operation| -> RegistryResult<Reply> {
            let mut next = ctx.redirected(ResourcePath::new(path));
            next.operation = operation;
            self.run(next)
        };
        if remove_source && dispatch(to, Operation::ResourceExists)?.into_bool()? {
            return Err(RegistryError::failed(format!("target '{to}' already exists")));
        }
        let mut pending = vec![from.clone()];
        let mut copied = 0usize;
        while let Some(path) = pending.pop() {
            let mut resource = dispatch(&path, Operation::Get)?.into_resource()?;
            let Some(dest) = rebase(&path, &from, to) else { continue };
            pending.append(&mut resource.children);
            if !remove_source {
                resource.uuid = Uuid::new_v4().to_string();
            }
            dispatch(&dest, Operation::Put { resource })?;
            copied += 1;
        }
        if remove_source {
            dispatch(&from, Operation::Delete)?;
        }
        debug!(target: "mountreg::registry", "transferred {} resource(s) '{}' -> '{}' remove_source={}", copied, from, to, remove_source);
        Ok(to.to_string())
    }

    /// Copy the subtree at `from` to `to` inside local storage, removing the source for moves.
    fn relocate(&self, tenant: TenantId, from: &str, to: &str, remove_source: bool) -> RegistryResult<String> {
        let storage = self.context.storage.as_ref();
        let to = normalize_path(strip_parameters(to));
        if is_under(from, &to) {
            return Err(RegistryError::failed(format!("cannot relocate '{from}' into its own subtree '{to}'")));
        }
        if !storage.resource_exists(tenant, &ResourcePath::new(from))? {
            return Err(RegistryError::not_found(from));
        }
        if remove_source && storage.resource_exists(tenant, &ResourcePath::new(&to))? {
            return Err(RegistryError::failed(format!("target '{to}' already exists")));
        }
        ensure_parents(storage, tenant, &to)?;
        for path in storage.search(tenant, &SearchCriteria::under(from))? {
            let Some(mut resource) = storage.get(tenant, &ResourcePath::new(&path))? else { continue };
            let Some(dest) = rebase(&path, from, &to) else { continue };
            if !remove_source {
                resource.uuid = Uuid::new_v4().to_string();
            }
            storage.put(tenant, &dest, resource)?;
        }
        if remove_source {
            storage.delete(tenant, from)?;
        }
        Ok(to)
    }

    fn dump_subtree(&self, tenant: TenantId, root: &str) -> RegistryResult<Vec<u8>> {
        let storage = self.context.storage.as_ref();
        if !storage.resource_exists(tenant, &ResourcePath::new(root))? {
            return Err(RegistryError::not_found(root));
        }
        let mut entries = Vec::new();
        for path in storage.search(tenant, &SearchCriteria::under(root))? {
            let Some(mut resource) = storage.get(tenant, &ResourcePath::new(&path))? else { continue };
            resource.children.clear();
            let tags = storage.tags(tenant, &path)?.into_iter().map(|t| t.name).collect();
            entries.push(DumpEntry { path: to_relative(root, &path), resource, tags });
        }
        Ok(serde_json::to_vec(&DumpDocument { root: root.to_string(), entries })?)
    }

    fn restore_subtree(&self, tenant: TenantId, root: &str, dump: &[u8], user: &str) -> RegistryResult<()> {
        let storage = self.context.storage.as_ref();
        let doc: DumpDocument = serde_json::from_slice(dump)?;
        ensure_parents(storage, tenant, root)?;
        let count = doc.entries.len();
        for entry in doc.entries {
            let dest = to_absolute(root, &entry.path);
            storage.put(tenant, &dest, entry.resource)?;
            for tag in &entry.tags {
                storage.apply_tag(tenant, &dest, tag, user)?;
            }
        }
        debug!(target: "mountreg::registry", "restored {} resource(s) from '{}' under '{}'", count, doc.root, root);
        Ok(())
    }

    pub fn get(&self, path: &str) -> RegistryResult<Resource> { self.execute(path, Operation::Get)?.into_resource() }

    /// Store `resource` at `path`, creating missing parents. Returns the path actually used.
    pub fn put(&self, path: &str, resource: Resource) -> RegistryResult<String> {
        self.execute(path, Operation::Put { resource })?.into_path()
    }

    pub fn delete(&self, path: &str) -> RegistryResult<()> { self.execute(path, Operation::Delete)?.into_unit() }

    pub fn import(&self, path: &str, source_url: &str, resource: Resource) -> RegistryResult<String> {
        self.execute(path, Operation::Import { source_url: source_url.to_string(), resource })?.into_path()
    }

    pub fn move_to(&self, source: &str, target: &str) -> RegistryResult<String> {
        self.execute(source, Operation::Move { target: target.to_string() })?.into_path()
    }

    pub fn copy(&self, source: &str, target: &str) -> RegistryResult<String> {
        self.execute(source, Operation::Copy { target: target.to_string() })?.into_path()
    }

    pub fn rename(&self, path: &str, new_name: &str) -> RegistryResult<String> {
        self.execute(path, Operation::Rename { new_name: new_name.to_string() })?.into_path()
    }

    /// Symbolic link from `path` to the local subtree `target`.
    pub fn create_link(&self, path: &str, target: &str) -> RegistryResult<()> {
        self.execute(path, Operation::CreateLink { target: LinkTarget::local(target) })?.into_unit()
    }

    /// Remote mount of `sub_path` on the configured instance `instance_id` at `path`.
    pub fn create_remote_link(&self, path: &str, instance_id: &str, sub_path: &str) -> RegistryResult<()> {
        self.execute(path, Operation::CreateLink { target: LinkTarget::remote(instance_id, sub_path) })?.into_unit()
    }

    pub fn remove_link(&self, path: &str) -> RegistryResult<()> { self.execute(path, Operation::RemoveLink)?.into_unit() }

    pub fn resource_exists(&self, path: &str) -> RegistryResult<bool> {
        self.execute(path, Operation::ResourceExists)?.into_bool()
    }

    pub fn add_association(&self, source: &str, target: &str, kind: &str) -> RegistryResult<()> {
        self.execute(source, Operation::AddAssociation { target: target.to_string(), kind: kind.to_string() })?.into_unit()
    }

    pub fn remove_association(&self, source: &str, target: &str, kind: &str) -> RegistryResult<()> {
        self.execute(source, Operation::RemoveAssociation { target: target.to_string(), kind: kind.to_string() })?.into_unit()
    }

    pub fn associations(&self, path: &str, kind: &str) -> RegistryResult<Vec<Association>> {
        self.execute(path, Operation::GetAssociations { kind: kind.to_string() })?.into_associations()
    }

    pub fn all_associations(&self, path: &str) -> RegistryResult<Vec<Association>> {
        self.execute(path, Operation::GetAllAssociations)?.into_associations()
    }

    pub fn apply_tag(&self, path: &str, tag: &str) -> RegistryResult<()> {
        self.execute(path, Operation::ApplyTag { tag: tag.to_string() })?.into_unit()
    }

    pub fn paths_with_tag(&self, tag: &str) -> RegistryResult<Vec<String>> {
        self.execute(ROOT_PATH, Operation::GetResourcePathsWithTag { tag: tag.to_string() })?.into_paths()
    }

    pub fn tags(&self, path: &str) -> RegistryResult<Vec<Tag>> { self.execute(path, Operation::GetTags)?.into_tags() }

    pub fn remove_tag(&self, path: &str, tag: &str) -> RegistryResult<()> {
        self.execute(path, Operation::RemoveTag { tag: tag.to_string() })?.into_unit()
    }

    /// Returns the comment path (`path;comments:<id>`).
    pub fn add_comment(&self, path: &str, text: &str) -> RegistryResult<String> {
        self.execute(path, Operation::AddComment { text: text.to_string() })?.into_path()
    }

    pub fn edit_comment(&self, comment_path: &str, text: &str) -> RegistryResult<()> {
        self.execute(comment_path, Operation::EditComment { text: text.to_string() })?.into_unit()
    }

    pub fn remove_comment(&self, comment_path: &str) -> RegistryResult<()> {
        self.execute(comment_path, Operation::RemoveComment)?.into_unit()
    }

    pub fn comments(&self, path: &str) -> RegistryResult<Vec<Comment>> { self.execute(path, Operation::GetComments)?.into_comments() }

    pub fn rate(&self, path: &str, rating: u8) -> RegistryResult<()> {
        self.execute(path, Operation::RateResource { rating })?.into_unit()
    }

    pub fn average_rating(&self, path: &str) -> RegistryResult<f64> {
        self.execute(path, Operation::GetAverageRating)?.into_rating()
    }

    pub fn rating(&self, path: &str, user: &str) -> RegistryResult<u8> {
        self.execute(path, Operation::GetRating { user: user.to_string() })?.into_user_rating()
    }

    /// Snapshot the current state. Returns the versioned path (`path;version:N`).
    pub fn create_version(&self, path: &str) -> RegistryResult<String> {
        self.execute(path, Operation::CreateVersion)?.into_path()
    }

    pub fn versions(&self, path: &str) -> RegistryResult<Vec<String>> { self.execute(path, Operation::GetVersions)?.into_paths() }

    /// `versioned_path` must carry a `version` parameter.
    pub fn restore_version(&self, versioned_path: &str) -> RegistryResult<()> {
        self.execute(versioned_path, Operation::RestoreVersion)?.into_unit()
    }

    pub fn execute_query(&self, path: &str, parameters: BTreeMap<String, String>) -> RegistryResult<Vec<String>> {
        self.execute(path, Operation::ExecuteQuery { parameters })?.into_paths()
    }

    /// Case-insensitive content search under the chroot.
    pub fn search_content(&self, keywords: &str) -> RegistryResult<Vec<String>> {
        self.execute(ROOT_PATH, Operation::SearchContent { keywords: keywords.to_string() })?.into_paths()
    }

    pub fn dump(&self, path: &str) -> RegistryResult<Vec<u8>> { self.execute(path, Operation::Dump)?.into_bytes() }

    pub fn restore(&self, path: &str, dump: Vec<u8>) -> RegistryResult<()> {
        self.execute(path, Operation::Restore { dump })?.into_unit()
    }

    pub fn registry_context(&self) -> RegistryResult<ContextInfo> {
        self.execute(ROOT_PATH, Operation::GetRegistryContext)?.into_context()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
