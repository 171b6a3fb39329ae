use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::{Operation, Reply, RequestContext};
use crate::error::{RegistryError, RegistryResult};
use crate::method::Method;
use crate::path::{concatenate_chroot, is_under, rebase, to_absolute, to_relative, ResourcePath};
use crate::pipeline::{Handler, Outcome};
use crate::registry::Registry;
use crate::remote::{RemoteConfiguration, RemoteConnector, RemoteTarget};
use crate::resource::Resource;

use super::symlink::SymLinkHandler;

/// Redirects a mounted subtree onto a remote registry instance.
///
/// The remote root is the instance chroot joined with the mount's sub path; `/mnt/x` under a
/// mount at `/mnt` becomes `<remote root>/x` on the remote side.
pub struct MountHandler {
    mount_point: String,
    instance_id: String,
    sub_path: String,
    author: String,
    config: RemoteConfiguration,
    connector: Arc<dyn RemoteConnector>,
    target: Mutex<Option<Arc<dyn RemoteTarget>>>,
    cache: Option<Mutex<HashMap<String, Resource>>>,
}

impl MountHandler {
    pub fn new(
        mount_point: impl Into<String>,
        sub_path: impl Into<String>,
        author: impl Into<String>,
        config: RemoteConfiguration,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        let cache = config.cache_enabled.then(|| Mutex::new(HashMap::new()));
        Self {
            mount_point: mount_point.into(),
            instance_id: config.id.clone(),
            sub_path: sub_path.into(),
            author: author.into(),
            config,
            connector,
            target: Mutex::new(None),
            cache,
        }
    }

    pub fn mount_point(&self) -> &str { &self.mount_point }
    pub fn instance_id(&self) -> &str { &self.instance_id }
    pub fn sub_path(&self) -> &str { &self.sub_path }
    pub fn author(&self) -> &str { &self.author }
    pub fn is_read_only(&self) -> bool { self.config.read_only }

    pub fn remote_root(&self) -> String { concatenate_chroot(&self.config.chroot, &self.sub_path) }

    /// Remote-side absolute path for a path under the mount point.
    pub fn remote_path(&self, path: &str) -> String {
        to_absolute(&self.remote_root(), &to_relative(&self.mount_point, path))
    }

    fn local_path(&self, remote: &str) -> Option<String> { rebase(remote, &self.remote_root(), &self.mount_point) }

    fn connect(&self) -> RegistryResult<Arc<dyn RemoteTarget>> {
        let mut slot = self.target.lock();
        if let Some(t) = slot.as_ref() {
            return Ok(t.clone());
        }
        let t = self.connector.connect(&self.config)?;
        *slot = Some(t.clone());
        Ok(t)
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    fn read_only_violation(&self, ctx: &RequestContext) -> Option<RegistryError> {
        (self.config.read_only && ctx.method().is_mutating()).then(|| {
            RegistryError::permission(format!(
                "{} on '{}' rejected: mount '{}' onto '{}' is read-only",
                ctx.method(),
                ctx.path,
                self.mount_point,
                self.instance_id
            ))
        })
    }

    /// Reply for an unreachable remote: reads see an empty subtree, writes fail.
    fn unreachable(&self, ctx: &RequestContext, cause: RegistryError) -> Outcome {
        debug!(target: "mountreg::mount", "remote '{}' unreachable for {} '{}': {}", self.instance_id, ctx.method(), ctx.path, cause);
        let method = ctx.method();
        if method.is_mutating() {
            return Outcome::Failed(RegistryError::failed(format!(
                "{} on '{}' failed: remote instance '{}' unavailable ({})",
                method, ctx.path, self.instance_id, cause
            )));
        }
        match method {
            Method::ResourceExists => Outcome::Handled(Reply::Bool(false)),
            Method::GetTags => Outcome::Handled(Reply::Tags(Vec::new())),
            Method::GetComments => Outcome::Handled(Reply::Comments(Vec::new())),
            Method::GetAssociations | Method::GetAllAssociations => Outcome::Handled(Reply::Associations(Vec::new())),
            Method::GetVersions | Method::ExecuteQuery | Method::SearchContent => Outcome::Handled(Reply::Paths(Vec::new())),
            Method::GetAverageRating => Outcome::Handled(Reply::Rating(0.0)),
            Method::GetRating => Outcome::Handled(Reply::UserRating(0)),
            _ => Outcome::Failed(RegistryError::not_found(ctx.path.complete_path())),
        }
    }

    /// Remote tag hits under the remote root are contributed to the local result.
    fn collect_tagged(&self, ctx: &mut RequestContext) {
        let Operation::GetResourcePathsWithTag { tag } = &ctx.operation else { return };
        let target = match self.connect() {
            Ok(t) => t,
            Err(e) => {
                debug!(target: "mountreg::mount", "tag search skipped remote '{}': {}", self.instance_id, e);
                return;
            }
        };
        let op = Operation::GetResourcePathsWithTag { tag: tag.clone() };
        match target.execute(ResourcePath::new(&self.remote_root()), op).and_then(Reply::into_paths) {
            Ok(paths) => {
                let root = self.remote_root();
                ctx.extra_paths.extend(paths.iter().filter(|p| is_under(&root, p)).filter_map(|p| self.local_path(p)));
            }
            Err(e) => warn!(target: "mountreg::mount", "tag search on remote '{}' failed: {}", self.instance_id, e),
        }
    }
}

impl Handler for MountHandler {
    fn name(&self) -> &str { "MountHandler" }

    fn handle(&self, ctx: &mut RequestContext, registry: &Registry) -> Outcome {
        let path = ctx.path.path().to_string();
        if ctx.method() == Method::GetResourcePathsWithTag {
            self.collect_tagged(ctx);
            return Outcome::Declined;
        }
        let destination = ctx.operation.destination();
        let lands_inside = destination.as_deref().is_some_and(|d| is_under(&self.mount_point, d));
        if !is_under(&self.mount_point, &path) {
            // relocation into the mount: the source side performs it, writes arrive here as PUTs
            return match self.read_only_violation(ctx) {
                Some(err) if lands_inside => Outcome::Failed(err),
                _ => Outcome::Declined,
            };
        }
        if path == self.mount_point && SymLinkHandler::manages_link(ctx.method()) {
            return Outcome::Declined;
        }
        if let Some(err) = self.read_only_violation(ctx) {
            return Outcome::Failed(err);
        }
        if let Some(dest) = destination.filter(|_| !lands_inside) {
            debug!(target: "mountreg::mount", "{} '{}' leaves mount '{}' for '{}'", ctx.method(), path, self.mount_point, dest);
            return match registry.transfer(ctx, &dest, ctx.method() == Method::Move) {
                Ok(to) => Outcome::Handled(Reply::Path(to)),
                Err(e) => Outcome::Failed(e),
            };
        }

        let remote_path = ctx.path.with_path(&self.remote_path(&path));
        let cache_key = remote_path.complete_path();
        let is_get = ctx.method() == Method::Get;
        if is_get {
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.lock().get(&cache_key).cloned()) {
                return Outcome::Handled(Reply::Resource(hit).map_paths(|p| self.local_path(p).unwrap_or_else(|| p.to_string())));
            }
        } else if ctx.method().is_mutating() {
            self.invalidate_cache();
        }

        let target = match self.connect() {
            Ok(t) => t,
            Err(e) => return self.unreachable(ctx, e),
        };
        let mut op = ctx.operation.clone();
        op.rebase_targets(&self.mount_point, &self.remote_root());
        debug!(target: "mountreg::pipeline", "remote {} '{}' -> {}:'{}'", ctx.method(), path, self.instance_id, remote_path);
        match target.execute(remote_path, op) {
            Ok(reply) => {
                if let (true, Some(cache), Reply::Resource(r)) = (is_get, self.cache.as_ref(), &reply) {
                    cache.lock().insert(cache_key, r.clone());
                }
                Outcome::Handled(reply.map_paths(|p| self.local_path(p).unwrap_or_else(|| p.to_string())))
            }
            Err(RegistryError::NotFound(_)) => Outcome::Failed(RegistryError::not_found(ctx.path.complete_path())),
            Err(e) => Outcome::Failed(e),
        }
    }

    fn simulate(&self, ctx: &RequestContext) -> RegistryResult<()> {
        let touches = is_under(&self.mount_point, ctx.path.path())
            || ctx.operation.destination().is_some_and(|d| is_under(&self.mount_point, &d));
        match self.read_only_violation(ctx) {
            Some(err) if touches => Err(err),
            _ => Ok(()),
        }
    }
}
