use tracing::debug;

use crate::context::{rebase_complete, RequestContext};
use crate::error::RegistryError;
use crate::method::Method;
use crate::path::rebase;
use crate::pipeline::{Handler, Outcome};
use crate::registry::Registry;

/// Redirects every operation under `mount_point` to the same place under `target_point` by
/// re-entering the dispatcher, then maps returned paths back into the mount namespace.
#[derive(Debug, Clone)]
pub struct SymLinkHandler {
    mount_point: String,
    target_point: String,
    author: String,
}

impl SymLinkHandler {
    pub fn new(mount_point: impl Into<String>, target_point: impl Into<String>, author: impl Into<String>) -> Self {
        Self { mount_point: mount_point.into(), target_point: target_point.into(), author: author.into() }
    }

    pub fn mount_point(&self) -> &str { &self.mount_point }
    pub fn target_point(&self) -> &str { &self.target_point }
    pub fn author(&self) -> &str { &self.author }

    /// Operations on the mount point itself that manage the link rather than the target.
    pub(crate) fn manages_link(method: Method) -> bool {
        matches!(method, Method::Delete | Method::RemoveLink | Method::CreateLink)
    }
}

impl Handler for SymLinkHandler {
    fn name(&self) -> &str { "SymLinkHandler" }

    fn handle(&self, ctx: &mut RequestContext, registry: &Registry) -> Outcome {
        let path = ctx.path.path();
        if path == self.mount_point && Self::manages_link(ctx.method()) {
            return Outcome::Declined;
        }
        let Some(target) = rebase(path, &self.mount_point, &self.target_point) else {
            return Outcome::Declined;
        };
        let mut next = ctx.redirected(ctx.path.with_path(&target));
        next.operation.rebase_targets(&self.mount_point, &self.target_point);
        debug!(
            target: "mountreg::pipeline",
            "symlink {} '{}' -> '{}' depth={}",
            ctx.method(), path, target, next.depth
        );
        match registry.redirect(next) {
            Ok(reply) => Outcome::Handled(reply.map_paths(|p| {
                rebase(p, &self.target_point, &self.mount_point).unwrap_or_else(|| p.to_string())
            })),
            Err(RegistryError::NotFound(p)) => Outcome::Failed(RegistryError::not_found(
                rebase_complete(&p, &self.target_point, &self.mount_point).unwrap_or(p),
            )),
            Err(e) => Outcome::Failed(e),
        }
    }
}
