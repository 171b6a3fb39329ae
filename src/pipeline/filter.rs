use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::context::RequestContext;
use crate::error::RegistryResult;
use crate::method::Method;
use crate::path::is_under;
use crate::system_paths::is_mount_bookkeeping;

use super::Simulation;

/// Predicate deciding whether a registration applies to a request.
pub trait Filter: Send + Sync {
    fn matches(&self, ctx: &RequestContext) -> bool;
}

fn anchored(pattern: &str) -> RegistryResult<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

/// Matches the request path against a per-method pattern, else the general one.
/// Patterns must match the whole path (parameters excluded).
#[derive(Debug, Clone, Default)]
pub struct PathPatternFilter {
    general: Option<Regex>,
    per_method: HashMap<Method, Regex>,
}

impl PathPatternFilter {
    pub fn new(pattern: &str) -> RegistryResult<Self> {
        Ok(Self { general: Some(anchored(pattern)?), per_method: HashMap::new() })
    }

    /// Filter with no general pattern; only methods given per-method patterns can match.
    pub fn empty() -> Self { Self::default() }

    pub fn with_method_pattern(mut self, method: Method, pattern: &str) -> RegistryResult<Self> {
        self.per_method.insert(method, anchored(pattern)?);
        Ok(self)
    }
}

impl Filter for PathPatternFilter {
    fn matches(&self, ctx: &RequestContext) -> bool {
        let path = ctx.path.path();
        match self.per_method.get(&ctx.method()).or(self.general.as_ref()) {
            Some(re) => re.is_match(path),
            None => false,
        }
    }
}

/// Matches when the request's resource declares the configured media type.
#[derive(Debug, Clone)]
pub struct MediaTypeFilter {
    media_type: String,
}

impl MediaTypeFilter {
    pub fn new(media_type: impl Into<String>) -> Self { Self { media_type: media_type.into() } }
}

impl Filter for MediaTypeFilter {
    fn matches(&self, ctx: &RequestContext) -> bool {
        ctx.resource().and_then(|r| r.media_type.as_deref()) == Some(self.media_type.as_str())
    }
}

/// Matches only while simulation mode is active.
#[derive(Clone)]
pub struct SimulationFilter {
    state: Arc<Simulation>,
}

impl SimulationFilter {
    pub fn new(state: Arc<Simulation>) -> Self { Self { state } }
}

impl Filter for SimulationFilter {
    fn matches(&self, _ctx: &RequestContext) -> bool { self.state.is_active() }
}

/// Prefix filter for a mount point. Query and tag-search requests always match so mounted
/// targets stay queryable, as do moves and copies landing under the mount; the mount
/// bookkeeping collection never matches.
#[derive(Debug, Clone)]
pub struct MountFilter {
    mount_path: String,
    inner: PathPatternFilter,
}

impl MountFilter {
    pub fn new(mount_path: &str) -> RegistryResult<Self> {
        let pattern = format!("{}(/.*)?", regex::escape(mount_path));
        Ok(Self { mount_path: mount_path.to_string(), inner: PathPatternFilter::new(&pattern)? })
    }

    pub fn mount_path(&self) -> &str { &self.mount_path }
}

impl Filter for MountFilter {
    fn matches(&self, ctx: &RequestContext) -> bool {
        if is_mount_bookkeeping(ctx.path.path()) {
            return false;
        }
        if matches!(ctx.method(), Method::ExecuteQuery | Method::GetResourcePathsWithTag) {
            return true;
        }
        self.inner.matches(ctx) || ctx.operation.destination().is_some_and(|d| is_under(&self.mount_path, &d))
    }
}
