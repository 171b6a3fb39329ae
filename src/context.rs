//! Per-call request state.
//! A `RequestContext` is built by the dispatcher for one operation, walked through the pipeline and
//! dropped afterwards; it is never shared across calls.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::method::Method;
use crate::mount::LinkTarget;
use crate::path::{normalize_path, rebase, ResourcePath, PARAMETER_SEPARATOR};
use crate::pipeline::LifecyclePhase;
use crate::resource::{Association, Comment, Resource, Tag};

pub type TenantId = i32;

pub const SUPER_TENANT_ID: TenantId = -1234;

/// Arguments of one repository operation. `method()` gives its kind.
#[derive(Debug, Clone)]
pub enum Operation {
    Get,
    Put { resource: Resource },
    Delete,
    Import { source_url: String, resource: Resource },
    /// Dispatched on the parent path before a `Put`.
    PutChild { child: Resource },
    /// Dispatched on the parent path before an `Import`.
    ImportChild { child: Resource, source_url: String },
    Move { target: String },
    Copy { target: String },
    Rename { new_name: String },
    CreateLink { target: LinkTarget },
    RemoveLink,
    ResourceExists,
    AddAssociation { target: String, kind: String },
    RemoveAssociation { target: String, kind: String },
    GetAssociations { kind: String },
    GetAllAssociations,
    ApplyTag { tag: String },
    GetResourcePathsWithTag { tag: String },
    GetTags,
    RemoveTag { tag: String },
    AddComment { text: String },
    EditComment { text: String },
    RemoveComment,
    GetComments,
    RateResource { rating: u8 },
    GetAverageRating,
    GetRating { user: String },
    CreateVersion,
    GetVersions,
    RestoreVersion,
    ExecuteQuery { parameters: BTreeMap<String, String> },
    SearchContent { keywords: String },
    Dump,
    Restore { dump: Vec<u8> },
    GetRegistryContext,
}

impl Operation {
    pub fn method(&self) -> Method {
        match self {
            Operation::Get => Method::Get,
            Operation::Put { .. } => Method::Put,
            Operation::Delete => Method::Delete,
            Operation::Import { .. } => Method::Import,
            Operation::PutChild { .. } => Method::PutChild,
            Operation::ImportChild { .. } => Method::ImportChild,
            Operation::Move { .. } => Method::Move,
            Operation::Copy { .. } => Method::Copy,
            Operation::Rename { .. } => Method::Rename,
            Operation::CreateLink { .. } => Method::CreateLink,
            Operation::RemoveLink => Method::RemoveLink,
            Operation::ResourceExists => Method::ResourceExists,
            Operation::AddAssociation { .. } => Method::AddAssociation,
            Operation::RemoveAssociation { .. } => Method::RemoveAssociation,
            Operation::GetAssociations { .. } => Method::GetAssociations,
            Operation::GetAllAssociations => Method::GetAllAssociations,
            Operation::ApplyTag { .. } => Method::ApplyTag,
            Operation::GetResourcePathsWithTag { .. } => Method::GetResourcePathsWithTag,
            Operation::GetTags => Method::GetTags,
            Operation::RemoveTag { .. } => Method::RemoveTag,
            Operation::AddComment { .. } => Method::AddComment,
            Operation::EditComment { .. } => Method::EditComment,
            Operation::RemoveComment => Method::RemoveComment,
            Operation::GetComments => Method::GetComments,
            Operation::RateResource { .. } => Method::RateResource,
            Operation::GetAverageRating => Method::GetAverageRating,
            Operation::GetRating { .. } => Method::GetRating,
            Operation::CreateVersion => Method::CreateVersion,
            Operation::GetVersions => Method::GetVersions,
            Operation::RestoreVersion => Method::RestoreVersion,
            Operation::ExecuteQuery { .. } => Method::ExecuteQuery,
            Operation::SearchContent { .. } => Method::SearchContent,
            Operation::Dump => Method::Dump,
            Operation::Restore { .. } => Method::Restore,
            Operation::GetRegistryContext => Method::GetRegistryContext,
        }
    }

    /// Payload carried by the operation itself, if any.
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Operation::Put { resource } | Operation::Import { resource, .. } => Some(resource),
            Operation::PutChild { child } | Operation::ImportChild { child, .. } => Some(child),
            _ => None,
        }
    }

    /// Secondary path argument (move/copy destination, association target).
    pub fn target_path(&self) -> Option<&str> {
        match self {
            Operation::Move { target } | Operation::Copy { target } => Some(target),
            Operation::AddAssociation { target, .. } | Operation::RemoveAssociation { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Move or copy destination with parameters stripped.
    pub fn destination(&self) -> Option<String> {
        match self {
            Operation::Move { target } | Operation::Copy { target } => {
                Some(normalize_path(target.split(PARAMETER_SEPARATOR).next().unwrap_or_default()))
            }
            _ => None,
        }
    }

    /// Rewrite secondary path arguments lying beneath `from` so they sit beneath `to`.
    pub fn rebase_targets(&mut self, from: &str, to: &str) {
        match self {
            Operation::Move { target }
            | Operation::Copy { target }
            | Operation::AddAssociation { target, .. }
            | Operation::RemoveAssociation { target, .. } => {
                if let Some(moved) = rebase_complete(target, from, to) {
                    *target = moved;
                }
            }
            _ => {}
        }
    }
}

/// Rebase the path part of a possibly parameterised path string.
pub fn rebase_complete(complete: &str, from: &str, to: &str) -> Option<String> {
    let (head, tail) = match complete.find(PARAMETER_SEPARATOR) {
        Some(i) => complete.split_at(i),
        None => (complete, ""),
    };
    let normalized = crate::path::normalize_path(head);
    rebase(&normalized, from, to).map(|p| format!("{p}{tail}"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub tenant_id: TenantId,
    pub user: String,
    pub chroot: String,
    pub node_id: String,
    pub read_only: bool,
}

/// Result of one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Unit,
    Bool(bool),
    Resource(Resource),
    Path(String),
    Paths(Vec<String>),
    Tags(Vec<Tag>),
    Comments(Vec<Comment>),
    Associations(Vec<Association>),
    Rating(f64),
    UserRating(u8),
    Bytes(Vec<u8>),
    Context(ContextInfo),
}

impl Reply {
    /// Apply `f` to the path part of every path the reply carries.
    pub fn map_paths<F: Fn(&str) -> String>(self, f: F) -> Self {
        let map = |complete: &str| -> String {
            match complete.find(PARAMETER_SEPARATOR) {
                Some(i) => format!("{}{}", f(&complete[..i]), &complete[i..]),
                None => f(complete),
            }
        };
        match self {
            Reply::Resource(mut r) => {
                r.path = map(&r.path);
                r.children = r.children.iter().map(|c| map(c)).collect();
                Reply::Resource(r)
            }
            Reply::Path(p) => Reply::Path(map(&p)),
            Reply::Paths(ps) => Reply::Paths(ps.iter().map(|p| map(p)).collect()),
            Reply::Comments(cs) => {
                Reply::Comments(cs.into_iter().map(|c| Comment { path: map(&c.path), ..c }).collect())
            }
            Reply::Associations(xs) => Reply::Associations(
                xs.into_iter()
                    .map(|a| Association { source: map(&a.source), target: map(&a.target), kind: a.kind })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Neutral result returned for mutating operations while simulation is active.
    pub fn simulated(op: &Operation, path: &ResourcePath) -> Self {
        match op.method() {
            Method::Put | Method::Import | Method::Move | Method::Copy | Method::AddComment => {
                Reply::Path(path.complete_path())
            }
            Method::Rename => Reply::Path(path.path().to_string()),
            _ => Reply::Unit,
        }
    }

    fn mismatch(&self, wanted: &str) -> RegistryError {
        RegistryError::failed(format!("expected {wanted} reply, got {self:?}"))
    }

    pub fn into_resource(self) -> RegistryResult<Resource> {
        match self {
            Reply::Resource(r) => Ok(r),
            other => Err(other.mismatch("resource")),
        }
    }
    pub fn into_path(self) -> RegistryResult<String> {
        match self {
            Reply::Path(p) => Ok(p),
            other => Err(other.mismatch("path")),
        }
    }
    pub fn into_paths(self) -> RegistryResult<Vec<String>> {
        match self {
            Reply::Paths(p) => Ok(p),
            other => Err(other.mismatch("paths")),
        }
    }
    pub fn into_bool(self) -> RegistryResult<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            other => Err(other.mismatch("bool")),
        }
    }
    pub fn into_tags(self) -> RegistryResult<Vec<Tag>> {
        match self {
            Reply::Tags(t) => Ok(t),
            other => Err(other.mismatch("tags")),
        }
    }
    pub fn into_comments(self) -> RegistryResult<Vec<Comment>> {
        match self {
            Reply::Comments(c) => Ok(c),
            other => Err(other.mismatch("comments")),
        }
    }
    pub fn into_associations(self) -> RegistryResult<Vec<Association>> {
        match self {
            Reply::Associations(a) => Ok(a),
            other => Err(other.mismatch("associations")),
        }
    }
    pub fn into_rating(self) -> RegistryResult<f64> {
        match self {
            Reply::Rating(r) => Ok(r),
            other => Err(other.mismatch("rating")),
        }
    }
    pub fn into_user_rating(self) -> RegistryResult<u8> {
        match self {
            Reply::UserRating(r) => Ok(r),
            other => Err(other.mismatch("user rating")),
        }
    }
    pub fn into_bytes(self) -> RegistryResult<Vec<u8>> {
        match self {
            Reply::Bytes(b) => Ok(b),
            other => Err(other.mismatch("bytes")),
        }
    }
    pub fn into_context(self) -> RegistryResult<ContextInfo> {
        match self {
            Reply::Context(c) => Ok(c),
            other => Err(other.mismatch("context")),
        }
    }
    pub fn into_unit(self) -> RegistryResult<()> {
        match self {
            Reply::Unit => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Canonical absolute path.
    pub path: ResourcePath,
    pub operation: Operation,
    pub tenant_id: TenantId,
    /// Overrides `tenant_id` for storage and tenant-scoped handler lookup.
    pub caller_tenant_id: Option<TenantId>,
    pub user: String,
    /// Phase currently being walked; set by the handler manager.
    pub phase: LifecyclePhase,
    /// Redirect nesting level.
    pub depth: u8,
    /// Stored resource preloaded by the dispatcher (query resources for `ExecuteQuery`).
    pub loaded: Option<Resource>,
    /// Primary result, visible to REPORTING handlers.
    pub result: Option<Reply>,
    /// Paths contributed by handlers that declined but want them merged into the fallback result.
    pub extra_paths: Vec<String>,
    handled: bool,
}

impl RequestContext {
    pub fn new(path: ResourcePath, operation: Operation, tenant_id: TenantId, user: impl Into<String>) -> Self {
        Self {
            path,
            operation,
            tenant_id,
            caller_tenant_id: None,
            user: user.into(),
            phase: LifecyclePhase::System,
            depth: 0,
            loaded: None,
            result: None,
            extra_paths: Vec::new(),
            handled: false,
        }
    }

    pub fn method(&self) -> Method { self.operation.method() }

    pub fn effective_tenant(&self) -> TenantId { self.caller_tenant_id.unwrap_or(self.tenant_id) }

    /// The declared payload: the operation's own resource, else the preloaded one.
    pub fn resource(&self) -> Option<&Resource> { self.operation.resource().or(self.loaded.as_ref()) }

    pub fn is_handled(&self) -> bool { self.handled }

    pub fn set_handled(&mut self, handled: bool) { self.handled = handled; }

    /// Fresh context for re-dispatching this operation at another path.
    pub fn redirected(&self, path: ResourcePath) -> Self {
        Self {
            path,
            operation: self.operation.clone(),
            tenant_id: self.tenant_id,
            caller_tenant_id: self.caller_tenant_id,
            user: self.user.clone(),
            phase: LifecyclePhase::System,
            depth: self.depth.saturating_add(1),
            loaded: None,
            result: None,
            extra_paths: Vec::new(),
            handled: false,
        }
    }
}
