//!
//! mountreg storage boundary
//! -------------------------
//! The dispatcher treats the storage engine as the implicit last handler of every operation.
//! Engines persist resources, versions, tags, comments, ratings and associations keyed by
//! `(tenant, path)`; they know nothing about mounts or the handler pipeline.
//!
//! `MemoryStorage` is the bundled engine: a thread-safe in-memory map with an optional JSON
//! snapshot file, used by the CLI, tests and benches.

use crate::context::TenantId;
use crate::error::RegistryResult;
use crate::path::ResourcePath;
use crate::resource::{Association, Comment, Resource, Tag};

pub mod memory;

pub use memory::MemoryStorage;

/// Filter set for `StorageEngine::search`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Only resources at or beneath this path.
    pub under: Option<String>,
    pub media_type: Option<String>,
    /// Property name and, optionally, the exact value it must hold.
    pub property: Option<(String, Option<String>)>,
    /// Case-insensitive substring of the UTF-8 content.
    pub content_contains: Option<String>,
}

impl SearchCriteria {
    pub fn under(path: impl Into<String>) -> Self { Self { under: Some(path.into()), ..Self::default() } }

    pub fn with_property(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.property = Some((name.into(), value));
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if let Some(under) = &self.under {
            if !crate::path::is_under(under, &resource.path) {
                return false;
            }
        }
        if let Some(mt) = &self.media_type {
            if resource.media_type.as_deref() != Some(mt.as_str()) {
                return false;
            }
        }
        if let Some((name, value)) = &self.property {
            match (resource.property(name), value) {
                (None, _) => return false,
                (Some(have), Some(want)) if have != want => return false,
                _ => {}
            }
        }
        if let Some(needle) = &self.content_contains {
            let needle = needle.to_lowercase();
            match resource.content_str() {
                Some(text) if text.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

pub trait StorageEngine: Send + Sync {
    /// Identity of the backing connection; part of every cache key.
    fn connection_id(&self) -> String;

    fn new_resource(&self) -> Resource { Resource::new() }

    fn new_collection(&self) -> Resource { Resource::new_collection() }

    /// Honors the `version` parameter. Collections come back with `children` filled.
    fn get(&self, tenant: TenantId, path: &ResourcePath) -> RegistryResult<Option<Resource>>;

    /// Create or replace; returns the path actually stored.
    fn put(&self, tenant: TenantId, path: &str, resource: Resource) -> RegistryResult<String>;

    /// Remove the resource and everything beneath it. Returns whether anything existed.
    fn delete(&self, tenant: TenantId, path: &str) -> RegistryResult<bool>;

    fn resource_exists(&self, tenant: TenantId, path: &ResourcePath) -> RegistryResult<bool>;

    /// Direct children of a collection.
    fn children(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<String>>;

    fn create_version(&self, tenant: TenantId, path: &str) -> RegistryResult<u64>;
    fn versions(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<u64>>;
    fn restore_version(&self, tenant: TenantId, path: &str, version: u64) -> RegistryResult<()>;

    fn apply_tag(&self, tenant: TenantId, path: &str, tag: &str, user: &str) -> RegistryResult<()>;
    fn remove_tag(&self, tenant: TenantId, path: &str, tag: &str) -> RegistryResult<()>;
    fn tags(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<Tag>>;
    fn paths_with_tag(&self, tenant: TenantId, tag: &str) -> RegistryResult<Vec<String>>;

    /// Returns the new comment's path (`path;comments:<id>`).
    fn add_comment(&self, tenant: TenantId, path: &str, text: &str, user: &str) -> RegistryResult<String>;
    fn edit_comment(&self, tenant: TenantId, comment: &ResourcePath, text: &str) -> RegistryResult<()>;
    fn remove_comment(&self, tenant: TenantId, comment: &ResourcePath) -> RegistryResult<()>;
    fn comments(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<Comment>>;

    fn rate(&self, tenant: TenantId, path: &str, user: &str, rating: u8) -> RegistryResult<()>;
    fn average_rating(&self, tenant: TenantId, path: &str) -> RegistryResult<f64>;
    fn rating(&self, tenant: TenantId, path: &str, user: &str) -> RegistryResult<u8>;

    fn add_association(&self, tenant: TenantId, association: Association) -> RegistryResult<()>;
    fn remove_association(&self, tenant: TenantId, association: &Association) -> RegistryResult<()>;
    /// Associations where `path` is source or target, optionally narrowed to one kind.
    fn associations(&self, tenant: TenantId, path: &str, kind: Option<&str>) -> RegistryResult<Vec<Association>>;

    /// Sorted paths of matching resources.
    fn search(&self, tenant: TenantId, criteria: &SearchCriteria) -> RegistryResult<Vec<String>>;

    /// Persist buffered state, if the engine buffers.
    fn flush(&self) -> RegistryResult<()> { Ok(()) }
}

/// Create every missing ancestor collection of `path`, root included.
pub fn ensure_parents(engine: &dyn StorageEngine, tenant: TenantId, path: &str) -> RegistryResult<()> {
    let mut ancestors = Vec::new();
    let mut cursor = crate::path::parent_of(path);
    while let Some(p) = cursor {
        cursor = crate::path::parent_of(&p);
        ancestors.push(p);
    }
    for ancestor in ancestors.into_iter().rev() {
        if !engine.resource_exists(tenant, &ResourcePath::new(&ancestor))? {
            engine.put(tenant, &ancestor, engine.new_collection())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod storage_tests;
