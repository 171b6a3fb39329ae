use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::context::TenantId;
use crate::error::{RegistryError, RegistryResult};
use crate::path::{is_under, normalize_path, parent_of, ResourcePath, COMMENTS_PARAMETER};
use crate::resource::{Association, Comment, Resource, Tag};

use super::{SearchCriteria, StorageEngine};

/// Everything one tenant owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TenantData {
    resources: BTreeMap<String, Resource>,
    #[serde(default)]
    versions: BTreeMap<String, Vec<Resource>>,
    /// path -> tag -> users that applied it
    #[serde(default)]
    tags: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    #[serde(default)]
    comments: BTreeMap<String, Vec<Comment>>,
    #[serde(default)]
    next_comment_id: u64,
    /// path -> user -> rating
    #[serde(default)]
    ratings: BTreeMap<String, BTreeMap<String, u8>>,
    #[serde(default)]
    associations: BTreeSet<Association>,
}

impl TenantData {
    fn subtree_keys(&self, path: &str) -> Vec<String> {
        self.resources
            .range(path.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(path))
            .filter(|k| is_under(path, k))
            .cloned()
            .collect()
    }

    fn direct_children(&self, path: &str) -> Vec<String> {
        self.resources
            .keys()
            .filter(|k| k.as_str() != path && parent_of(k).as_deref() == Some(path))
            .cloned()
            .collect()
    }

    fn drop_metadata_under(&mut self, path: &str) {
        self.versions.retain(|k, _| !is_under(path, k));
        self.tags.retain(|k, _| !is_under(path, k));
        self.comments.retain(|k, _| !is_under(path, k));
        self.ratings.retain(|k, _| !is_under(path, k));
        self.associations.retain(|a| !is_under(path, &a.source) && !is_under(path, &a.target));
    }
}

/// In-memory storage engine. Tenants are fully isolated from each other.
pub struct MemoryStorage {
    connection_id: String,
    snapshot: Option<PathBuf>,
    tenants: RwLock<BTreeMap<TenantId, TenantData>>,
}

impl Default for MemoryStorage {
    fn default() -> Self { Self::new() }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { connection_id: format!("memory://{}", Uuid::new_v4()), snapshot: None, tenants: RwLock::new(BTreeMap::new()) }
    }

    /// Engine backed by a JSON snapshot file; loads it when present. `flush` rewrites it.
    pub fn open<P: AsRef<Path>>(snapshot: P) -> RegistryResult<Self> {
        let path = snapshot.as_ref().to_path_buf();
        let tenants = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };
        debug!(target: "mountreg::storage", "open snapshot='{}' tenants={}", path.display(), tenants.len());
        Ok(Self { connection_id: format!("memory://{}", path.display()), snapshot: Some(path), tenants: RwLock::new(tenants) })
    }

    fn read<T>(&self, tenant: TenantId, f: impl FnOnce(&TenantData) -> T) -> T {
        let guard = self.tenants.read();
        match guard.get(&tenant) {
            Some(data) => f(data),
            None => f(&TenantData::default()),
        }
    }

    fn write<T>(&self, tenant: TenantId, f: impl FnOnce(&mut TenantData) -> T) -> T {
        let mut guard = self.tenants.write();
        f(guard.entry(tenant).or_default())
    }

    fn require(data: &TenantData, path: &str) -> RegistryResult<()> {
        if data.resources.contains_key(path) { Ok(()) } else { Err(RegistryError::not_found(path)) }
    }

    fn comment_id(comment: &ResourcePath) -> RegistryResult<u64> {
        comment
            .parameter(COMMENTS_PARAMETER)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| RegistryError::invalid_path(comment.complete_path(), "not a comment path"))
    }
}

impl StorageEngine for MemoryStorage {
    fn connection_id(&self) -> String { self.connection_id.clone() }

    fn get(&self, tenant: TenantId, path: &ResourcePath) -> RegistryResult<Option<Resource>> {
        Ok(self.read(tenant, |data| {
            let key = path.path();
            if let Some(version) = path.version() {
                let idx = usize::try_from(version).ok()?.checked_sub(1)?;
                let mut snap = data.versions.get(key)?.get(idx)?.clone();
                snap.path = key.to_string();
                snap.version = Some(version);
                return Some(snap);
            }
            let mut res = data.resources.get(key)?.clone();
            if res.collection {
                res.children = data.direct_children(key);
            }
            Some(res)
        }))
    }

    fn put(&self, tenant: TenantId, path: &str, mut resource: Resource) -> RegistryResult<String> {
        let key = normalize_path(path);
        let now = Utc::now().timestamp_millis();
        self.write(tenant, |data| {
            if let Some(existing) = data.resources.get(&key) {
                resource.created_at = existing.created_at;
                resource.uuid = existing.uuid.clone();
            }
            resource.path = key.clone();
            resource.children.clear();
            resource.version = None;
            resource.last_modified = now;
            data.resources.insert(key.clone(), resource);
        });
        debug!(target: "mountreg::storage", "put tenant={} path='{}'", tenant, key);
        Ok(key)
    }

    fn delete(&self, tenant: TenantId, path: &str) -> RegistryResult<bool> {
        let key = normalize_path(path);
        Ok(self.write(tenant, |data| {
            let keys = data.subtree_keys(&key);
            for k in &keys {
                data.resources.remove(k);
            }
            data.drop_metadata_under(&key);
            !keys.is_empty()
        }))
    }

    fn resource_exists(&self, tenant: TenantId, path: &ResourcePath) -> RegistryResult<bool> {
        Ok(self.get(tenant, path)?.is_some())
    }

    fn children(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<String>> {
        Ok(self.read(tenant, |data| data.direct_children(path)))
    }

    fn create_version(&self, tenant: TenantId, path: &str) -> RegistryResult<u64> {
        self.write(tenant, |data| {
            Self::require(data, path)?;
            let current = data.resources.get(path).cloned().ok_or_else(|| RegistryError::not_found(path))?;
            let list = data.versions.entry(path.to_string()).or_default();
            list.push(current);
            Ok(list.len() as u64)
        })
    }

    fn versions(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<u64>> {
        Ok(self.read(tenant, |data| data.versions.get(path).map(|v| (1..=v.len() as u64).collect()).unwrap_or_default()))
    }

    fn restore_version(&self, tenant: TenantId, path: &str, version: u64) -> RegistryResult<()> {
        self.write(tenant, |data| {
            let snap = usize::try_from(version)
                .ok()
                .and_then(|v| v.checked_sub(1))
                .and_then(|idx| data.versions.get(path).and_then(|list| list.get(idx)))
                .cloned()
                .ok_or_else(|| RegistryError::not_found(ResourcePath::versioned(path, version).complete_path()))?;
            let mut restored = snap;
            restored.path = path.to_string();
            restored.version = None;
            restored.touch();
            data.resources.insert(path.to_string(), restored);
            Ok(())
        })
    }

    fn apply_tag(&self, tenant: TenantId, path: &str, tag: &str, user: &str) -> RegistryResult<()> {
        self.write(tenant, |data| {
            Self::require(data, path)?;
            data.tags.entry(path.to_string()).or_default().entry(tag.to_string()).or_default().insert(user.to_string());
            Ok(())
        })
    }

    fn remove_tag(&self, tenant: TenantId, path: &str, tag: &str) -> RegistryResult<()> {
        self.write(tenant, |data| {
            if let Some(tags) = data.tags.get_mut(path) {
                tags.remove(tag);
            }
            Ok(())
        })
    }

    fn tags(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<Tag>> {
        Ok(self.read(tenant, |data| {
            data.tags
                .get(path)
                .map(|tags| tags.iter().map(|(name, users)| Tag { name: name.clone(), count: users.len() as u64 }).collect())
                .unwrap_or_default()
        }))
    }

    fn paths_with_tag(&self, tenant: TenantId, tag: &str) -> RegistryResult<Vec<String>> {
        Ok(self.read(tenant, |data| {
            data.tags.iter().filter(|(_, tags)| tags.contains_key(tag)).map(|(p, _)| p.clone()).collect()
        }))
    }

    fn add_comment(&self, tenant: TenantId, path: &str, text: &str, user: &str) -> RegistryResult<String> {
        self.write(tenant, |data| {
            Self::require(data, path)?;
            data.next_comment_id += 1;
            let mut cp = ResourcePath::new(path);
            cp.set_parameter(COMMENTS_PARAMETER, Some(data.next_comment_id.to_string()));
            let comment = Comment {
                path: cp.complete_path(),
                text: text.to_string(),
                user: user.to_string(),
                created_at: Utc::now().timestamp_millis(),
            };
            data.comments.entry(path.to_string()).or_default().push(comment);
            Ok(cp.complete_path())
        })
    }

    fn edit_comment(&self, tenant: TenantId, comment: &ResourcePath, text: &str) -> RegistryResult<()> {
        Self::comment_id(comment)?;
        let wanted = comment.complete_path();
        self.write(tenant, |data| {
            let found = data.comments.get_mut(comment.path()).and_then(|cs| cs.iter_mut().find(|c| c.path == wanted));
            match found {
                Some(c) => {
                    c.text = text.to_string();
                    Ok(())
                }
                None => Err(RegistryError::not_found(wanted.clone())),
            }
        })
    }

    fn remove_comment(&self, tenant: TenantId, comment: &ResourcePath) -> RegistryResult<()> {
        Self::comment_id(comment)?;
        let wanted = comment.complete_path();
        self.write(tenant, |data| {
            if let Some(cs) = data.comments.get_mut(comment.path()) {
                cs.retain(|c| c.path != wanted);
            }
            Ok(())
        })
    }

    fn comments(&self, tenant: TenantId, path: &str) -> RegistryResult<Vec<Comment>> {
        Ok(self.read(tenant, |data| data.comments.get(path).cloned().unwrap_or_default()))
    }

    fn rate(&self, tenant: TenantId, path: &str, user: &str, rating: u8) -> RegistryResult<()> {
        if !(1..=5).contains(&rating) {
            return Err(RegistryError::failed(format!("rating {rating} out of range 1..=5")));
        }
        self.write(tenant, |data| {
            Self::require(data, path)?;
            data.ratings.entry(path.to_string()).or_default().insert(user.to_string(), rating);
            Ok(())
        })
    }

    fn average_rating(&self, tenant: TenantId, path: &str) -> RegistryResult<f64> {
        Ok(self.read(tenant, |data| match data.ratings.get(path) {
            Some(r) if !r.is_empty() => r.values().map(|v| f64::from(*v)).sum::<f64>() / r.len() as f64,
            _ => 0.0,
        }))
    }

    fn rating(&self, tenant: TenantId, path: &str, user: &str) -> RegistryResult<u8> {
        Ok(self.read(tenant, |data| data.ratings.get(path).and_then(|r| r.get(user)).copied().unwrap_or(0)))
    }

    fn add_association(&self, tenant: TenantId, association: Association) -> RegistryResult<()> {
        self.write(tenant, |data| {
            Self::require(data, &association.source)?;
            data.associations.insert(association);
            Ok(())
        })
    }

    fn remove_association(&self, tenant: TenantId, association: &Association) -> RegistryResult<()> {
        self.write(tenant, |data| {
            data.associations.remove(association);
            Ok(())
        })
    }

    fn associations(&self, tenant: TenantId, path: &str, kind: Option<&str>) -> RegistryResult<Vec<Association>> {
        Ok(self.read(tenant, |data| {
            data.associations
                .iter()
                .filter(|a| a.source == path || a.target == path)
                .filter(|a| kind.map(|k| a.kind == k).unwrap_or(true))
                .cloned()
                .collect()
        }))
    }

    fn search(&self, tenant: TenantId, criteria: &SearchCriteria) -> RegistryResult<Vec<String>> {
        Ok(self.read(tenant, |data| {
            data.resources.values().filter(|r| criteria.matches(r)).map(|r| r.path.clone()).collect()
        }))
    }

    fn flush(&self) -> RegistryResult<()> {
        let Some(path) = &self.snapshot else { return Ok(()) };
        let bytes = {
            let guard = self.tenants.read();
            serde_json::to_vec_pretty(&*guard)?
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, bytes)?;
        debug!(target: "mountreg::storage", "flushed snapshot='{}'", path.display());
        Ok(())
    }
}
