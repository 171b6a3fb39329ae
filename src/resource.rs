//! Resource payloads and the metadata records attached to them.
//! Keep this module purely about types/serde and light helpers.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known property names written on link placeholders and mount markers.
pub mod props {
    pub const LINK: &str = "registry.link";
    pub const MOUNT: &str = "registry.mount";
    pub const MOUNT_POINT: &str = "registry.mountpoint";
    pub const TARGET_POINT: &str = "registry.targetpoint";
    pub const INSTANCE: &str = "registry.instance";
    pub const SUB_PATH: &str = "registry.subpath";
    pub const AUTHOR: &str = "registry.author";
    pub const NON_RECURSIVE: &str = "registry.nonrecursive";
    pub const LINK_RESTORATION: &str = "registry.link.restoration";
    pub const IMPORT_SOURCE: &str = "registry.import.source";

    // fixed-mount marker
    pub const MARKER_PATH: &str = "path";
    pub const MARKER_TARGET: &str = "target";
    pub const MARKER_SUB_PATH: &str = "subPath";
    pub const MARKER_AUTHOR: &str = "author";
    pub const MARKER_FIXED: &str = "fixedMount";
    pub const MARKER_VIRTUAL: &str = "virtual";
    pub const MARKER_INSTANCE: &str = "instanceId";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub path: String,
    pub uuid: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default, with = "content_b64")]
    pub content: Option<Vec<u8>>,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: i64,
    pub last_modified: i64,
    /// Child paths; filled by the storage engine on collection reads.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Set when the resource was read through a `version` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Default for Resource {
    fn default() -> Self { Self::new() }
}

impl Resource {
    pub fn new() -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            path: String::new(),
            uuid: Uuid::new_v4().to_string(),
            media_type: None,
            content: None,
            collection: false,
            properties: BTreeMap::new(),
            author: String::new(),
            description: None,
            created_at: now,
            last_modified: now,
            children: Vec::new(),
            version: None,
        }
    }

    pub fn new_collection() -> Self {
        Self { collection: true, ..Self::new() }
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<&str> { self.properties.get(name).map(String::as_str) }

    pub fn flag(&self, name: &str) -> bool {
        self.property(name).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
    }

    pub fn content_str(&self) -> Option<&str> {
        self.content.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Placeholder written by `createLink`.
    pub fn is_link(&self) -> bool { self.flag(props::LINK) }

    pub fn is_remote_mount(&self) -> bool { self.is_link() && self.flag(props::MOUNT) }

    pub fn touch(&mut self) { self.last_modified = Utc::now().timestamp_millis(); }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    /// `resource;comments:<id>`
    pub path: String,
    pub text: String,
    pub user: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Association {
    pub source: String,
    pub target: String,
    pub kind: String,
}

mod content_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| base64::engine::general_purpose::STANDARD.decode(t).map_err(serde::de::Error::custom))
            .transpose()
    }
}
