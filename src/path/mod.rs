//! Resource path model.
//!
//! A raw path looks like `/c1/c2/r1;version:3;comments:7`: the part before the first `;` is the
//! resource path proper, every following `;`-separated segment is a `key[:value]` parameter.
//! Paths are NFC-normalised, always start with `/`, never end with `/` (except the root) and
//! never contain empty segments.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use unicode_normalization::UnicodeNormalization;

use crate::error::{RegistryError, RegistryResult};

pub mod chroot;

pub use chroot::{concatenate_chroot, is_root, is_under, name_of, parent_of, rebase, to_absolute, to_relative};

pub const PATH_SEPARATOR: char = '/';
pub const PARAMETER_SEPARATOR: char = ';';
pub const VALUE_SEPARATOR: char = ':';
pub const ROOT_PATH: &str = "/";

pub const VERSION_PARAMETER: &str = "version";
pub const COMMENTS_PARAMETER: &str = "comments";

/// Normalize a UTF-8 string to NFC.
pub fn normalize_nfc(input: &str) -> String {
    input.nfc().collect::<String>()
}

/// Canonical absolute form of a plain path (no parameters): leading `/`, no empty segments,
/// no trailing `/` unless the whole path is the root.
pub fn normalize_path(raw: &str) -> String {
    let nfc = normalize_nfc(raw);
    let mut out = String::with_capacity(nfc.len() + 1);
    for seg in nfc.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
        out.push(PATH_SEPARATOR);
        out.push_str(seg);
    }
    if out.is_empty() {
        out.push(PATH_SEPARATOR);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    path: String,
    /// Insertion-ordered; keys are unique.
    parameters: Vec<(String, Option<String>)>,
}

impl ResourcePath {
    /// Plain path without parameters.
    pub fn new(path: &str) -> Self {
        Self { path: normalize_path(path), parameters: Vec::new() }
    }

    pub fn root() -> Self { Self::new(ROOT_PATH) }

    pub fn parse(raw: &str) -> RegistryResult<Self> {
        let mut parts = raw.split(PARAMETER_SEPARATOR);
        let head = parts.next().unwrap_or_default();
        let mut rp = Self::new(head);
        for seg in parts.filter(|s| !s.is_empty()) {
            let (key, value) = match seg.split_once(VALUE_SEPARATOR) {
                Some((k, v)) => (k, Some(v.to_string())),
                None => (seg, None),
            };
            if key.is_empty() {
                return Err(RegistryError::invalid_path(raw, format!("parameter '{seg}' has no name")));
            }
            rp.set_parameter(key, value);
        }
        if rp.has_parameter(VERSION_PARAMETER) {
            match rp.parameter(VERSION_PARAMETER).map(str::parse::<u64>) {
                Some(Ok(_)) => {}
                _ => {
                    return Err(RegistryError::invalid_path(raw, "version parameter must be a non-negative integer"));
                }
            }
        }
        Ok(rp)
    }

    /// The path component, without parameters.
    pub fn path(&self) -> &str { &self.path }

    /// `path` followed by the serialized parameters.
    pub fn complete_path(&self) -> String {
        let mut out = self.path.clone();
        for (k, v) in &self.parameters {
            out.push(PARAMETER_SEPARATOR);
            out.push_str(k);
            if let Some(v) = v {
                out.push(VALUE_SEPARATOR);
                out.push_str(v);
            }
        }
        out
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn has_parameters(&self) -> bool { !self.parameters.is_empty() }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters.iter().any(|(k, _)| k == key)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_deref())
    }

    /// Repeated keys overwrite the earlier value in place.
    pub fn set_parameter(&mut self, key: &str, value: Option<String>) {
        match self.parameters.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((key.to_string(), value)),
        }
    }

    pub fn remove_parameter(&mut self, key: &str) {
        self.parameters.retain(|(k, _)| k != key);
    }

    pub fn is_current_version(&self) -> bool { !self.has_parameter(VERSION_PARAMETER) }

    pub fn version(&self) -> Option<u64> {
        self.parameter(VERSION_PARAMETER).and_then(|v| v.parse().ok())
    }

    /// Same parameters, different path.
    pub fn with_path(&self, path: &str) -> Self {
        Self { path: normalize_path(path), parameters: self.parameters.clone() }
    }

    pub fn without_parameters(&self) -> Self { Self::new(&self.path) }

    pub fn is_root(&self) -> bool { self.path == ROOT_PATH }

    pub fn to_absolute(&self, chroot: &str) -> Self { self.with_path(&to_absolute(chroot, &self.path)) }

    pub fn to_relative(&self, chroot: &str) -> Self { self.with_path(&to_relative(chroot, &self.path)) }

    /// `path;version:N`
    pub fn versioned(path: &str, version: u64) -> Self {
        let mut rp = Self::new(path);
        rp.set_parameter(VERSION_PARAMETER, Some(version.to_string()));
        rp
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.complete_path())
    }
}

impl FromStr for ResourcePath {
    type Err = RegistryError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}
