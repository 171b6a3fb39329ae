//! Chroot conversions between tenant-relative and absolute paths.
//! All functions take and return plain paths (no `;` parameters).

use super::{normalize_path, PATH_SEPARATOR, ROOT_PATH};

#[inline]
pub fn is_root(chroot: &str) -> bool {
    chroot.is_empty() || chroot == ROOT_PATH
}

/// Prefix `relative` with `chroot`. A root or empty chroot is a no-op.
pub fn to_absolute(chroot: &str, relative: &str) -> String {
    let rel = normalize_path(relative);
    if is_root(chroot) {
        return rel;
    }
    let base = normalize_path(chroot);
    if rel == ROOT_PATH { base } else { format!("{base}{rel}") }
}

/// Strip `chroot` from `absolute`. Paths outside the chroot are returned unchanged.
pub fn to_relative(chroot: &str, absolute: &str) -> String {
    let abs = normalize_path(absolute);
    if is_root(chroot) {
        return abs;
    }
    let base = normalize_path(chroot);
    if abs == base {
        return ROOT_PATH.to_string();
    }
    match abs.strip_prefix(base.as_str()) {
        Some(rest) if rest.starts_with(PATH_SEPARATOR) => rest.to_string(),
        _ => abs,
    }
}

/// Merge two chroot prefixes.
pub fn concatenate_chroot(outer: &str, inner: &str) -> String {
    if is_root(outer) {
        return inner.to_string();
    }
    if is_root(inner) {
        return outer.to_string();
    }
    let joined = format!("{}/{}", outer.trim_end_matches(PATH_SEPARATOR), inner.trim_start_matches(PATH_SEPARATOR));
    let trimmed = joined.trim_end_matches(PATH_SEPARATOR);
    if trimmed.is_empty() { ROOT_PATH.to_string() } else { trimmed.to_string() }
}

/// True when `path` equals `ancestor` or lies beneath it. Both must be normalized.
pub fn is_under(ancestor: &str, path: &str) -> bool {
    if ancestor == ROOT_PATH {
        return true;
    }
    path == ancestor
        || (path.len() > ancestor.len() && path.starts_with(ancestor) && path.as_bytes()[ancestor.len()] == b'/')
}

pub fn parent_of(path: &str) -> Option<String> {
    if path == ROOT_PATH {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(ROOT_PATH.to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

pub fn name_of(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or_default()
}

/// Move `path` from beneath `from` to the same place beneath `to`.
pub fn rebase(path: &str, from: &str, to: &str) -> Option<String> {
    if !is_under(from, path) {
        return None;
    }
    Some(to_absolute(to, &to_relative(from, path)))
}
