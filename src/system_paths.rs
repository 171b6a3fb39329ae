//! Centralized reserved registry locations.
//! Keeps bookkeeping paths consistent across the mount registry, caching and dispatcher.

use crate::path::{is_under, normalize_path, PATH_SEPARATOR};

/// Root of the system area.
pub const SYSTEM_ROOT: &str = "/_system";

/// Node-local (non-shared) area. Cache keys under this path include the node identifier.
pub const LOCAL_BASE_PATH: &str = "/_system/local";

/// Collection holding one fixed-mount marker per mounted source path.
pub const MOUNT_BOOKKEEPING_PATH: &str = "/_system/local/repository/components/registry/mount";

/// Deterministic marker location for a mount source path: the path with `/` replaced by `-`.
#[inline]
pub fn mount_marker_path(mount_path: &str) -> String {
    let flat = normalize_path(mount_path).replace(PATH_SEPARATOR, "-");
    format!("{MOUNT_BOOKKEEPING_PATH}/{flat}")
}

/// Mount-redirecting handlers never apply here.
#[inline]
pub fn is_mount_bookkeeping(path: &str) -> bool { is_under(MOUNT_BOOKKEEPING_PATH, path) }

/// True for paths in the node-local area rooted at `local_base`.
#[inline]
pub fn is_local(local_base: &str, path: &str) -> bool { is_under(local_base, path) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_paths_are_flat_and_deterministic() {
        assert_eq!(
            mount_marker_path("/_system/config/"),
            format!("{MOUNT_BOOKKEEPING_PATH}/-_system-config")
        );
        assert_eq!(mount_marker_path("/a/b"), mount_marker_path("a//b"));
        assert!(is_mount_bookkeeping(&mount_marker_path("/a")));
        assert!(!is_mount_bookkeeping("/_system/local"));
        assert!(is_local(LOCAL_BASE_PATH, "/_system/local/x"));
        assert!(!is_local(LOCAL_BASE_PATH, "/_system/config"));
    }
}
