use super::*;
use crate::context::SUPER_TENANT_ID;
use tempfile::tempdir;

const T: TenantId = SUPER_TENANT_ID;

fn seeded() -> MemoryStorage {
    let s = MemoryStorage::new();
    s.put(T, "/a", Resource::new_collection()).unwrap();
    s.put(T, "/a/b", Resource::new().with_content("hello world").with_media_type("text/plain")).unwrap();
    s.put(T, "/a/b/c", Resource::new()).unwrap();
    s.put(T, "/ab", Resource::new()).unwrap();
    s
}

#[test]
fn delete_removes_subtree_only() {
    let s = seeded();
    assert!(s.delete(T, "/a/b").unwrap());
    assert!(!s.resource_exists(T, &ResourcePath::new("/a/b/c")).unwrap());
    assert!(s.resource_exists(T, &ResourcePath::new("/a")).unwrap());
    assert!(s.resource_exists(T, &ResourcePath::new("/ab")).unwrap());
    assert!(!s.delete(T, "/a/b").unwrap());
}

#[test]
fn collections_list_direct_children() {
    let s = seeded();
    let a = s.get(T, &ResourcePath::new("/a")).unwrap().unwrap();
    assert_eq!(a.children, vec!["/a/b".to_string()]);
}

#[test]
fn tenants_are_isolated() {
    let s = seeded();
    assert!(!s.resource_exists(1, &ResourcePath::new("/a")).unwrap());
    s.put(1, "/a", Resource::new()).unwrap();
    assert!(s.resource_exists(1, &ResourcePath::new("/a")).unwrap());
    assert!(s.get(T, &ResourcePath::new("/a")).unwrap().unwrap().collection);
}

#[test]
fn versions_snapshot_and_restore() {
    let s = seeded();
    assert_eq!(s.create_version(T, "/a/b").unwrap(), 1);
    s.put(T, "/a/b", Resource::new().with_content("changed")).unwrap();
    assert_eq!(s.create_version(T, "/a/b").unwrap(), 2);
    assert_eq!(s.versions(T, "/a/b").unwrap(), vec![1, 2]);

    let v1 = s.get(T, &ResourcePath::parse("/a/b;version:1").unwrap()).unwrap().unwrap();
    assert_eq!(v1.content_str(), Some("hello world"));
    assert_eq!(v1.version, Some(1));
    assert!(s.get(T, &ResourcePath::parse("/a/b;version:9").unwrap()).unwrap().is_none());

    s.restore_version(T, "/a/b", 1).unwrap();
    let cur = s.get(T, &ResourcePath::new("/a/b")).unwrap().unwrap();
    assert_eq!(cur.content_str(), Some("hello world"));
    assert_eq!(cur.version, None);
}

#[test]
fn tags_comments_ratings_associations() {
    let s = seeded();
    s.apply_tag(T, "/a/b", "green", "u1").unwrap();
    s.apply_tag(T, "/a/b", "green", "u2").unwrap();
    s.apply_tag(T, "/ab", "green", "u1").unwrap();
    assert_eq!(s.tags(T, "/a/b").unwrap(), vec![Tag { name: "green".into(), count: 2 }]);
    assert_eq!(s.paths_with_tag(T, "green").unwrap(), vec!["/a/b".to_string(), "/ab".to_string()]);
    s.remove_tag(T, "/ab", "green").unwrap();
    assert_eq!(s.paths_with_tag(T, "green").unwrap(), vec!["/a/b".to_string()]);

    let cp = s.add_comment(T, "/a/b", "first", "u1").unwrap();
    assert_eq!(cp, "/a/b;comments:1");
    let cpath = ResourcePath::parse(&cp).unwrap();
    s.edit_comment(T, &cpath, "edited").unwrap();
    assert_eq!(s.comments(T, "/a/b").unwrap()[0].text, "edited");
    s.remove_comment(T, &cpath).unwrap();
    assert!(s.comments(T, "/a/b").unwrap().is_empty());

    s.rate(T, "/a/b", "u1", 4).unwrap();
    s.rate(T, "/a/b", "u2", 2).unwrap();
    assert!((s.average_rating(T, "/a/b").unwrap() - 3.0).abs() < f64::EPSILON);
    assert_eq!(s.rating(T, "/a/b", "u1").unwrap(), 4);
    assert!(s.rate(T, "/a/b", "u1", 9).is_err());

    let assoc = Association { source: "/a/b".into(), target: "/ab".into(), kind: "depends".into() };
    s.add_association(T, assoc.clone()).unwrap();
    assert_eq!(s.associations(T, "/ab", None).unwrap(), vec![assoc.clone()]);
    assert!(s.associations(T, "/ab", Some("uses")).unwrap().is_empty());
    s.delete(T, "/ab").unwrap();
    assert!(s.associations(T, "/a/b", None).unwrap().is_empty());
}

#[test]
fn search_by_criteria() {
    let s = seeded();
    let hits = s.search(T, &SearchCriteria { content_contains: Some("WORLD".into()), ..SearchCriteria::default() }).unwrap();
    assert_eq!(hits, vec!["/a/b".to_string()]);
    let under = s.search(T, &SearchCriteria::under("/a")).unwrap();
    assert_eq!(under, vec!["/a".to_string(), "/a/b".to_string(), "/a/b/c".to_string()]);
}

#[test]
fn snapshot_survives_reopen() {
    let tmp = tempdir().unwrap();
    let file = tmp.path().join("registry.json");
    {
        let s = MemoryStorage::open(&file).unwrap();
        s.put(T, "/persisted", Resource::new().with_content("x")).unwrap();
        s.put(7, "/other", Resource::new()).unwrap();
        s.flush().unwrap();
    }
    let s = MemoryStorage::open(&file).unwrap();
    let r = s.get(T, &ResourcePath::new("/persisted")).unwrap().unwrap();
    assert_eq!(r.content_str(), Some("x"));
    assert!(s.resource_exists(7, &ResourcePath::new("/other")).unwrap());
}

#[test]
fn ensure_parents_creates_missing_collections_only() {
    let s = MemoryStorage::new();
    s.put(T, "/x", Resource::new().with_content("keep")).unwrap();
    ensure_parents(&s, T, "/x/y/z").unwrap();
    assert!(s.get(T, &ResourcePath::root()).unwrap().unwrap().collection);
    assert!(s.get(T, &ResourcePath::new("/x/y")).unwrap().unwrap().collection);
    assert_eq!(s.get(T, &ResourcePath::new("/x")).unwrap().unwrap().content_str(), Some("keep"));
    assert!(!s.resource_exists(T, &ResourcePath::new("/x/y/z")).unwrap());
}
