use super::*;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::context::{Operation, Reply, RequestContext, SUPER_TENANT_ID};
use crate::error::RegistryError;
use crate::method::Method;
use crate::path::ResourcePath;
use crate::pipeline::{Handler, MediaTypeFilter, Outcome, PathPatternFilter, Registration};
use crate::registry::{Registry, RegistryContext};
use crate::remote::{InProcessConnector, RemoteConfiguration, RemoteConnector};
use crate::resource::Resource;
use crate::storage::{MemoryStorage, StorageEngine};

fn context() -> Arc<RegistryContext> { RegistryContext::new(RegistryConfig::default(), Arc::new(MemoryStorage::new())) }

fn text(s: &str) -> Resource { Resource::new().with_content(s).with_media_type("text/plain") }

fn request(path: &str, op: Operation) -> RequestContext {
    RequestContext::new(ResourcePath::new(path), op, SUPER_TENANT_ID, "tester")
}

#[test]
fn symlink_redirects_and_maps_paths_back() {
    let reg = context().system_registry().unwrap();
    reg.put("/data/a", text("A")).unwrap();
    reg.create_link("/link", "/data").unwrap();

    let a = reg.get("/link/a").unwrap();
    assert_eq!(a.content_str(), Some("A"));
    assert_eq!(a.path, "/link/a");

    assert_eq!(reg.put("/link/b", text("B")).unwrap(), "/link/b");
    assert_eq!(reg.get("/data/b").unwrap().content_str(), Some("B"));

    let listing = reg.get("/link").unwrap();
    assert_eq!(listing.children, vec!["/link/a".to_string(), "/link/b".to_string()]);

    assert!(matches!(reg.get("/link/missing"), Err(RegistryError::NotFound(p)) if p == "/link/missing"));
}

#[test]
fn relocating_into_a_symlink_lands_in_its_target() {
    let reg = context().system_registry().unwrap();
    reg.put("/real/keep", text("k")).unwrap();
    reg.create_link("/alias", "/real").unwrap();
    reg.put("/plain/doc", text("d")).unwrap();

    assert_eq!(reg.move_to("/plain/doc", "/alias/doc").unwrap(), "/alias/doc");
    assert_eq!(reg.get("/alias/doc").unwrap().content_str(), Some("d"));
    assert_eq!(reg.get("/real/doc").unwrap().content_str(), Some("d"));
    assert!(!reg.resource_exists("/plain/doc").unwrap());

    reg.put("/tree/a", text("a")).unwrap();
    reg.put("/tree/b/c", text("c")).unwrap();
    assert_eq!(reg.copy("/tree", "/alias/tree").unwrap(), "/alias/tree");
    assert_eq!(reg.get("/real/tree/b/c").unwrap().content_str(), Some("c"));
    assert_eq!(reg.get("/alias/tree/a").unwrap().content_str(), Some("a"));
    assert_ne!(reg.get("/tree/a").unwrap().uuid, reg.get("/real/tree/a").unwrap().uuid);
    assert!(reg.resource_exists("/tree/b/c").unwrap());
}

#[test]
fn symlink_leaves_link_management_to_the_mount_point() {
    let handler = SymLinkHandler::new("/link", "/data", "admin");
    let reg = context().system_registry().unwrap();
    for method_op in [Operation::Delete, Operation::RemoveLink] {
        let mut ctx = request("/link", method_op);
        assert_eq!(handler.handle(&mut ctx, &reg), Outcome::Declined);
    }
    let mut elsewhere = request("/linked", Operation::Get);
    assert_eq!(handler.handle(&mut elsewhere, &reg), Outcome::Declined);
    assert!(SymLinkHandler::manages_link(Method::CreateLink));
    assert!(!SymLinkHandler::manages_link(Method::Get));
}

#[test]
fn restriction_blocks_crossing_a_protected_boundary() {
    let handler = RegexBaseRestrictionHandler::new("^/_system/(config|governance)").unwrap();
    let reg = context().system_registry().unwrap();

    let mut inside = request("/_system/config/a", Operation::Move { target: "/_system/config/b".into() });
    assert_eq!(handler.handle(&mut inside, &reg), Outcome::Declined);

    let mut out = request("/_system/config/a", Operation::Move { target: "/public/a".into() });
    assert!(matches!(handler.handle(&mut out, &reg), Outcome::Failed(RegistryError::Permission(_))));

    let mut across = request("/_system/config/a", Operation::Move { target: "/_system/governance/a".into() });
    assert!(matches!(handler.handle(&mut across, &reg), Outcome::Failed(RegistryError::Permission(_))));

    let mut rename = request("/_system/config", Operation::Rename { new_name: "cfg".into() });
    assert!(handler.simulate(&rename).is_err());
    assert!(matches!(handler.handle(&mut rename, &reg), Outcome::Failed(_)));

    let mut unprotected = request("/a/b", Operation::Rename { new_name: "c".into() });
    assert_eq!(handler.handle(&mut unprotected, &reg), Outcome::Declined);
    let mut copy = request("/_system/config/a", Operation::Copy { target: "/public/a".into() });
    assert_eq!(handler.handle(&mut copy, &reg), Outcome::Declined);
}

#[test]
fn statistics_count_top_level_requests_only() {
    let stats = StatisticsHandler::new();
    let reg = context().system_registry().unwrap();
    let mut top = request("/a", Operation::Get);
    let mut nested = top.redirected(ResourcePath::new("/b"));
    assert_eq!(stats.handle(&mut top, &reg), Outcome::Declined);
    assert_eq!(stats.handle(&mut nested, &reg), Outcome::Declined);
    assert_eq!(stats.count(Method::Get), 1);
    stats.reset();
    assert!(stats.counts().is_empty());
}

#[test]
fn registry_statistics_see_redirected_reads_once() {
    let ctx = context();
    let reg = ctx.system_registry().unwrap();
    reg.put("/data/a", text("A")).unwrap();
    reg.create_link("/link", "/data").unwrap();
    let before = ctx.statistics().get(&Method::Get).copied().unwrap_or(0);
    reg.get("/link/a").unwrap();
    assert_eq!(ctx.statistics()[&Method::Get], before + 1);
}

#[test]
fn cache_keys_are_node_scoped_only_for_local_paths() {
    let a = CacheKey::new("db", 1, "/_system/local/x", "node-a", "/_system/local");
    let b = CacheKey::new("db", 1, "/_system/local/x", "node-b", "/_system/local");
    assert_ne!(a.digest(), b.digest());
    assert_eq!(a.digest().len(), 16);

    let c = CacheKey::new("db", 1, "/shared/x", "node-a", "/_system/local");
    let d = CacheKey::new("db", 1, "/shared/x", "node-b", "/_system/local");
    assert_eq!(c, d);
    assert_eq!(c.digest(), d.digest());
    assert_ne!(CacheKey::new("db", 2, "/shared/x", "n", "/l").digest(), c.digest());
}

#[test]
fn cache_invalidation_covers_path_parent_and_descendants() {
    let cache = ResourceCache::new();
    for p in ["/a", "/a/b", "/a/b/c", "/a/b;version:1", "/z"] {
        cache.insert(CacheKey::new("db", 1, p, "n", "/l"), Resource::new());
    }
    cache.insert(CacheKey::new("db", 2, "/a/b", "n", "/l"), Resource::new());
    assert_eq!(cache.invalidate("db", 1, "/a/b"), 4);
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&CacheKey::new("db", 1, "/z", "n", "/l")).is_some());
    assert!(cache.get(&CacheKey::new("db", 2, "/a/b", "n", "/l")).is_some());
}

#[test]
fn caching_handler_serves_hits_and_drops_stale_entries() {
    let ctx = RegistryContext::new(RegistryConfig { cache_enabled: true, ..RegistryConfig::default() }, Arc::new(MemoryStorage::new()));
    let reg = ctx.system_registry().unwrap();
    reg.put("/c/x", text("one")).unwrap();

    assert_eq!(reg.get("/c/x").unwrap().content_str(), Some("one"));
    assert!(!ctx.cache().is_empty());

    // bypass the pipeline: a cached read must still return the old value
    ctx.storage().put(SUPER_TENANT_ID, "/c/x", text("sneaky")).unwrap();
    assert_eq!(reg.get("/c/x").unwrap().content_str(), Some("one"));

    reg.put("/c/x", text("two")).unwrap();
    assert_eq!(reg.get("/c/x").unwrap().content_str(), Some("two"));

    reg.delete("/c").unwrap();
    assert!(reg.get("/c/x").unwrap_err().is_not_found());
}

#[test]
fn query_handler_runs_stored_criteria() {
    let ctx = context();
    let reg = ctx.system_registry().unwrap();
    ctx.handlers()
        .add(
            Registration::new(Arc::new(MediaTypeFilter::new(CRITERIA_QUERY_MEDIA_TYPE)), Arc::new(QueryHandler::new(Arc::new(CriteriaQueryProcessor))))
                .for_methods([Method::ExecuteQuery]),
        )
        .unwrap();
    reg.put("/docs/a", text("alpha").with_property("kind", "note")).unwrap();
    reg.put("/docs/b", text("beta").with_property("kind", "memo")).unwrap();
    reg.put("/other/c", text("gamma").with_property("kind", "note")).unwrap();
    let query = Resource::new()
        .with_media_type(CRITERIA_QUERY_MEDIA_TYPE)
        .with_content(r#"{"under":"/docs","property":"kind"}"#);
    reg.put("/queries/by-kind", query).unwrap();

    let params: BTreeMap<String, String> = [("value".to_string(), "note".to_string())].into_iter().collect();
    assert_eq!(reg.execute_query("/queries/by-kind", params).unwrap(), vec!["/docs/a".to_string()]);

    let all = reg.execute_query("/queries/by-kind", BTreeMap::new()).unwrap();
    assert_eq!(all, vec!["/docs/a".to_string(), "/docs/b".to_string()]);
}

#[test]
fn query_handler_fails_without_a_stored_query() {
    let handler = QueryHandler::new(Arc::new(CriteriaQueryProcessor));
    let reg = context().system_registry().unwrap();
    let mut ctx = request("/missing", Operation::ExecuteQuery { parameters: BTreeMap::new() });
    assert!(matches!(handler.handle(&mut ctx, &reg), Outcome::Failed(RegistryError::NotFound(_))));
    let mut get = request("/missing", Operation::Get);
    assert_eq!(handler.handle(&mut get, &reg), Outcome::Declined);
}

fn remote_pair(read_only: bool) -> (Registry, Arc<RegistryContext>, Arc<InProcessConnector>, RemoteConfiguration) {
    let connector = Arc::new(InProcessConnector::new());
    let remote = context();
    connector.register("inproc://gov", remote.clone());
    let config = RemoteConfiguration::new("gov", "inproc://gov").read_only(read_only).with_chroot("/shared");
    let local = RegistryContext::with_connector(
        RegistryConfig::default().with_remote(config.clone()),
        Arc::new(MemoryStorage::new()),
        connector.clone(),
    );
    (local.system_registry().unwrap(), remote, connector, config)
}

#[test]
fn mount_handler_translates_paths_into_the_remote_root() {
    let (_, _, connector, config) = remote_pair(false);
    let handler = MountHandler::new("/mnt", "/sub", "admin", config, connector);
    assert_eq!(handler.remote_root(), "/shared/sub");
    assert_eq!(handler.remote_path("/mnt"), "/shared/sub");
    assert_eq!(handler.remote_path("/mnt/a/b"), "/shared/sub/a/b");
}

#[test]
fn mount_handler_reads_and_writes_the_remote() {
    let (reg, remote, _, _) = remote_pair(false);
    let remote_reg = remote.system_registry().unwrap();
    remote_reg.put("/shared/cfg/a", text("remote-a")).unwrap();
    reg.create_remote_link("/mnt", "gov", "/cfg").unwrap();

    let a = reg.get("/mnt/a").unwrap();
    assert_eq!(a.content_str(), Some("remote-a"));
    assert_eq!(a.path, "/mnt/a");

    reg.put("/mnt/b", text("local-write")).unwrap();
    assert_eq!(remote_reg.get("/shared/cfg/b").unwrap().content_str(), Some("local-write"));
    assert!(reg.get("/mnt/missing").unwrap_err().is_not_found());
}

#[test]
fn read_only_mounts_reject_mutations() {
    let (reg, remote, _, _) = remote_pair(true);
    remote.system_registry().unwrap().put("/shared/cfg/a", text("ro")).unwrap();
    reg.create_remote_link("/mnt", "gov", "/cfg").unwrap();

    assert_eq!(reg.get("/mnt/a").unwrap().content_str(), Some("ro"));
    assert!(reg.resource_exists("/mnt/a").unwrap());
    assert!(!reg.resource_exists("/mnt/absent").unwrap());
    let err = reg.put("/mnt/a", text("nope")).unwrap_err();
    assert_eq!(err.code(), "permission_denied");
    assert!(matches!(reg.delete("/mnt/a"), Err(RegistryError::Permission(_))));

    // out of the mount
    assert!(matches!(reg.move_to("/mnt/a", "/plain/a"), Err(RegistryError::Permission(_))));
    assert!(matches!(reg.copy("/mnt/a", "/plain/a"), Err(RegistryError::Permission(_))));
    assert!(matches!(reg.rename("/mnt/a", "b"), Err(RegistryError::Permission(_))));
    assert!(matches!(reg.rename("/mnt", "moved"), Err(RegistryError::Permission(_))));
    assert!(!reg.resource_exists("/plain/a").unwrap());
    assert!(reg.resource_exists("/mnt/a").unwrap());

    // into the mount
    reg.put("/plain/doc", text("local")).unwrap();
    assert!(matches!(reg.move_to("/plain/doc", "/mnt/doc"), Err(RegistryError::Permission(_))));
    assert!(matches!(reg.copy("/plain/doc", "/mnt/doc"), Err(RegistryError::Permission(_))));
    reg.put("/mnx", text("n")).unwrap();
    assert!(matches!(reg.rename("/mnx", "mnt"), Err(RegistryError::OperationFailed(_))));
    assert!(reg.resource_exists("/plain/doc").unwrap());
    assert!(reg.resource_exists("/mnx").unwrap());
    let remote_reg = remote.system_registry().unwrap();
    assert!(!remote_reg.resource_exists("/shared/cfg/doc").unwrap());
    assert!(!reg.context().storage().resource_exists(SUPER_TENANT_ID, &ResourcePath::new("/mnt/doc")).unwrap());

    // unmounting is still allowed
    reg.remove_link("/mnt").unwrap();
}

#[test]
fn simulated_relocation_into_a_read_only_mount_is_reported() {
    let (_, _, connector, config) = remote_pair(true);
    let handler = MountHandler::new("/mnt", "/cfg", "admin", config, connector);
    assert!(handler.simulate(&request("/plain/a", Operation::Move { target: "/mnt/a".into() })).is_err());
    assert!(handler.simulate(&request("/plain/a", Operation::Copy { target: "/other".into() })).is_ok());
    assert!(handler.simulate(&request("/mnt/a", Operation::Get)).is_ok());
}

#[test]
fn relocation_across_a_remote_mount_runs_on_both_sides() {
    let (reg, remote, _, _) = remote_pair(false);
    let remote_reg = remote.system_registry().unwrap();
    remote_reg.put("/shared/cfg/policy", text("p")).unwrap();
    reg.create_remote_link("/mnt", "gov", "/cfg").unwrap();

    assert_eq!(reg.copy("/mnt/policy", "/backup/policy").unwrap(), "/backup/policy");
    assert_eq!(reg.get("/backup/policy").unwrap().content_str(), Some("p"));
    assert!(!remote_reg.resource_exists("/backup/policy").unwrap());
    assert!(remote_reg.resource_exists("/shared/cfg/policy").unwrap());

    reg.put("/plain/doc", text("d")).unwrap();
    assert_eq!(reg.move_to("/plain/doc", "/mnt/doc").unwrap(), "/mnt/doc");
    assert_eq!(remote_reg.get("/shared/cfg/doc").unwrap().content_str(), Some("d"));
    assert_eq!(reg.get("/mnt/doc").unwrap().content_str(), Some("d"));
    assert!(!reg.resource_exists("/plain/doc").unwrap());

    assert_eq!(reg.move_to("/mnt/doc", "/plain/back").unwrap(), "/plain/back");
    assert!(!remote_reg.resource_exists("/shared/cfg/doc").unwrap());
    assert_eq!(reg.get("/plain/back").unwrap().content_str(), Some("d"));

    // moves inside the mount stay on the remote
    assert_eq!(reg.move_to("/mnt/policy", "/mnt/archived").unwrap(), "/mnt/archived");
    assert!(remote_reg.resource_exists("/shared/cfg/archived").unwrap());
}

#[test]
fn unreachable_remote_reads_empty_and_fails_writes() {
    let (reg, _, connector, _) = remote_pair(false);
    reg.create_remote_link("/mnt", "gov", "/cfg").unwrap();
    assert!(connector.unregister("inproc://gov"));
    let fresh = MountHandler::new("/mnt", "/cfg", "admin", RemoteConfiguration::new("gov", "inproc://gov"), connector.clone());

    let mut exists = request("/mnt/a", Operation::ResourceExists);
    assert_eq!(fresh.handle(&mut exists, &reg), Outcome::Handled(Reply::Bool(false)));
    let mut get = request("/mnt/a", Operation::Get);
    assert!(matches!(fresh.handle(&mut get, &reg), Outcome::Failed(RegistryError::NotFound(_))));
    let mut put = request("/mnt/a", Operation::Put { resource: Resource::new() });
    assert!(matches!(fresh.handle(&mut put, &reg), Outcome::Failed(RegistryError::OperationFailed(_))));
    assert!(connector.connect(&RemoteConfiguration::new("gov", "inproc://gov")).is_err());
}

#[test]
fn remote_tag_hits_merge_into_local_search() {
    let (reg, remote, _, _) = remote_pair(false);
    let remote_reg = remote.system_registry().unwrap();
    remote_reg.put("/shared/cfg/a", text("a")).unwrap();
    remote_reg.apply_tag("/shared/cfg/a", "hot").unwrap();
    remote_reg.put("/shared/elsewhere", text("x")).unwrap();
    remote_reg.apply_tag("/shared/elsewhere", "hot").unwrap();
    reg.put("/local", text("l")).unwrap();
    reg.apply_tag("/local", "hot").unwrap();
    reg.create_remote_link("/mnt", "gov", "/cfg").unwrap();

    assert_eq!(reg.paths_with_tag("hot").unwrap(), vec!["/local".to_string(), "/mnt/a".to_string()]);
}

#[test]
fn path_pattern_filter_routes_configured_handlers() {
    let ctx = context();
    let reg = ctx.system_registry().unwrap();
    let filter = PathPatternFilter::empty().with_method_pattern(Method::Move, "/locked/.*").unwrap();
    ctx.handlers()
        .add(Registration::new(Arc::new(filter), Arc::new(RegexBaseRestrictionHandler::new("^/locked").unwrap())))
        .unwrap();
    reg.put("/locked/a", text("a")).unwrap();
    assert!(matches!(reg.move_to("/locked/a", "/free/a"), Err(RegistryError::Permission(_))));
    assert_eq!(reg.copy("/locked/a", "/free/a").unwrap(), "/free/a");
}
