use super::*;

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::context::{Operation, Reply, RequestContext, TenantId, SUPER_TENANT_ID};
use crate::error::{RegistryError, RegistryResult};
use crate::method::Method;
use crate::path::ResourcePath;
use crate::registry::{Registry, RegistryContext};
use crate::resource::Resource;
use crate::storage::MemoryStorage;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy)]
enum Act {
    Decline,
    Handle,
    Fail,
}

struct Probe {
    name: String,
    log: Log,
    act: Act,
}

impl Handler for Probe {
    fn name(&self) -> &str { &self.name }

    fn handle(&self, ctx: &mut RequestContext, _registry: &Registry) -> Outcome {
        self.log.lock().push(format!("{}@{:?}", self.name, ctx.phase));
        match self.act {
            Act::Decline => Outcome::Declined,
            Act::Handle => Outcome::Handled(Reply::Path(self.name.clone())),
            Act::Fail => Outcome::Failed(RegistryError::failed(format!("{} failed", self.name))),
        }
    }

    fn simulate(&self, _ctx: &RequestContext) -> RegistryResult<()> {
        match self.act {
            Act::Fail => Err(RegistryError::permission("not allowed")),
            _ => Ok(()),
        }
    }
}

/// Captures what REPORTING handlers get to see.
#[derive(Default)]
struct ResultSpy {
    seen: Mutex<Vec<(Option<Reply>, bool)>>,
}

impl Handler for ResultSpy {
    fn name(&self) -> &str { "ResultSpy" }

    fn handle(&self, ctx: &mut RequestContext, _registry: &Registry) -> Outcome {
        self.seen.lock().push((ctx.result.clone(), ctx.is_handled()));
        Outcome::Declined
    }
}

fn probe(name: &str, log: &Log, act: Act) -> Arc<dyn Handler> {
    Arc::new(Probe { name: name.to_string(), log: log.clone(), act })
}

fn everything() -> Arc<dyn Filter> { Arc::new(PathPatternFilter::new(".*").unwrap()) }

fn registry() -> Registry {
    RegistryContext::new(RegistryConfig::default(), Arc::new(MemoryStorage::new())).system_registry().unwrap()
}

fn manager() -> HandlerManager { HandlerManager::new(Arc::new(Simulation::new())) }

fn request(path: &str, op: Operation, tenant: TenantId) -> RequestContext {
    RequestContext::new(ResourcePath::new(path), op, tenant, "tester")
}

fn fallback_logging(log: &Log) -> impl FnOnce(&mut RequestContext) -> RegistryResult<Reply> + '_ {
    move |_| {
        log.lock().push("fallback".to_string());
        Ok(Reply::Unit)
    }
}

#[test]
fn phases_run_in_order_and_first_handler_wins() {
    let log: Log = Arc::default();
    let m = manager();
    m.add(Registration::new(everything(), probe("u1", &log, Act::Decline))).unwrap();
    m.add(Registration::new(everything(), probe("s1", &log, Act::Decline)).in_phase(LifecyclePhase::System)).unwrap();
    m.add(Registration::new(everything(), probe("t1", &log, Act::Decline)).for_tenant(SUPER_TENANT_ID)).unwrap();
    m.add(Registration::new(everything(), probe("t5", &log, Act::Handle)).for_tenant(5)).unwrap();
    m.add(Registration::new(everything(), probe("u2", &log, Act::Handle))).unwrap();
    m.add(Registration::new(everything(), probe("u3", &log, Act::Handle))).unwrap();
    m.add(Registration::new(everything(), probe("r1", &log, Act::Decline)).in_phase(LifecyclePhase::Reporting)).unwrap();

    let reg = registry();
    let mut ctx = request("/a", Operation::Get, SUPER_TENANT_ID);
    let reply = m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap();

    assert_eq!(reply, Reply::Path("u2".into()));
    assert_eq!(*log.lock(), vec!["s1@System", "t1@TenantSpecific", "u1@UserDefined", "u2@UserDefined", "r1@Reporting"]);
    assert!(ctx.is_handled());
}

#[test]
fn fallback_runs_last_and_reporting_sees_the_result() {
    let log: Log = Arc::default();
    let spy = Arc::new(ResultSpy::default());
    let m = manager();
    m.add(Registration::new(everything(), probe("s1", &log, Act::Decline)).in_phase(LifecyclePhase::System)).unwrap();
    m.add(Registration::new(everything(), spy.clone()).in_phase(LifecyclePhase::Reporting)).unwrap();

    let reg = registry();
    let mut ctx = request("/a", Operation::ResourceExists, SUPER_TENANT_ID);
    let reply = m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap();

    assert_eq!(reply, Reply::Unit);
    assert_eq!(*log.lock(), vec!["s1@System", "fallback"]);
    assert_eq!(*spy.seen.lock(), vec![(Some(Reply::Unit), false)]);
    assert!(ctx.result.is_none());
}

#[test]
fn primary_failure_aborts_but_reporting_failure_is_swallowed() {
    let log: Log = Arc::default();
    let m = manager();
    m.add(Registration::new(everything(), probe("r-bad", &log, Act::Fail)).in_phase(LifecyclePhase::Reporting)).unwrap();
    m.add(Registration::new(everything(), probe("r-after", &log, Act::Decline)).in_phase(LifecyclePhase::Reporting)).unwrap();
    let reg = registry();

    let mut ctx = request("/a", Operation::Get, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Unit);
    assert_eq!(*log.lock(), vec!["fallback", "r-bad@Reporting", "r-after@Reporting"]);

    log.lock().clear();
    m.add(Registration::new(everything(), probe("s-bad", &log, Act::Fail)).in_phase(LifecyclePhase::System)).unwrap();
    m.add(Registration::new(everything(), probe("u1", &log, Act::Handle))).unwrap();
    let mut ctx = request("/a", Operation::Get, SUPER_TENANT_ID);
    let err = m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap_err();
    assert_eq!(err, RegistryError::failed("s-bad failed"));
    assert_eq!(*log.lock(), vec!["s-bad@System"]);
}

#[test]
fn methods_and_filters_gate_eligibility() {
    let log: Log = Arc::default();
    let m = manager();
    m.add(Registration::new(everything(), probe("puts", &log, Act::Handle)).for_methods([Method::Put])).unwrap();
    m.add(Registration::new(Arc::new(PathPatternFilter::new("/only/.*").unwrap()), probe("only", &log, Act::Handle))).unwrap();
    let reg = registry();

    let mut ctx = request("/elsewhere", Operation::Get, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Unit);

    let mut ctx = request("/only/x", Operation::Get, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Path("only".into()));

    let mut ctx = request("/elsewhere", Operation::Put { resource: Resource::new() }, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Path("puts".into()));
}

#[test]
fn tenant_specific_chain_follows_effective_tenant() {
    let log: Log = Arc::default();
    let m = manager();
    m.add(Registration::new(everything(), probe("t7", &log, Act::Handle)).for_tenant(7)).unwrap();
    assert!(m.add(Registration::new(everything(), probe("nobody", &log, Act::Handle)).in_phase(LifecyclePhase::TenantSpecific)).is_err());
    let reg = registry();

    let mut ctx = request("/a", Operation::Get, 3);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Unit);

    let mut ctx = request("/a", Operation::Get, 3);
    ctx.caller_tenant_id = Some(7);
    assert_eq!(m.dispatch(&mut ctx, &reg, fallback_logging(&log)).unwrap(), Reply::Path("t7".into()));
}

#[test]
fn removal_only_touches_the_named_registration() {
    let log: Log = Arc::default();
    let m = manager();
    let a = probe("a", &log, Act::Handle);
    let b = probe("b", &log, Act::Handle);
    m.add(Registration::new(everything(), a.clone()).for_methods([Method::Get])).unwrap();
    m.add(Registration::new(everything(), a.clone()).for_methods([Method::Put])).unwrap();
    m.add(Registration::new(everything(), b.clone())).unwrap();
    assert_eq!(m.len(), 3);

    assert_eq!(m.remove_handler(&a, LifecyclePhase::System, None), 0);
    assert_eq!(m.remove_handler(&a, LifecyclePhase::UserDefined, None), 2);
    assert!(!m.contains(&a, LifecyclePhase::UserDefined, None));
    assert!(m.contains(&b, LifecyclePhase::UserDefined, None));

    let mut ctx = request("/x", Operation::Get, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &registry(), fallback_logging(&log)).unwrap(), Reply::Path("b".into()));

    m.clear();
    assert!(m.is_empty());
}

#[test]
fn registration_changes_do_not_tear_in_flight_dispatch() {
    let log: Log = Arc::default();
    let m = Arc::new(manager());
    m.add(Registration::new(everything(), probe("stable", &log, Act::Handle))).unwrap();
    let reg = registry();

    thread::scope(|s| {
        let writer = {
            let m = m.clone();
            let log = log.clone();
            s.spawn(move || {
                for i in 0..200 {
                    let h = probe(&format!("churn{i}"), &log, Act::Decline);
                    m.add(Registration::new(everything(), h.clone()).in_phase(LifecyclePhase::System)).unwrap();
                    m.remove_handler(&h, LifecyclePhase::System, None);
                }
            })
        };
        for _ in 0..4 {
            let m = m.clone();
            let reg = reg.clone();
            s.spawn(move || {
                for _ in 0..200 {
                    let mut ctx = request("/x", Operation::Get, SUPER_TENANT_ID);
                    let reply = m.dispatch(&mut ctx, &reg, |_| Ok(Reply::Unit)).unwrap();
                    assert_eq!(reply, Reply::Path("stable".into()));
                }
            });
        }
        writer.join().unwrap();
    });
    assert_eq!(m.len(), 1);
}

#[test]
fn simulation_records_outcomes_without_mutating() {
    let log: Log = Arc::default();
    let sim = Arc::new(Simulation::new());
    let m = HandlerManager::new(sim.clone());
    m.add(Registration::new(everything(), probe("good", &log, Act::Handle))).unwrap();
    m.add(Registration::new(Arc::new(SimulationFilter::new(sim.clone())), probe("dry", &log, Act::Decline))).unwrap();
    let reg = registry();

    let mut ctx = request("/x", Operation::Get, SUPER_TENANT_ID);
    assert_eq!(m.dispatch(&mut ctx, &reg, |_| Ok(Reply::Unit)).unwrap(), Reply::Path("good".into()));
    m.add(Registration::new(everything(), probe("bad", &log, Act::Fail)).in_phase(LifecyclePhase::System)).unwrap();

    sim.start();
    let mut ctx = request("/x", Operation::Delete, SUPER_TENANT_ID);
    let reply = m.dispatch(&mut ctx, &reg, |_| panic!("storage must not run for simulated mutations")).unwrap();
    assert_eq!(reply, Reply::Unit);
    assert!(log.lock().iter().all(|l| l == "good@UserDefined"), "handlers must not run for real: {:?}", log.lock());

    let status = sim.status();
    assert_eq!(status["good"], vec![SIMULATION_SUCCESSFUL.to_string()]);
    assert_eq!(status["dry"], vec![SIMULATION_SUCCESSFUL.to_string()]);
    assert_eq!(status["bad"][0], SIMULATION_FAILED);
    assert!(status["bad"][1].contains("not allowed"));

    sim.stop();
    assert!(sim.status().is_empty());
    assert!(!sim.is_active());
}

#[test]
fn mount_filter_matches_relocations_landing_under_the_mount() {
    let filter = MountFilter::new("/mnt").unwrap();
    let at = |path: &str, op: Operation| RequestContext::new(ResourcePath::new(path), op, SUPER_TENANT_ID, "tester");
    assert!(filter.matches(&at("/mnt/a", Operation::Get)));
    assert!(!filter.matches(&at("/mnta", Operation::Get)));
    assert!(filter.matches(&at("/plain/a", Operation::Move { target: "/mnt/a".into() })));
    assert!(filter.matches(&at("/plain/a", Operation::Copy { target: "/mnt;version:1".into() })));
    assert!(!filter.matches(&at("/plain/a", Operation::Copy { target: "/mntx/a".into() })));
    assert!(filter.matches(&at("/x", Operation::GetResourcePathsWithTag { tag: "t".into() })));
}
