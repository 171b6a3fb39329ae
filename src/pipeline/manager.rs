use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::{Reply, RequestContext, TenantId};
use crate::error::{RegistryError, RegistryResult};
use crate::method::Method;
use crate::registry::Registry;

use super::handler::same_handler;
use super::{Filter, Handler, LifecyclePhase, Outcome, Registration, Simulation, SIMULATION_FAILED, SIMULATION_SUCCESSFUL};

type Chain = Vec<Arc<Registration>>;

#[derive(Debug, Clone, Default)]
struct PhaseTable {
    system: Chain,
    tenant_specific: HashMap<TenantId, Chain>,
    user_defined: Chain,
    reporting: Chain,
}

impl PhaseTable {
    fn chain(&self, phase: LifecyclePhase, tenant: Option<TenantId>) -> &[Arc<Registration>] {
        match phase {
            LifecyclePhase::System => &self.system,
            LifecyclePhase::TenantSpecific => {
                tenant.and_then(|t| self.tenant_specific.get(&t)).map(Vec::as_slice).unwrap_or(&[])
            }
            LifecyclePhase::UserDefined => &self.user_defined,
            LifecyclePhase::Reporting => &self.reporting,
        }
    }

    fn chain_mut(&mut self, phase: LifecyclePhase, tenant: Option<TenantId>) -> Option<&mut Chain> {
        match phase {
            LifecyclePhase::System => Some(&mut self.system),
            LifecyclePhase::TenantSpecific => tenant.map(|t| self.tenant_specific.entry(t).or_default()),
            LifecyclePhase::UserDefined => Some(&mut self.user_defined),
            LifecyclePhase::Reporting => Some(&mut self.reporting),
        }
    }
}

/// Ordered, phase-bucketed handler registrations.
///
/// Writers clone the table and swap it in under a short write lock; `dispatch` clones the
/// current `Arc` and walks that snapshot without holding any lock, so registration changes
/// never tear an in-flight walk.
pub struct HandlerManager {
    table: RwLock<Arc<PhaseTable>>,
    simulation: Arc<Simulation>,
}

impl HandlerManager {
    pub fn new(simulation: Arc<Simulation>) -> Self {
        Self { table: RwLock::new(Arc::new(PhaseTable::default())), simulation }
    }

    pub fn simulation(&self) -> &Arc<Simulation> { &self.simulation }

    fn snapshot(&self) -> Arc<PhaseTable> { self.table.read().clone() }

    fn mutate<T>(&self, f: impl FnOnce(&mut PhaseTable) -> T) -> T {
        let mut guard = self.table.write();
        let mut next = (**guard).clone();
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    pub fn add(&self, registration: Registration) -> RegistryResult<()> {
        if registration.phase == LifecyclePhase::TenantSpecific && registration.tenant.is_none() {
            return Err(RegistryError::failed(format!(
                "handler '{}' registered in the tenant-specific phase without a tenant",
                registration.handler.name()
            )));
        }
        debug!(
            target: "mountreg::pipeline",
            "add handler='{}' phase={:?} tenant={:?} methods={:?}",
            registration.handler.name(), registration.phase, registration.tenant, registration.methods
        );
        let phase = registration.phase;
        let tenant = registration.tenant;
        self.mutate(|t| {
            if let Some(chain) = t.chain_mut(phase, tenant) {
                chain.push(Arc::new(registration));
            }
        });
        Ok(())
    }

    /// Register in the default (user-defined) phase. `None` methods means all.
    pub fn add_handler(&self, methods: Option<&[Method]>, filter: Arc<dyn Filter>, handler: Arc<dyn Handler>) -> RegistryResult<()> {
        let mut reg = Registration::new(filter, handler);
        if let Some(m) = methods {
            reg = reg.for_methods(m.iter().copied());
        }
        self.add(reg)
    }

    /// Remove every registration of this handler instance from one phase. Returns how many.
    pub fn remove_handler(&self, handler: &Arc<dyn Handler>, phase: LifecyclePhase, tenant: Option<TenantId>) -> usize {
        let removed = self.mutate(|t| match t.chain_mut(phase, tenant) {
            Some(chain) => {
                let before = chain.len();
                chain.retain(|r| !r.is_handler(handler));
                before - chain.len()
            }
            None => 0,
        });
        if removed > 0 {
            debug!(target: "mountreg::pipeline", "removed handler='{}' phase={:?} tenant={:?} count={}", handler.name(), phase, tenant, removed);
        }
        removed
    }

    /// Current registrations of one phase, in walk order.
    pub fn registrations(&self, phase: LifecyclePhase, tenant: Option<TenantId>) -> Vec<Arc<Registration>> {
        self.snapshot().chain(phase, tenant).to_vec()
    }

    pub fn contains(&self, handler: &Arc<dyn Handler>, phase: LifecyclePhase, tenant: Option<TenantId>) -> bool {
        self.snapshot().chain(phase, tenant).iter().any(|r| same_handler(&r.handler, handler))
    }

    pub fn len(&self) -> usize {
        let t = self.snapshot();
        t.system.len() + t.tenant_specific.values().map(Vec::len).sum::<usize>() + t.user_defined.len() + t.reporting.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn clear(&self) { self.mutate(|t| *t = PhaseTable::default()); }

    /// Walk SYSTEM, TENANT_SPECIFIC (for the context's tenant) and USER_DEFINED until a handler
    /// handles the request, else run `fallback`; then run REPORTING as a side-effect pass.
    pub fn dispatch<F>(&self, ctx: &mut RequestContext, registry: &Registry, fallback: F) -> RegistryResult<Reply>
    where
        F: FnOnce(&mut RequestContext) -> RegistryResult<Reply>,
    {
        let snap = self.snapshot();
        let tenant = Some(ctx.effective_tenant());

        if self.simulation.is_active() {
            return self.dispatch_simulated(ctx, &snap, tenant, fallback);
        }

        let mut produced = None;
        'phases: for phase in LifecyclePhase::PRIMARY {
            ctx.phase = phase;
            for reg in snap.chain(phase, tenant) {
                if !reg.eligible(ctx) {
                    continue;
                }
                match reg.handler.handle(ctx, registry) {
                    Outcome::Handled(reply) => {
                        ctx.set_handled(true);
                        debug!(
                            target: "mountreg::pipeline",
                            "{} '{}' handled by '{}' in {:?}",
                            ctx.method(), ctx.path, reg.handler.name(), phase
                        );
                        produced = Some(reply);
                        break 'phases;
                    }
                    Outcome::Declined => {}
                    Outcome::Failed(err) => {
                        debug!(
                            target: "mountreg::pipeline",
                            "{} '{}' failed in '{}': {}",
                            ctx.method(), ctx.path, reg.handler.name(), err
                        );
                        return Err(err);
                    }
                }
            }
        }

        let reply = match produced {
            Some(reply) => reply,
            None => {
                ctx.phase = LifecyclePhase::UserDefined;
                fallback(ctx)?
            }
        };

        if snap.reporting.is_empty() {
            return Ok(reply);
        }
        ctx.phase = LifecyclePhase::Reporting;
        ctx.result = Some(reply.clone());
        for reg in &snap.reporting {
            if !reg.eligible(ctx) {
                continue;
            }
            if let Outcome::Failed(err) = reg.handler.handle(ctx, registry) {
                warn!(
                    target: "mountreg::pipeline",
                    "reporting handler '{}' failed for {} '{}': {}",
                    reg.handler.name(), ctx.method(), ctx.path, err
                );
            }
        }
        ctx.result = None;
        Ok(reply)
    }

    fn dispatch_simulated<F>(&self, ctx: &mut RequestContext, snap: &PhaseTable, tenant: Option<TenantId>, fallback: F) -> RegistryResult<Reply>
    where
        F: FnOnce(&mut RequestContext) -> RegistryResult<Reply>,
    {
        for phase in LifecyclePhase::PRIMARY {
            ctx.phase = phase;
            for reg in snap.chain(phase, tenant) {
                if !reg.eligible(ctx) {
                    continue;
                }
                let name = reg.handler.name();
                match reg.handler.simulate(ctx) {
                    Ok(()) => self.simulation.record(name, SIMULATION_SUCCESSFUL),
                    Err(err) => {
                        self.simulation.record(name, SIMULATION_FAILED);
                        self.simulation.record(name, err.to_string());
                    }
                }
            }
        }
        ctx.phase = LifecyclePhase::UserDefined;
        if ctx.method().is_mutating() {
            return Ok(Reply::simulated(&ctx.operation, &ctx.path));
        }
        fallback(ctx)
    }
}
