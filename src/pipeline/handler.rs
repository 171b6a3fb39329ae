use std::collections::BTreeSet;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::context::{Reply, RequestContext, TenantId};
use crate::error::{RegistryError, RegistryResult};
use crate::method::Method;
use crate::registry::Registry;

use super::{Filter, LifecyclePhase};

/// What a handler did with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Fully serviced; later primary phases and the storage fallback are skipped.
    Handled(Reply),
    /// Not this handler's business; keep walking.
    Declined,
    Failed(RegistryError),
}

impl From<RegistryResult<Reply>> for Outcome {
    fn from(r: RegistryResult<Reply>) -> Self {
        match r {
            Ok(reply) => Outcome::Handled(reply),
            Err(e) => Outcome::Failed(e),
        }
    }
}

pub trait Handler: Send + Sync {
    /// Stable name; keys the simulation report.
    fn name(&self) -> &str;

    /// `registry` lets redirecting handlers re-enter the dispatcher.
    fn handle(&self, ctx: &mut RequestContext, registry: &Registry) -> Outcome;

    /// Dry-run check used in simulation mode. Must not mutate anything.
    fn simulate(&self, _ctx: &RequestContext) -> RegistryResult<()> { Ok(()) }
}

/// One `(methods, filter, handler)` entry in a lifecycle phase.
#[derive(Clone)]
pub struct Registration {
    /// `None` means every method.
    pub methods: Option<BTreeSet<Method>>,
    pub filter: Arc<dyn Filter>,
    pub handler: Arc<dyn Handler>,
    pub phase: LifecyclePhase,
    /// Required for `TenantSpecific`, ignored elsewhere.
    pub tenant: Option<TenantId>,
}

impl Registration {
    pub fn new(filter: Arc<dyn Filter>, handler: Arc<dyn Handler>) -> Self {
        Self { methods: None, filter, handler, phase: LifecyclePhase::UserDefined, tenant: None }
    }

    pub fn for_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn in_phase(mut self, phase: LifecyclePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn for_tenant(mut self, tenant: TenantId) -> Self {
        self.phase = LifecyclePhase::TenantSpecific;
        self.tenant = Some(tenant);
        self
    }

    pub fn eligible(&self, ctx: &RequestContext) -> bool {
        let method_ok = self.methods.as_ref().map(|m| m.contains(&ctx.method())).unwrap_or(true);
        method_ok && self.filter.matches(ctx)
    }

    pub fn is_handler(&self, handler: &Arc<dyn Handler>) -> bool { same_handler(&self.handler, handler) }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("handler", &self.handler.name())
            .field("methods", &self.methods)
            .field("phase", &self.phase)
            .field("tenant", &self.tenant)
            .finish()
    }
}

/// Identity comparison on the data pointer only.
pub(crate) fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
