use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::context::RequestContext;
use crate::method::Method;
use crate::pipeline::{Handler, Outcome};
use crate::registry::Registry;

/// REPORTING-phase counter of completed operations per method.
/// Only top-level requests count; redirected re-dispatches are the same operation.
#[derive(Debug, Default)]
pub struct StatisticsHandler {
    counts: Mutex<BTreeMap<Method, u64>>,
}

impl StatisticsHandler {
    pub fn new() -> Self { Self::default() }

    pub fn counts(&self) -> BTreeMap<Method, u64> { self.counts.lock().clone() }

    pub fn count(&self, method: Method) -> u64 { self.counts.lock().get(&method).copied().unwrap_or(0) }

    pub fn reset(&self) { self.counts.lock().clear(); }
}

impl Handler for StatisticsHandler {
    fn name(&self) -> &str { "StatisticsHandler" }

    fn handle(&self, ctx: &mut RequestContext, _registry: &Registry) -> Outcome {
        if ctx.depth == 0 {
            *self.counts.lock().entry(ctx.method()).or_insert(0) += 1;
        }
        Outcome::Declined
    }
}
