use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::{Operation, Reply, RequestContext};
use crate::error::{RegistryError, RegistryResult};
use crate::path::normalize_path;
use crate::pipeline::{Handler, Outcome};
use crate::registry::Registry;
use crate::resource::Resource;
use crate::storage::SearchCriteria;

/// Media type of stored criteria queries understood by `CriteriaQueryProcessor`.
pub const CRITERIA_QUERY_MEDIA_TYPE: &str = "application/vnd.mountreg.criteria+json";

/// Executes a stored query resource of one media type.
pub trait QueryProcessor: Send + Sync {
    /// `query` is the stored query resource; `parameters` come from the caller.
    fn execute(&self, query: &Resource, parameters: &BTreeMap<String, String>, registry: &Registry, ctx: &RequestContext) -> RegistryResult<Vec<String>>;
}

/// Build search criteria from `under`, `mediaType`, `property`, `value` and `content`.
pub fn criteria_from(parameters: &BTreeMap<String, String>) -> SearchCriteria {
    let mut criteria = SearchCriteria {
        under: parameters.get("under").map(|u| normalize_path(u)),
        media_type: parameters.get("mediaType").cloned(),
        content_contains: parameters.get("content").cloned(),
        ..SearchCriteria::default()
    };
    if let Some(name) = parameters.get("property") {
        criteria = criteria.with_property(name.clone(), parameters.get("value").cloned());
    }
    criteria
}

/// Stored query content is a JSON object of default criteria; caller parameters override it.
#[derive(Debug, Default, Clone, Copy)]
pub struct CriteriaQueryProcessor;

impl QueryProcessor for CriteriaQueryProcessor {
    fn execute(&self, query: &Resource, parameters: &BTreeMap<String, String>, registry: &Registry, ctx: &RequestContext) -> RegistryResult<Vec<String>> {
        let mut merged: BTreeMap<String, String> = match query.content.as_deref() {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes)?,
            _ => BTreeMap::new(),
        };
        merged.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        registry.context().storage().search(ctx.effective_tenant(), &criteria_from(&merged))
    }
}

/// Runs `EXECUTE_QUERY` for stored query resources through a `QueryProcessor`.
/// Registered under a `MediaTypeFilter` for the processor's media type.
pub struct QueryHandler {
    processor: Arc<dyn QueryProcessor>,
}

impl QueryHandler {
    pub fn new(processor: Arc<dyn QueryProcessor>) -> Self { Self { processor } }
}

impl Handler for QueryHandler {
    fn name(&self) -> &str { "QueryHandler" }

    fn handle(&self, ctx: &mut RequestContext, registry: &Registry) -> Outcome {
        let Operation::ExecuteQuery { parameters } = &ctx.operation else { return Outcome::Declined };
        let Some(query) = ctx.loaded.as_ref() else {
            return Outcome::Failed(RegistryError::not_found(ctx.path.complete_path()));
        };
        self.processor.execute(query, parameters, registry, ctx).map(Reply::Paths).into()
    }
}
