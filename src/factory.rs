//! Name → constructor maps for configured handlers and filters.
//!
//! Configuration names a handler or filter by class name; the constructors below are the only
//! ones that exist. Unknown names fail with `HandlerInstantiation` and the caller skips them.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::config::{FilterConfig, HandlerConfig, Properties};
use crate::error::{RegistryError, RegistryResult};
use crate::handlers::{CachingHandler, CriteriaQueryProcessor, QueryHandler, RegexBaseRestrictionHandler, ResourceCache, StatisticsHandler, CRITERIA_QUERY_MEDIA_TYPE};
use crate::method::Method;
use crate::pipeline::{Filter, Handler, LifecyclePhase, MediaTypeFilter, PathPatternFilter, Registration, Simulation, SimulationFilter};

/// Shared objects constructors may wire into what they build.
pub struct FactoryEnv {
    pub simulation: Arc<Simulation>,
    pub cache: Arc<ResourceCache>,
    pub connection_id: String,
    pub node_id: String,
    pub local_base_path: String,
}

pub type HandlerCtor = fn(&Properties, &FactoryEnv) -> RegistryResult<Arc<dyn Handler>>;
pub type FilterCtor = fn(&Properties, &FactoryEnv) -> RegistryResult<Arc<dyn Filter>>;

fn required<'a>(class: &str, props: &'a Properties, key: &str) -> RegistryResult<&'a str> {
    props
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RegistryError::instantiation(class, format!("missing property '{key}'")))
}

fn statistics(_: &Properties, _: &FactoryEnv) -> RegistryResult<Arc<dyn Handler>> { Ok(Arc::new(StatisticsHandler::new())) }

fn restriction(props: &Properties, _: &FactoryEnv) -> RegistryResult<Arc<dyn Handler>> {
    let pattern = required("RegexBaseRestrictionHandler", props, "pattern")?;
    Ok(Arc::new(RegexBaseRestrictionHandler::new(pattern)?))
}

fn query(_: &Properties, _: &FactoryEnv) -> RegistryResult<Arc<dyn Handler>> {
    Ok(Arc::new(QueryHandler::new(Arc::new(CriteriaQueryProcessor))))
}

fn caching(_: &Properties, env: &FactoryEnv) -> RegistryResult<Arc<dyn Handler>> {
    Ok(Arc::new(CachingHandler::new(env.cache.clone(), env.connection_id.clone(), env.node_id.clone(), env.local_base_path.clone())))
}

fn path_pattern(props: &Properties, _: &FactoryEnv) -> RegistryResult<Arc<dyn Filter>> {
    let mut filter = match props.get("pattern") {
        Some(p) => PathPatternFilter::new(p)?,
        None => PathPatternFilter::empty(),
    };
    for (key, pattern) in props {
        if let Some(method) = key.strip_prefix("pattern.") {
            filter = filter.with_method_pattern(method.parse::<Method>()?, pattern)?;
        }
    }
    Ok(Arc::new(filter))
}

fn media_type(props: &Properties, _: &FactoryEnv) -> RegistryResult<Arc<dyn Filter>> {
    let mt = props.get("mediaType").map(String::as_str).unwrap_or(CRITERIA_QUERY_MEDIA_TYPE);
    Ok(Arc::new(MediaTypeFilter::new(mt)))
}

fn simulation(_: &Properties, env: &FactoryEnv) -> RegistryResult<Arc<dyn Filter>> {
    Ok(Arc::new(SimulationFilter::new(env.simulation.clone())))
}

static HANDLERS: Lazy<BTreeMap<&'static str, HandlerCtor>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, HandlerCtor> = BTreeMap::new();
    m.insert("StatisticsHandler", statistics);
    m.insert("RegexBaseRestrictionHandler", restriction);
    m.insert("QueryHandler", query);
    m.insert("CachingHandler", caching);
    m
});

static FILTERS: Lazy<BTreeMap<&'static str, FilterCtor>> = Lazy::new(|| {
    let mut m: BTreeMap<&'static str, FilterCtor> = BTreeMap::new();
    m.insert("PathPatternFilter", path_pattern);
    m.insert("MediaTypeFilter", media_type);
    m.insert("SimulationFilter", simulation);
    m
});

pub fn handler_names() -> Vec<&'static str> { HANDLERS.keys().copied().collect() }

pub fn filter_names() -> Vec<&'static str> { FILTERS.keys().copied().collect() }

pub fn create_handler(class: &str, props: &Properties, env: &FactoryEnv) -> RegistryResult<Arc<dyn Handler>> {
    let ctor = HANDLERS.get(class).ok_or_else(|| RegistryError::instantiation(class, "unknown handler class"))?;
    ctor(props, env)
}

pub fn create_filter(class: &str, props: &Properties, env: &FactoryEnv) -> RegistryResult<Arc<dyn Filter>> {
    let ctor = FILTERS.get(class).ok_or_else(|| RegistryError::instantiation(class, "unknown filter class"))?;
    ctor(props, env)
}

/// Build one registration from configuration. A missing filter matches every path.
pub fn build_registration(cfg: &HandlerConfig, env: &FactoryEnv) -> RegistryResult<Registration> {
    let handler = create_handler(&cfg.class, &cfg.properties, env)?;
    let filter: Arc<dyn Filter> = match &cfg.filter {
        Some(FilterConfig { class, properties }) => create_filter(class, properties, env)?,
        None => Arc::new(PathPatternFilter::new(".*")?),
    };
    let mut reg = Registration::new(filter, handler).in_phase(cfg.phase);
    if let Some(methods) = &cfg.methods {
        reg = reg.for_methods(methods.iter().copied());
    }
    if cfg.phase == LifecyclePhase::TenantSpecific {
        let tenant = cfg
            .tenant
            .ok_or_else(|| RegistryError::instantiation(cfg.class.clone(), "tenant-specific handler without a tenant"))?;
        reg = reg.for_tenant(tenant);
    }
    Ok(reg)
}

/// Build every configured registration, skipping (with a warning) those that fail.
pub fn build_registrations(configs: &[HandlerConfig], env: &FactoryEnv) -> Vec<Registration> {
    configs
        .iter()
        .filter_map(|cfg| match build_registration(cfg, env) {
            Ok(reg) => Some(reg),
            Err(e) => {
                warn!(target: "mountreg::config", "skipping handler '{}': {}", cfg.class, e);
                None
            }
        })
        .collect()
}
