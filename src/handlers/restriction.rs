use regex::Regex;

use crate::context::{Operation, RequestContext};
use crate::error::{RegistryError, RegistryResult};
use crate::path::{normalize_path, parent_of, to_absolute};
use crate::pipeline::{Handler, Outcome};
use crate::registry::Registry;

/// Rejects RENAME/MOVE requests whose target would leave (or enter) a protected root.
///
/// The boundary of a path is the prefix `pattern` matches in it; source and target must agree
/// on it. Paths the pattern does not match at all share the "unprotected" boundary.
#[derive(Debug, Clone)]
pub struct RegexBaseRestrictionHandler {
    pattern: Regex,
}

impl RegexBaseRestrictionHandler {
    pub fn new(pattern: &str) -> RegistryResult<Self> { Ok(Self { pattern: Regex::new(pattern)? }) }

    fn boundary<'a>(&self, path: &'a str) -> Option<&'a str> { self.pattern.find(path).map(|m| m.as_str()) }

    fn target_of(ctx: &RequestContext) -> Option<String> {
        match &ctx.operation {
            Operation::Move { target } => Some(normalize_path(target.split(';').next().unwrap_or_default())),
            Operation::Rename { new_name } => {
                let parent = parent_of(ctx.path.path()).unwrap_or_else(|| "/".to_string());
                Some(to_absolute(&parent, new_name))
            }
            _ => None,
        }
    }

    fn check(&self, ctx: &RequestContext) -> RegistryResult<()> {
        let Some(target) = Self::target_of(ctx) else { return Ok(()) };
        let source = ctx.path.path();
        if self.boundary(source) != self.boundary(&target) {
            return Err(RegistryError::permission(format!(
                "{} from '{}' to '{}' crosses a protected boundary",
                ctx.method(),
                source,
                target
            )));
        }
        Ok(())
    }
}

impl Handler for RegexBaseRestrictionHandler {
    fn name(&self) -> &str { "RegexBaseRestrictionHandler" }

    fn handle(&self, ctx: &mut RequestContext, _registry: &Registry) -> Outcome {
        match self.check(ctx) {
            Ok(()) => Outcome::Declined,
            Err(e) => Outcome::Failed(e),
        }
    }

    fn simulate(&self, ctx: &RequestContext) -> RegistryResult<()> { self.check(ctx) }
}
