//! Built-in handlers.
//!
//! - `SymLinkHandler` / `MountHandler`: redirect a mounted subtree (installed by `MountRegistry`).
//! - `RegexBaseRestrictionHandler`: SYSTEM-phase guard for rename/move across protected roots.
//! - `StatisticsHandler`, `CachingHandler`: REPORTING-phase side effects.
//! - `QueryHandler`: custom query execution by media type.

pub mod cache;
pub mod mount;
pub mod query;
pub mod restriction;
pub mod stats;
pub mod symlink;

pub use cache::{CacheKey, CachingHandler, ResourceCache};
pub use mount::MountHandler;
pub use query::{CriteriaQueryProcessor, QueryHandler, QueryProcessor, CRITERIA_QUERY_MEDIA_TYPE};
pub use restriction::RegexBaseRestrictionHandler;
pub use stats::StatisticsHandler;
pub use symlink::SymLinkHandler;

#[cfg(test)]
mod handlers_tests;
