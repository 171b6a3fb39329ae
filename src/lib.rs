//! Path-addressed, multi-tenant resource registry.
//!
//! Every operation on a `Registry` runs through an interceptor pipeline of lifecycle phases
//! before falling back to the storage engine. Symbolic links and remote mounts are ordinary
//! pipeline handlers installed by the mount registry, and are reconciled from configuration
//! and persisted placeholders once per tenant.

pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod handlers;
pub mod method;
pub mod mount;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod remote;
pub mod resource;
pub mod storage;
pub mod system_paths;

pub use config::RegistryConfig;
pub use context::{Operation, Reply, RequestContext, TenantId, SUPER_TENANT_ID};
pub use error::{RegistryError, RegistryResult};
pub use method::Method;
pub use mount::{LinkTarget, Mount};
pub use registry::{Registry, RegistryContext};
pub use resource::Resource;
pub use storage::{MemoryStorage, StorageEngine};

