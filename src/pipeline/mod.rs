//! Operation-dispatch pipeline.
//!
//! Every repository operation is walked through ordered lifecycle phases of
//! `(methods, filter, handler)` registrations before falling back to the storage engine.
//! Keep the public surface thin and split implementation across sub-modules.

use serde::{Deserialize, Serialize};

mod filter;
mod handler;
mod manager;
mod simulation;

pub use filter::{Filter, MediaTypeFilter, MountFilter, PathPatternFilter, SimulationFilter};
pub use handler::{Handler, Outcome, Registration};
pub use manager::HandlerManager;
pub use simulation::{Simulation, SIMULATION_FAILED, SIMULATION_SUCCESSFUL};

/// Priority bucket of handler registrations, walked in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Safety and restriction handlers.
    System,
    /// Mount and symlink handlers scoped to one tenant.
    TenantSpecific,
    /// Operator-configured handlers; the storage engine is the implicit last one.
    #[default]
    UserDefined,
    /// Side-effect pass after the primary result exists. Failures are logged, never surfaced.
    Reporting,
}

impl LifecyclePhase {
    pub const PRIMARY: [LifecyclePhase; 3] =
        [LifecyclePhase::System, LifecyclePhase::TenantSpecific, LifecyclePhase::UserDefined];
}

#[cfg(test)]
mod pipeline_tests;
