use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::info;

pub const SIMULATION_SUCCESSFUL: &str = "Successful";
pub const SIMULATION_FAILED: &str = "Failed";

/// Dry-run toggle plus the per-handler outcome report collected while it is on.
#[derive(Debug, Default)]
pub struct Simulation {
    active: AtomicBool,
    status: Mutex<HashMap<String, Vec<String>>>,
}

impl Simulation {
    pub fn new() -> Self { Self::default() }

    pub fn is_active(&self) -> bool { self.active.load(Ordering::Acquire) }

    /// Turn simulation on with an empty report.
    pub fn start(&self) {
        self.status.lock().clear();
        self.active.store(true, Ordering::Release);
        info!(target: "mountreg::pipeline", "simulation started");
    }

    /// Turn simulation off and discard the report.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        self.status.lock().clear();
        info!(target: "mountreg::pipeline", "simulation stopped");
    }

    pub fn record(&self, handler: &str, outcome: impl Into<String>) {
        self.status.lock().entry(handler.to_string()).or_default().push(outcome.into());
    }

    pub fn status(&self) -> HashMap<String, Vec<String>> { self.status.lock().clone() }
}
