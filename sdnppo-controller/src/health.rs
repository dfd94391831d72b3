use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerHealth {
    pub uptime_seconds: u64,
    pub switches_connected: usize,
    pub links: usize,
    pub hosts_known: usize,
    pub meters_installed: usize,
    pub active_flows: usize,
    pub events_handled: u64,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    start_time: Instant,
    events_handled: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            events_handled: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_event(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn events_handled(&self) -> u64 {
        self.events_handled.load(Ordering::Relaxed)
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
