//! Continuous probe events
//!
//! Emitted through the caller's callback on every tick and on reachability changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::probe::{ReachabilityFailure, ReachabilityResult};
use crate::models::{DeviceId, Endpoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProbeEvent {
    /// Continuous probe started
    MonitoringStarted {
        source: Endpoint,
        target: Endpoint,
        interval_seconds: u64,
    },

    /// A tick finished its check
    CheckCompleted { tick: u32, result: ReachabilityResult },

    /// Target went from reachable (or never checked) to unreachable
    ReachabilityLost {
        tick: u32,
        failure_reason: Option<ReachabilityFailure>,
        suppressed_by: Vec<DeviceId>,
        escalate: bool,
    },

    /// Target answered again after a failure
    ReachabilityRestored { tick: u32, latency_ms: Option<f64> },

    /// The check itself could not run (unknown endpoint, invalid options)
    MonitoringError { tick: u32, message: String },

    /// Continuous probe stopped after cancellation
    MonitoringStopped { ticks: u32 },
}

/// Lifecycle of a continuous probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeState {
    #[default]
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStatus {
    pub state: ProbeState,
    pub interval_seconds: u64,
    pub tick_count: u32,
    pub last_check_time: Option<DateTime<Utc>>,
    pub last_reachable: Option<bool>,
}
