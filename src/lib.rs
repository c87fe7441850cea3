//! NEXUS Topology: analysis core for discovered network topologies
//!
//! This crate answers operator questions over a versioned topology snapshot:
//! - Constrained, ranked path search between devices or interfaces
//! - Link confidence fused from independent discovery reports
//! - Dependency-driven suppression of failures explained upstream
//! - One-shot and continuous reachability probes
//! - Suppression-aware alerts and JSON exports

pub mod alerts;
pub mod app;
pub mod cli;
pub mod command;
mod command_handlers;
pub mod config;
pub mod error;
pub mod exports;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod paths;
pub mod scoring;
pub mod suppression;
pub mod topology;

pub use alerts::{
    Alert, AlertSeverity, AlertType, count_alerts_by_type, dedupe_alerts, detect_alerts,
    detect_alerts_without_baseline, has_high_priority_alerts,
};
pub use app::{
    AppCommandResult, AppContext, AppEvent, CtrlCGuard, EventHook, OutputHook, execute_command,
    execute_command_typed, execute_command_with_context, run, run_with_context,
};
pub use cli::{CliCommand, parse_cli_args, usage_text, version_text};
pub use command::{AppCommand, PathArgs, ReachArgs};
pub use config::{PathSettings, ProbeSettings, ScorerSettings};
pub use error::{EntityKind, Result, TopologyError};
pub use exports::{export_path_results_json, export_topology_json};
pub use models::*;
pub use monitor::{
    ContinuousProbe, LivenessProber, ProbeEvent, ProbeFailure, ProbeState, ProbeStatus,
    ReachabilityFailure, ReachabilityOptions, ReachabilityProbe, ReachabilityQuery,
    ReachabilityResult, TopologyProber,
};
pub use paths::{PathConstraints, PathFailure, PathFinder, PathHop, PathQuery, PathResult};
pub use scoring::{ConfidenceScorer, PairScore};
pub use suppression::{SuppressionEngine, SuppressionStatus};
pub use topology::{DiscoveryUpdate, TopologyDocument, TopologySnapshot, TopologyStore};

// Re-export logging macros for use across crate
pub use crate::logging::macros;
