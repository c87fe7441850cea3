//! Configuration constants for the topology analysis core
//!
//! Every constant has an env-tunable accessor (`NEXUS_*`) that clamps to a sane range
//! and falls back to the compiled default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::DiscoverySource;

// ====== Path Search Configuration ======

/// Hop bound applied when a query does not carry one
pub const DEFAULT_MAX_HOPS: u32 = 8;

/// Ranked alternatives returned per path query
pub const DEFAULT_MAX_PATHS: usize = 3;

/// Extra hop penalty for a routed (L3) transition when L2 is preferred
pub const L3_HOP_PENALTY: u32 = 1;

/// Per-hop forwarding latency assumed when a link has no measurement (ms)
pub const DEFAULT_HOP_LATENCY_MS: f64 = 0.5;

/// Frame size used to estimate serialization delay from link speed (bits)
pub const REFERENCE_FRAME_BITS: f64 = 12_000.0;

// ====== Confidence Scoring Configuration ======

pub const PRIOR_LLDP: f64 = 0.9;
pub const PRIOR_CDP: f64 = 0.85;
/// SNMP bridge-table inference is indirect evidence
pub const PRIOR_SNMP: f64 = 0.6;
pub const PRIOR_MANUAL: f64 = 1.0;

/// Reports younger than this are not decayed (seconds)
pub const FRESHNESS_WINDOW_SECS: u64 = 300;

/// Confidence halves every this many seconds past the freshness window
pub const STALE_HALF_LIFE_SECS: u64 = 900;

// ====== Reachability Probe Configuration ======

/// Timeout for each probe attempt
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Retries after the first failed attempt
pub const PROBE_RETRIES: u32 = 1;

/// Hard cap on retries a query may request
pub const MAX_PROBE_RETRIES: u32 = 10;

/// Default continuous-check interval in seconds
pub const DEFAULT_CHECK_INTERVAL: u64 = 60;

/// Minimum continuous-check interval in seconds
pub const MIN_CHECK_INTERVAL: u64 = 1;

/// Maximum continuous-check interval in seconds
pub const MAX_CHECK_INTERVAL: u64 = 3600;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse_u64(name: &str, default: u64, min: u64, max: u64) -> u64 {
    match env_var(name).and_then(|v| v.parse::<u64>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_u32(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match env_var(name).and_then(|v| v.parse::<u32>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_usize(name: &str, default: usize, min: usize, max: usize) -> usize {
    match env_var(name).and_then(|v| v.parse::<usize>().ok()) {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

fn env_parse_f64(name: &str, default: f64, min: f64, max: f64) -> f64 {
    match env_var(name)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
    {
        Some(v) => v.clamp(min, max),
        None => default,
    }
}

/// Runtime-tunable default hop bound.
/// Env: `NEXUS_DEFAULT_MAX_HOPS`
pub fn default_max_hops() -> u32 {
    env_parse_u32("NEXUS_DEFAULT_MAX_HOPS", DEFAULT_MAX_HOPS, 1, 255)
}

/// Runtime-tunable number of ranked paths.
/// Env: `NEXUS_MAX_PATHS`
pub fn max_paths() -> usize {
    env_parse_usize("NEXUS_MAX_PATHS", DEFAULT_MAX_PATHS, 1, 64)
}

/// Runtime-tunable L3 penalty.
/// Env: `NEXUS_L3_PENALTY`
pub fn l3_hop_penalty() -> u32 {
    env_parse_u32("NEXUS_L3_PENALTY", L3_HOP_PENALTY, 0, 16)
}

/// Runtime-tunable per-hop latency fallback.
/// Env: `NEXUS_DEFAULT_HOP_LATENCY_MS`
pub fn default_hop_latency_ms() -> f64 {
    env_parse_f64(
        "NEXUS_DEFAULT_HOP_LATENCY_MS",
        DEFAULT_HOP_LATENCY_MS,
        0.0,
        10_000.0,
    )
}

/// Runtime-tunable freshness window.
/// Env: `NEXUS_FRESHNESS_WINDOW_SECS`
pub fn freshness_window() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NEXUS_FRESHNESS_WINDOW_SECS",
        FRESHNESS_WINDOW_SECS,
        0,
        30 * 86_400,
    ))
}

/// Runtime-tunable staleness half-life.
/// Env: `NEXUS_STALE_HALF_LIFE_SECS`
pub fn stale_half_life() -> Duration {
    Duration::from_secs(env_parse_u64(
        "NEXUS_STALE_HALF_LIFE_SECS",
        STALE_HALF_LIFE_SECS,
        1,
        30 * 86_400,
    ))
}

/// Runtime-tunable per-attempt probe timeout.
/// Env: `NEXUS_PROBE_TIMEOUT_MS`
pub fn probe_timeout() -> Duration {
    Duration::from_millis(env_parse_u64(
        "NEXUS_PROBE_TIMEOUT_MS",
        PROBE_TIMEOUT.as_millis() as u64,
        10,
        60_000,
    ))
}

/// Runtime-tunable probe retry count.
/// Env: `NEXUS_PROBE_RETRIES`
pub fn probe_retries() -> u32 {
    env_parse_u32("NEXUS_PROBE_RETRIES", PROBE_RETRIES, 0, MAX_PROBE_RETRIES)
}

/// Runtime-tunable continuous-check interval.
/// Env: `NEXUS_CHECK_INTERVAL_SECS`
pub fn default_check_interval() -> u64 {
    env_parse_u64(
        "NEXUS_CHECK_INTERVAL_SECS",
        DEFAULT_CHECK_INTERVAL,
        MIN_CHECK_INTERVAL,
        MAX_CHECK_INTERVAL,
    )
}

/// Topology document the CLI loads when no `--snapshot` is given.
/// Env: `NEXUS_SNAPSHOT`
pub fn snapshot_path() -> Option<PathBuf> {
    env_var("NEXUS_SNAPSHOT").map(PathBuf::from)
}

/// Path search tuning (env-driven).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    pub default_max_hops: u32,
    pub max_paths: usize,
    pub l3_penalty: u32,
    pub default_hop_latency_ms: f64,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathSettings {
    pub fn from_env() -> Self {
        Self {
            default_max_hops: default_max_hops(),
            max_paths: max_paths(),
            l3_penalty: l3_hop_penalty(),
            default_hop_latency_ms: default_hop_latency_ms(),
        }
    }
}

/// Discovery-source priors and staleness decay (env-driven).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerSettings {
    pub prior_lldp: f64,
    pub prior_cdp: f64,
    pub prior_snmp: f64,
    pub prior_manual: f64,
    pub freshness_window_secs: u64,
    pub stale_half_life_secs: u64,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ScorerSettings {
    pub fn from_env() -> Self {
        Self {
            prior_lldp: env_parse_f64("NEXUS_PRIOR_LLDP", PRIOR_LLDP, 0.0, 1.0),
            prior_cdp: env_parse_f64("NEXUS_PRIOR_CDP", PRIOR_CDP, 0.0, 1.0),
            prior_snmp: env_parse_f64("NEXUS_PRIOR_SNMP", PRIOR_SNMP, 0.0, 1.0),
            prior_manual: env_parse_f64("NEXUS_PRIOR_MANUAL", PRIOR_MANUAL, 0.0, 1.0),
            freshness_window_secs: freshness_window().as_secs(),
            stale_half_life_secs: stale_half_life().as_secs(),
        }
    }

    pub fn prior(&self, source: DiscoverySource) -> f64 {
        match source {
            DiscoverySource::Lldp => self.prior_lldp,
            DiscoverySource::Cdp => self.prior_cdp,
            DiscoverySource::Snmp => self.prior_snmp,
            DiscoverySource::Manual => self.prior_manual,
        }
    }
}

/// Reachability probe defaults (env-driven).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub check_interval_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ProbeSettings {
    pub fn from_env() -> Self {
        Self {
            timeout_ms: probe_timeout().as_millis() as u64,
            max_retries: probe_retries(),
            check_interval_secs: default_check_interval(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
