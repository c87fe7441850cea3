//! One-shot reachability checks
//!
//! A check pins one snapshot, retries the liveness probe within a per-attempt
//! timeout, and explains a final failure through the dependency graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::prober::{LivenessProber, TopologyProber};
use crate::config::{ProbeSettings, MAX_CHECK_INTERVAL, MAX_PROBE_RETRIES};
use crate::error::{Result, TopologyError};
use crate::models::{DeviceId, Endpoint};
use crate::paths::PathFinder;
use crate::suppression::SuppressionEngine;
use crate::topology::{TopologySnapshot, TopologyStore};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityOptions {
    /// Consult the dependency graph before reporting a failure
    #[serde(default = "default_true")]
    pub include_dependencies: bool,
    /// Report suppressed failures as ordinary escalating failures
    #[serde(default)]
    pub include_suppressed: bool,
    pub check_interval_secs: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for ReachabilityOptions {
    fn default() -> Self {
        Self::from_settings(&ProbeSettings::from_env())
    }
}

impl ReachabilityOptions {
    pub fn from_settings(settings: &ProbeSettings) -> Self {
        Self {
            include_dependencies: true,
            include_suppressed: false,
            check_interval_secs: settings.check_interval_secs,
            timeout_ms: settings.timeout_ms,
            max_retries: settings.max_retries,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachabilityQuery {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub options: ReachabilityOptions,
}

impl ReachabilityQuery {
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            source,
            target,
            options: ReachabilityOptions::default(),
        }
    }

    pub fn between_devices(source: impl Into<DeviceId>, target: impl Into<DeviceId>) -> Self {
        Self::new(Endpoint::Device(source.into()), Endpoint::Device(target.into()))
    }

    pub fn with_options(mut self, options: ReachabilityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn include_dependencies(mut self, include: bool) -> Self {
        self.options.include_dependencies = include;
        self
    }

    pub fn include_suppressed(mut self, include: bool) -> Self {
        self.options.include_suppressed = include;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options.max_retries = retries;
        self
    }

    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.options.check_interval_secs = interval.as_secs();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let options = &self.options;
        if options.timeout_ms == 0 {
            return Err(TopologyError::InvalidConstraint(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if options.check_interval_secs == 0 || options.check_interval_secs > MAX_CHECK_INTERVAL {
            return Err(TopologyError::InvalidConstraint(format!(
                "check_interval must be between 1 and {} seconds, got {}",
                MAX_CHECK_INTERVAL, options.check_interval_secs
            )));
        }
        if options.max_retries > MAX_PROBE_RETRIES {
            return Err(TopologyError::InvalidConstraint(format!(
                "max_retries must be at most {}, got {}",
                MAX_PROBE_RETRIES, options.max_retries
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReachabilityFailure {
    /// Every attempt ran out of time
    ProbeTimeout,
    /// The last attempt got a negative answer
    Unreachable,
    SuppressedByUpstream,
    /// The dependency graph has a cycle, so suppression could not be decided
    SuppressionIndeterminate,
}

impl ReachabilityFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReachabilityFailure::ProbeTimeout => "probe-timeout",
            ReachabilityFailure::Unreachable => "unreachable",
            ReachabilityFailure::SuppressedByUpstream => "suppressed-by-upstream",
            ReachabilityFailure::SuppressionIndeterminate => "suppression-indeterminate",
        }
    }
}

impl std::fmt::Display for ReachabilityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityResult {
    pub source: Endpoint,
    pub target: Endpoint,
    pub is_reachable: bool,
    /// Round-trip of the successful attempt
    pub latency_ms: Option<f64>,
    pub failure_reason: Option<ReachabilityFailure>,
    /// Upstream devices whose failure explains this one
    pub suppressed_by: Vec<DeviceId>,
    /// Whether this outcome should raise a new, independent alarm
    pub escalate: bool,
    pub attempts: u32,
    pub snapshot_version: u64,
    pub checked_at: DateTime<Utc>,
}

impl ReachabilityResult {
    pub fn is_suppressed(&self) -> bool {
        !self.suppressed_by.is_empty()
    }
}

#[derive(Clone)]
pub struct ReachabilityProbe {
    store: Arc<TopologyStore>,
    prober: Arc<dyn LivenessProber>,
    suppression: SuppressionEngine,
}

impl std::fmt::Debug for ReachabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReachabilityProbe")
            .field("snapshot_version", &self.store.version())
            .finish_non_exhaustive()
    }
}

impl ReachabilityProbe {
    pub fn new(store: Arc<TopologyStore>, prober: Arc<dyn LivenessProber>) -> Self {
        Self {
            store,
            prober,
            suppression: SuppressionEngine::new(),
        }
    }

    /// Probe backed by path search over the store's own snapshots.
    pub fn from_topology(store: Arc<TopologyStore>) -> Self {
        let prober = TopologyProber::new(PathFinder::new(Arc::clone(&store)));
        Self::new(store, Arc::new(prober))
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    pub async fn check(&self, query: &ReachabilityQuery) -> Result<ReachabilityResult> {
        let snapshot = self.store.snapshot();
        self.check_in(&snapshot, query).await
    }

    /// Check against a snapshot the caller already pinned.
    pub async fn check_in(
        &self,
        snapshot: &TopologySnapshot,
        query: &ReachabilityQuery,
    ) -> Result<ReachabilityResult> {
        query.validate()?;
        let source = snapshot.endpoint_device(&query.source)?.id.clone();
        let target = snapshot.endpoint_device(&query.target)?.id.clone();

        let options = &query.options;
        let max_attempts = options.max_retries + 1;
        let mut failure = ReachabilityFailure::Unreachable;
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            let attempt = self.prober.probe(snapshot, &query.source, &query.target);
            match tokio::time::timeout(options.timeout(), attempt).await {
                Ok(Ok(latency_ms)) => {
                    tracing::debug!(
                        "[PROBE] {} -> {} reachable in {:.2}ms (attempt {})",
                        query.source,
                        query.target,
                        latency_ms,
                        attempts
                    );
                    return Ok(ReachabilityResult {
                        source: query.source.clone(),
                        target: query.target.clone(),
                        is_reachable: true,
                        latency_ms: Some(latency_ms),
                        failure_reason: None,
                        suppressed_by: Vec::new(),
                        escalate: false,
                        attempts,
                        snapshot_version: snapshot.version(),
                        checked_at: Utc::now(),
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!(
                        "[PROBE] {} -> {} attempt {}/{} failed: {}",
                        query.source,
                        query.target,
                        attempts,
                        max_attempts,
                        e
                    );
                    failure = ReachabilityFailure::Unreachable;
                }
                Err(_) => {
                    tracing::debug!(
                        "[PROBE] {} -> {} attempt {}/{} timed out after {}ms",
                        query.source,
                        query.target,
                        attempts,
                        max_attempts,
                        options.timeout_ms
                    );
                    failure = ReachabilityFailure::ProbeTimeout;
                }
            }
        }

        let mut result = ReachabilityResult {
            source: query.source.clone(),
            target: query.target.clone(),
            is_reachable: false,
            latency_ms: None,
            failure_reason: Some(failure),
            suppressed_by: Vec::new(),
            escalate: true,
            attempts,
            snapshot_version: snapshot.version(),
            checked_at: Utc::now(),
        };
        if options.include_dependencies {
            self.explain(snapshot, query, [&source, &target], &mut result)?;
        }

        tracing::info!(
            "[PROBE] {} -> {} unreachable: {}{}",
            query.source,
            query.target,
            result
                .failure_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown"),
            if result.escalate { "" } else { " (suppressed)" }
        );
        Ok(result)
    }

    /// Fold suppression of either endpoint device into a failed result.
    fn explain(
        &self,
        snapshot: &TopologySnapshot,
        query: &ReachabilityQuery,
        devices: [&DeviceId; 2],
        result: &mut ReachabilityResult,
    ) -> Result<()> {
        let mut by: Vec<DeviceId> = Vec::new();
        for device in devices {
            match self.suppression.is_suppressed(device, snapshot) {
                Ok(status) => {
                    for ancestor in status.by {
                        if !by.contains(&ancestor) {
                            by.push(ancestor);
                        }
                    }
                }
                Err(TopologyError::SuppressionCycleDetected { cycle }) => {
                    tracing::warn!(
                        "[PROBE] Suppression indeterminate for {}: cycle through {} devices",
                        device,
                        cycle.len().saturating_sub(1)
                    );
                    result.failure_reason = Some(ReachabilityFailure::SuppressionIndeterminate);
                    result.escalate = true;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        if by.is_empty() {
            return Ok(());
        }
        if !query.options.include_suppressed {
            result.failure_reason = Some(ReachabilityFailure::SuppressedByUpstream);
            result.escalate = false;
        }
        result.suppressed_by = by;
        Ok(())
    }
}
