//! Alert types for reachability monitoring
//!
//! Defines alert categories and severity levels

use serde::{Deserialize, Serialize};

use crate::models::{DeviceId, Endpoint};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Types of alerts that can be generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertType {
    /// Target stopped answering and nothing upstream explains it
    ReachabilityLost,
    /// Target answers again after a failure
    ReachabilityRestored,
    /// Target failed, but an upstream failure already accounts for it
    SuppressedFailure,
    /// The dependency graph has a cycle; the failure could not be attributed
    SuppressionIndeterminate,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ReachabilityLost => "REACHABILITY_LOST",
            AlertType::ReachabilityRestored => "REACHABILITY_RESTORED",
            AlertType::SuppressedFailure => "SUPPRESSED_FAILURE",
            AlertType::SuppressionIndeterminate => "SUPPRESSION_INDETERMINATE",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertType::ReachabilityLost => AlertSeverity::High,
            AlertType::ReachabilityRestored => AlertSeverity::Low,
            AlertType::SuppressedFailure => AlertSeverity::Low,
            AlertType::SuppressionIndeterminate => AlertSeverity::Critical,
        }
    }
}

/// A generated alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub source: Option<Endpoint>,
    pub target: Option<Endpoint>,
    pub message: String,
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed_by: Vec<DeviceId>,
}

impl Alert {
    pub fn new(alert_type: AlertType, message: impl Into<String>) -> Self {
        let severity = alert_type.severity();
        Self {
            alert_type,
            source: None,
            target: None,
            message: message.into(),
            severity,
            suppressed_by: Vec::new(),
        }
    }

    pub fn with_endpoints(mut self, source: &Endpoint, target: &Endpoint) -> Self {
        self.source = Some(source.clone());
        self.target = Some(target.clone());
        self
    }

    pub fn with_suppressed_by(mut self, by: &[DeviceId]) -> Self {
        self.suppressed_by = by.to_vec();
        self
    }

    pub fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Alerts with the same key describe the same condition on the same pair
    pub fn dedupe_key(&self) -> String {
        let endpoint = |e: &Option<Endpoint>| e.as_ref().map(|e| e.to_string()).unwrap_or_default();
        format!(
            "{}|{}|{}",
            self.alert_type.as_str(),
            endpoint(&self.source),
            endpoint(&self.target)
        )
    }
}
