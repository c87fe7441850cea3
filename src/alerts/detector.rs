//! Alert detection logic
//!
//! Compares consecutive reachability results to detect changes and generate alerts

use std::collections::{BTreeMap, BTreeSet};

use super::types::{Alert, AlertSeverity, AlertType};
use crate::models::DeviceId;
use crate::monitor::{ReachabilityFailure, ReachabilityResult};

fn joined(ids: &[DeviceId]) -> String {
    ids.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", ")
}

/// Alert describing a failed result, `None` when the target is reachable.
pub fn alert_for_result(result: &ReachabilityResult) -> Option<Alert> {
    if result.is_reachable {
        return None;
    }

    let alert = match result.failure_reason {
        Some(ReachabilityFailure::SuppressedByUpstream) => Alert::new(
            AlertType::SuppressedFailure,
            format!(
                "{} unreachable from {}, explained by upstream failure of {}",
                result.target,
                result.source,
                joined(&result.suppressed_by)
            ),
        ),
        Some(ReachabilityFailure::SuppressionIndeterminate) => Alert::new(
            AlertType::SuppressionIndeterminate,
            format!(
                "{} unreachable from {}; dependency cycle prevents attribution",
                result.target, result.source
            ),
        ),
        reason => {
            let reason = reason.unwrap_or(ReachabilityFailure::Unreachable);
            let mut message = format!(
                "{} unreachable from {} ({})",
                result.target, result.source, reason
            );
            if result.is_suppressed() {
                message.push_str(&format!(
                    " - upstream also failed: {}",
                    joined(&result.suppressed_by)
                ));
            }
            Alert::new(AlertType::ReachabilityLost, message)
        }
    };

    Some(
        alert
            .with_endpoints(&result.source, &result.target)
            .with_suppressed_by(&result.suppressed_by),
    )
}

/// Detect alerts for a batch of results when no earlier result is known.
pub fn detect_alerts_without_baseline(results: &[ReachabilityResult]) -> Vec<Alert> {
    results.iter().filter_map(alert_for_result).collect()
}

/// Detect alerts by comparing the current result with the previous one for the same pair
pub fn detect_alerts(
    previous: Option<&ReachabilityResult>,
    current: &ReachabilityResult,
) -> Vec<Alert> {
    let Some(previous) = previous else {
        return alert_for_result(current).into_iter().collect();
    };

    match (previous.is_reachable, current.is_reachable) {
        (true, false) => alert_for_result(current).into_iter().collect(),
        (false, true) => {
            let latency = current
                .latency_ms
                .map(|ms| format!(" in {:.2}ms", ms))
                .unwrap_or_default();
            vec![
                Alert::new(
                    AlertType::ReachabilityRestored,
                    format!(
                        "{} reachable again from {}{}",
                        current.target, current.source, latency
                    ),
                )
                .with_endpoints(&current.source, &current.target),
            ]
        }
        // Still failing: only a change in attribution is news
        (false, false)
            if previous.failure_reason != current.failure_reason
                || previous.suppressed_by != current.suppressed_by =>
        {
            alert_for_result(current).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Quick check if any alerts are high priority
pub fn has_high_priority_alerts(alerts: &[Alert]) -> bool {
    alerts
        .iter()
        .any(|a| matches!(a.severity, AlertSeverity::High | AlertSeverity::Critical))
}

/// Count alerts by type
pub fn count_alerts_by_type(alerts: &[Alert]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for alert in alerts {
        *counts
            .entry(alert.alert_type.as_str().to_string())
            .or_insert(0) += 1;
    }
    counts
}

/// Drop alerts whose `dedupe_key` was already seen, keeping first occurrences in order
pub fn dedupe_alerts(alerts: Vec<Alert>) -> Vec<Alert> {
    let mut seen = BTreeSet::new();
    alerts
        .into_iter()
        .filter(|alert| seen.insert(alert.dedupe_key()))
        .collect()
}
