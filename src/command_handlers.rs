use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::alerts::{detect_alerts, Alert};
use crate::app::{AppContext, AppEvent, ReachReport, SuppressionReport, WatchSummary};
use crate::command::{PathArgs, ReachArgs};
use crate::config::PathSettings;
use crate::exports::export_topology_json;
use crate::models::DeviceId;
use crate::monitor::{ProbeEvent, ReachabilityProbe, ReachabilityQuery, ReachabilityResult};
use crate::paths::{PathConstraints, PathFinder, PathQuery, PathResult};
use crate::scoring::ConfidenceScorer;
use crate::suppression::{SuppressionEngine, SuppressionStatus};
use crate::topology::{TopologyDocument, TopologySnapshot, TopologyStore};

/// How often `watch` looks at the cancel flag and the tick budget
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn load_store(
    snapshot: Option<PathBuf>,
    context: &AppContext,
) -> Result<Arc<TopologyStore>> {
    let path = snapshot
        .or_else(|| context.snapshot_path().map(PathBuf::from))
        .ok_or_else(|| {
            anyhow::anyhow!("No topology snapshot given. Pass --snapshot <PATH> or set NEXUS_SNAPSHOT.")
        })?;

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read topology snapshot {}", path.display()))?;
    let document = TopologyDocument::from_json(&raw)
        .with_context(|| format!("Failed to parse topology snapshot {}", path.display()))?;
    let store = TopologyStore::from_document(&document)
        .with_context(|| format!("Topology snapshot {} is inconsistent", path.display()))?;

    let snapshot = store.snapshot();
    crate::log_debug!(
        "Loaded snapshot v{} from {} ({} devices, {} links)",
        snapshot.version(),
        path.display(),
        snapshot.device_count(),
        snapshot.link_count()
    );
    context.emit_event(AppEvent::SnapshotLoaded {
        path: path.display().to_string(),
        version: snapshot.version(),
        devices: snapshot.device_count(),
        links: snapshot.link_count(),
    });
    Ok(Arc::new(store))
}

pub(crate) fn find_paths(
    store: &Arc<TopologyStore>,
    source: &str,
    target: &str,
    args: &PathArgs,
) -> Result<Vec<PathResult>> {
    let snapshot = store.snapshot();
    let settings = PathSettings::from_env();
    let defaults = PathConstraints::from_settings(&settings);
    let constraints = PathConstraints {
        prefer_l2: args.prefer_l2,
        include_l3_hops: !args.no_l3,
        max_hops: args.max_hops.unwrap_or(defaults.max_hops),
        exclude_down_links: !args.include_down,
        max_paths: args.max_paths.unwrap_or(defaults.max_paths),
    };
    let query = PathQuery::new(
        snapshot.resolve_endpoint(source)?,
        snapshot.resolve_endpoint(target)?,
    )
    .with_constraints(constraints);

    let finder = PathFinder::new(Arc::clone(store)).with_settings(settings);
    let paths = finder
        .find_paths_in(&snapshot, &query)
        .with_context(|| format!("Path search {} -> {} failed", source, target))?;
    Ok(paths)
}

fn reach_query(
    snapshot: &TopologySnapshot,
    source: &str,
    target: &str,
    args: &ReachArgs,
) -> Result<ReachabilityQuery> {
    let mut query = ReachabilityQuery::new(
        snapshot.resolve_endpoint(source)?,
        snapshot.resolve_endpoint(target)?,
    )
    .include_dependencies(!args.no_dependencies)
    .include_suppressed(args.include_suppressed);

    if let Some(timeout_ms) = args.timeout_ms {
        query = query.timeout(Duration::from_millis(timeout_ms));
    }
    if let Some(retries) = args.retries {
        query = query.max_retries(retries);
    }
    if let Some(interval) = args.interval_secs {
        query = query.check_interval(Duration::from_secs(interval));
    }
    Ok(query)
}

pub(crate) async fn check_reachability(
    store: &Arc<TopologyStore>,
    source: &str,
    target: &str,
    args: &ReachArgs,
) -> Result<ReachReport> {
    let snapshot = store.snapshot();
    let query = reach_query(&snapshot, source, target, args)?;
    let probe = ReachabilityProbe::from_topology(Arc::clone(store));
    let result = probe
        .check_in(&snapshot, &query)
        .await
        .with_context(|| format!("Reachability check {} -> {} failed", source, target))?;
    let alerts = detect_alerts(None, &result);
    Ok(ReachReport { result, alerts })
}

pub(crate) async fn watch_reachability(
    store: &Arc<TopologyStore>,
    source: &str,
    target: &str,
    args: &ReachArgs,
    ticks: Option<u32>,
    context: &AppContext,
) -> Result<WatchSummary> {
    let query = reach_query(&store.snapshot(), source, target, args)?;
    let probe = ReachabilityProbe::from_topology(Arc::clone(store));

    let alerts: Arc<Mutex<Vec<Alert>>> = Arc::new(Mutex::new(Vec::new()));
    let previous: Arc<Mutex<Option<ReachabilityResult>>> = Arc::new(Mutex::new(None));
    let completed = Arc::new(AtomicU32::new(0));

    let sink = context.clone();
    let cb_alerts = Arc::clone(&alerts);
    let cb_previous = Arc::clone(&previous);
    let cb_completed = Arc::clone(&completed);
    let handle = probe
        .start_continuous(query, move |event: ProbeEvent| {
            if let ProbeEvent::CheckCompleted { result, .. } = &event {
                let mut previous = cb_previous.lock();
                cb_alerts
                    .lock()
                    .extend(detect_alerts(previous.as_ref(), result));
                *previous = Some(result.clone());
                cb_completed.fetch_add(1, Ordering::SeqCst);
            }
            match serde_json::to_string(&event) {
                Ok(line) => sink.emit_line(&line),
                Err(e) => {
                    crate::log_warn!("Failed to serialize probe event: {}", e);
                }
            }
        })
        .with_context(|| format!("Could not start watching {} -> {}", source, target))?;

    let mut cancelled = false;
    loop {
        if context.is_cancelled() {
            cancelled = true;
            context.emit_event(AppEvent::Cancelled {
                stage: "watch".to_string(),
            });
            break;
        }
        if ticks.is_some_and(|limit| completed.load(Ordering::SeqCst) >= limit) {
            break;
        }
        tokio::time::sleep(WATCH_POLL_INTERVAL).await;
    }

    handle.cancel();
    let last = handle.latest();
    handle.wait().await;

    let alerts = std::mem::take(&mut *alerts.lock());
    Ok(WatchSummary {
        ticks: completed.load(Ordering::SeqCst),
        cancelled,
        last,
        alerts,
    })
}

pub(crate) fn explain_suppression(
    store: &Arc<TopologyStore>,
    device: Option<&str>,
) -> Result<SuppressionReport> {
    let snapshot = store.snapshot();
    let engine = SuppressionEngine::new();

    let devices = match device {
        Some(id) => vec![engine
            .is_suppressed(&DeviceId::from(id), &snapshot)
            .with_context(|| format!("Cannot decide suppression for {}", id))?],
        None => engine
            .suppressed_devices(&snapshot)
            .context("Cannot decide suppression for this snapshot")?
            .into_iter()
            .map(|(device, by)| SuppressionStatus {
                device,
                suppressed: true,
                by,
            })
            .collect(),
    };

    Ok(SuppressionReport {
        snapshot_version: snapshot.version(),
        devices,
    })
}

pub(crate) fn export_topology(store: &Arc<TopologyStore>) -> Result<String> {
    let snapshot = store.snapshot();
    export_topology_json(&snapshot, &ConfidenceScorer::from_env())
        .context("Failed to serialize topology export")
}
