use std::sync::{Arc, Mutex};

use chrono::Utc;
use nexus_topology::app::run_with_context;
use nexus_topology::{
    AppCommandResult, AppContext, AppEvent, CliCommand, Dependency, Device, DeviceStatus,
    DiscoverySource, Interface, Link, OutputHook, TopologyDocument, execute_command_typed,
    execute_command_with_context, export_path_results_json, parse_cli_args,
};
use tempfile::NamedTempFile;

fn make_test_context() -> (AppContext, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let output_hook: OutputHook = Arc::new(move |line| {
        sink.lock()
            .expect("output lock should not be poisoned")
            .push(line.to_string());
    });

    (AppContext::from_env().with_output_hook(output_hook), lines)
}

/// sw1 -- core1 -- sw2 with core1 down and feeding sw2
fn write_snapshot() -> NamedTempFile {
    let doc = TopologyDocument::new(Utc::now())
        .device(Device::new("sw1").with_status(DeviceStatus::Up))
        .device(Device::new("sw2").with_status(DeviceStatus::Up))
        .device(Device::new("core1").with_status(DeviceStatus::Down))
        .interface(Interface::new("sw1:1", "sw1"))
        .interface(Interface::new("sw2:1", "sw2"))
        .interface(Interface::new("core1:1", "core1"))
        .interface(Interface::new("core1:2", "core1"))
        .link(Link::new("l1", "sw1:1", "core1:1", DiscoverySource::Lldp))
        .link(Link::new("l2", "sw2:1", "core1:2", DiscoverySource::Cdp))
        .dependency(Dependency::downstream("core1", "sw2"));

    let file = NamedTempFile::new().expect("temp file should be created");
    let json = serde_json::to_string_pretty(&doc).expect("document should serialize");
    std::fs::write(file.path(), json).expect("snapshot should be written");
    file
}

fn last_json(lines: &Mutex<Vec<String>>) -> serde_json::Value {
    let lines = lines.lock().expect("output lock should not be poisoned");
    let last = lines.last().expect("command should write output");
    serde_json::from_str(last).expect("output should be valid JSON")
}

async fn run(args: &[&str], context: &AppContext) {
    run_with_context(args.iter().copied(), context)
        .await
        .expect("command should succeed");
}

#[tokio::test]
async fn help_command_writes_usage_to_output_hook() {
    let (context, lines) = make_test_context();

    execute_command_with_context(CliCommand::Help, &context)
        .await
        .expect("help command should succeed");

    let output = lines
        .lock()
        .expect("output lock should not be poisoned")
        .join("\n");
    assert!(output.contains("Usage:"));
    assert!(output.contains("nexus-topology paths"));
}

#[tokio::test]
async fn paths_command_reports_down_core_as_no_path() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let (context, lines) = make_test_context();

    run(
        &["nexus-topology", "paths", "sw1", "sw2", "--snapshot", &path, "--include-down"],
        &context,
    )
    .await;
    let parsed = last_json(&lines);
    assert_eq!(parsed[0]["is_reachable"], true);
    assert_eq!(parsed[0]["hop_count"], 2);
    assert_eq!(parsed[0]["devices"].as_array().map(|d| d.len()), Some(3));

    run(&["nexus-topology", "paths", "sw1", "sw2", "-s", &path], &context).await;
    let parsed = last_json(&lines);
    assert_eq!(parsed.as_array().map(|r| r.len()), Some(1));
    assert_eq!(parsed[0]["is_reachable"], false);
    assert_eq!(parsed[0]["failure_reason"], "no-path");
}

#[tokio::test]
async fn paths_output_is_the_path_results_export() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let args: [&str; 7] = ["nexus-topology", "paths", "sw1", "sw2", "-s", &path, "--include-down"];
    let (context, lines) = make_test_context();

    run(&args, &context).await;
    let printed = lines
        .lock()
        .expect("output lock should not be poisoned")
        .last()
        .cloned()
        .expect("paths should write output");

    let command = parse_cli_args(args).expect("args should parse");
    let AppCommandResult::Paths(results) = execute_command_typed(command, &context)
        .await
        .expect("typed paths should succeed")
    else {
        panic!("paths command should return path results");
    };
    let exported = export_path_results_json(&results).expect("results should export");
    assert_eq!(printed, exported);
}

#[tokio::test]
async fn reach_command_outputs_suppressed_result_and_alert() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let (context, lines) = make_test_context();

    run(
        &["nexus-topology", "reach", "sw1", "sw2", "--snapshot", &path, "--retries", "0"],
        &context,
    )
    .await;

    let parsed = last_json(&lines);
    assert_eq!(parsed["result"]["is_reachable"], false);
    assert_eq!(parsed["result"]["failure_reason"], "suppressed-by-upstream");
    assert_eq!(parsed["result"]["suppressed_by"][0], "core1");
    assert_eq!(parsed["result"]["escalate"], false);
    assert_eq!(parsed["alerts"][0]["alert_type"], "SuppressedFailure");
    assert_eq!(parsed["alerts"][0]["severity"], "Low");
}

#[tokio::test]
async fn suppression_and_export_commands_read_the_snapshot() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let events: Arc<Mutex<Vec<AppEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let (context, lines) = make_test_context();
    let context = context.with_event_hook(Arc::new(move |event| {
        sink.lock()
            .expect("event lock should not be poisoned")
            .push(event.clone());
    }));

    run(&["nexus-topology", "suppression", "--snapshot", &path], &context).await;
    let parsed = last_json(&lines);
    assert_eq!(parsed["devices"][0]["device"], "sw2");
    assert_eq!(parsed["devices"][0]["by"][0], "core1");

    run(&["nexus-topology", "export", "--snapshot", &path], &context).await;
    let parsed = last_json(&lines);
    assert_eq!(parsed["total_devices"], 3);
    assert_eq!(parsed["connections"].as_array().map(|c| c.len()), Some(2));

    let events = events.lock().expect("event lock should not be poisoned");
    let loaded = events
        .iter()
        .filter(|e| matches!(e, AppEvent::SnapshotLoaded { devices: 3, .. }))
        .count();
    assert_eq!(loaded, 2);
}

#[tokio::test]
async fn watch_stops_after_requested_ticks() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let (context, lines) = make_test_context();

    run(
        &[
            "nexus-topology", "watch", "sw1", "sw2", "--snapshot", &path, "--interval", "1",
            "--ticks", "2", "--retries", "0",
        ],
        &context,
    )
    .await;

    let summary = last_json(&lines);
    assert_eq!(summary["ticks"], 2);
    assert_eq!(summary["cancelled"], false);
    assert_eq!(summary["last"]["is_reachable"], false);
    assert_eq!(summary["alerts"].as_array().map(|a| a.len()), Some(1));

    let lines = lines.lock().expect("output lock should not be poisoned");
    assert!(lines.iter().any(|l| l.contains("\"MonitoringStarted\"")));
    assert!(lines.iter().any(|l| l.contains("\"MonitoringStopped\"")));
}

#[tokio::test]
async fn watch_honours_context_cancellation() {
    let snapshot = write_snapshot();
    let path = snapshot.path().to_string_lossy().into_owned();
    let (context, lines) = make_test_context();
    context.cancel();

    run(
        &["nexus-topology", "watch", "sw1", "sw2", "--snapshot", &path],
        &context,
    )
    .await;

    let summary = last_json(&lines);
    assert_eq!(summary["cancelled"], true);
}

#[tokio::test]
async fn missing_snapshot_is_an_error() {
    let (context, _lines) = make_test_context();
    let err = run_with_context(
        ["nexus-topology", "export", "--snapshot", "/nonexistent/topology.json"],
        &context,
    )
    .await
    .expect_err("missing snapshot should fail");
    assert!(format!("{:#}", err).contains("Failed to read topology snapshot"));
}
