use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

use crate::alerts::Alert;
use crate::cli::{parse_cli_args, usage_text, version_text};
use crate::command::AppCommand;
use crate::exports::export_path_results_json;
use crate::command_handlers::{
    check_reachability, explain_suppression, export_topology, find_paths, load_store,
    watch_reachability,
};
use crate::monitor::ReachabilityResult;
use crate::paths::PathResult;
use crate::suppression::SuppressionStatus;

pub type OutputHook = Arc<dyn Fn(&str) + Send + Sync>;
pub type EventHook = Arc<dyn Fn(&AppEvent) + Send + Sync>;

#[derive(Clone)]
pub struct AppContext {
    snapshot_path: Option<PathBuf>,
    output_hook: OutputHook,
    event_hook: EventHook,
    cancel_flag: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppEvent {
    Info { message: String },
    Warn { message: String },
    Error { message: String },
    SnapshotLoaded {
        path: String,
        version: u64,
        devices: usize,
        links: usize,
    },
    Cancelled { stage: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReachReport {
    pub result: ReachabilityResult,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WatchSummary {
    /// Completed checks
    pub ticks: u32,
    pub cancelled: bool,
    pub last: Option<ReachabilityResult>,
    /// Transition alerts raised over the whole run
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuppressionReport {
    pub snapshot_version: u64,
    pub devices: Vec<SuppressionStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AppCommandResult {
    HelpText(String),
    VersionText(String),
    Paths(Vec<PathResult>),
    Reach(ReachReport),
    Watch(WatchSummary),
    Suppression(SuppressionReport),
    Export(String),
}

impl Default for AppContext {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppContext {
    pub fn from_env() -> Self {
        Self {
            snapshot_path: crate::config::snapshot_path(),
            output_hook: Arc::new(|line| println!("{}", line)),
            event_hook: Arc::new(|_| {}),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_snapshot_path(mut self, snapshot_path: PathBuf) -> Self {
        self.snapshot_path = Some(snapshot_path);
        self
    }

    pub fn with_output_hook(mut self, output_hook: OutputHook) -> Self {
        self.output_hook = output_hook;
        self
    }

    pub fn with_event_hook(mut self, event_hook: EventHook) -> Self {
        self.event_hook = event_hook;
        self
    }

    /// Snapshot used when a command does not name one
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn emit_line(&self, line: &str) {
        (self.output_hook)(line);
    }

    pub fn emit_event(&self, event: AppEvent) {
        (self.event_hook)(&event);
    }

    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn reset_cancel(&self) {
        self.cancel_flag.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// Set the cancel flag on Ctrl+C for as long as the guard lives.
    ///
    /// A running `watch` notices the flag on its next poll and stops after the
    /// check in flight. Must be called from inside a tokio runtime.
    pub fn cancel_on_ctrl_c(&self) -> CtrlCGuard {
        let context = self.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                context.cancel();
                crate::log_stderr!("Ctrl+C received, stopping after the current check");
            }
        });
        CtrlCGuard { listener }
    }
}

/// Stops listening for Ctrl+C when dropped
#[must_use = "Ctrl+C is only watched while the guard is alive"]
pub struct CtrlCGuard {
    listener: JoinHandle<()>,
}

impl CtrlCGuard {
    pub fn is_listening(&self) -> bool {
        !self.listener.is_finished()
    }
}

impl Drop for CtrlCGuard {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Parse CLI-style args and dispatch with a context built from the environment.
pub async fn run<I, S>(args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    run_with_context(args, &AppContext::from_env()).await
}

/// Parse CLI-style args and dispatch with an explicit context.
pub async fn run_with_context<I, S>(args: I, context: &AppContext) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let command = parse_cli_args(args)?;
    execute_command_with_context(command, context).await
}

/// Execute a pre-parsed command. This is reusable for non-CLI entrypoints.
pub async fn execute_command(command: AppCommand) -> Result<()> {
    let context = AppContext::from_env();
    execute_command_with_context(command, &context).await
}

/// Execute a pre-parsed command with an explicit execution context.
pub async fn execute_command_with_context(command: AppCommand, context: &AppContext) -> Result<()> {
    let result = execute_command_typed(command, context).await?;
    emit_command_result(&result, context)
}

/// Execute a pre-parsed command and return a strongly-typed result payload.
pub async fn execute_command_typed(
    command: AppCommand,
    context: &AppContext,
) -> Result<AppCommandResult> {
    match command {
        AppCommand::Help => Ok(AppCommandResult::HelpText(usage_text())),
        AppCommand::Version => Ok(AppCommandResult::VersionText(version_text())),
        AppCommand::Paths {
            snapshot,
            source,
            target,
            args,
        } => {
            let store = load_store(snapshot, context)?;
            Ok(AppCommandResult::Paths(find_paths(
                &store, &source, &target, &args,
            )?))
        }
        AppCommand::Reach {
            snapshot,
            source,
            target,
            args,
        } => {
            let store = load_store(snapshot, context)?;
            Ok(AppCommandResult::Reach(
                check_reachability(&store, &source, &target, &args).await?,
            ))
        }
        AppCommand::Watch {
            snapshot,
            source,
            target,
            args,
            ticks,
        } => {
            let store = load_store(snapshot, context)?;
            Ok(AppCommandResult::Watch(
                watch_reachability(&store, &source, &target, &args, ticks, context).await?,
            ))
        }
        AppCommand::Suppression { snapshot, device } => {
            let store = load_store(snapshot, context)?;
            Ok(AppCommandResult::Suppression(explain_suppression(
                &store,
                device.as_deref(),
            )?))
        }
        AppCommand::Export { snapshot } => {
            let store = load_store(snapshot, context)?;
            Ok(AppCommandResult::Export(export_topology(&store)?))
        }
    }
}

fn emit_command_result(result: &AppCommandResult, context: &AppContext) -> Result<()> {
    let output = match result {
        AppCommandResult::HelpText(text) | AppCommandResult::VersionText(text) => text.clone(),
        AppCommandResult::Export(json) => json.clone(),
        AppCommandResult::Paths(paths) => {
            export_path_results_json(paths).context("Failed to serialize path results")?
        }
        AppCommandResult::Reach(report) => serde_json::to_string_pretty(report)
            .context("Failed to serialize reachability report")?,
        AppCommandResult::Watch(summary) => {
            serde_json::to_string_pretty(summary).context("Failed to serialize watch summary")?
        }
        AppCommandResult::Suppression(report) => serde_json::to_string_pretty(report)
            .context("Failed to serialize suppression report")?,
    };
    context.emit_line(&output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::AppCommand;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use super::{AppCommandResult, AppContext, AppEvent, execute_command_typed, run_with_context};

    fn capturing_context() -> (AppContext, Arc<Mutex<Vec<String>>>) {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let context = AppContext::from_env().with_output_hook(Arc::new(move |line| {
            sink.lock()
                .expect("output lock should not be poisoned")
                .push(line.to_string());
        }));
        (context, lines)
    }

    #[tokio::test]
    async fn execute_command_typed_help_returns_help_variant() {
        let context = AppContext::from_env();
        let result = execute_command_typed(AppCommand::Help, &context)
            .await
            .expect("typed command execution should succeed");

        assert!(matches!(result, AppCommandResult::HelpText(text) if text.contains("Usage:")));
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_reported_with_its_path() {
        let context = AppContext::from_env();
        let command = AppCommand::Export {
            snapshot: Some(PathBuf::from("/nonexistent/nexus/topology.json")),
        };
        let err = execute_command_typed(command, &context)
            .await
            .expect_err("missing snapshot should fail");
        assert!(format!("{:#}", err).contains("/nonexistent/nexus/topology.json"));
    }

    #[test]
    fn context_event_hook_receives_emitted_event() {
        let events: Arc<Mutex<Vec<AppEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let context = AppContext::from_env().with_event_hook(Arc::new(move |event| {
            sink.lock()
                .expect("event lock should not be poisoned")
                .push(event.clone());
        }));

        context.emit_event(AppEvent::Info {
            message: "hello".to_string(),
        });

        let captured = events.lock().expect("event lock should not be poisoned");
        assert_eq!(captured.len(), 1);
        assert_eq!(
            captured[0],
            AppEvent::Info {
                message: "hello".to_string()
            }
        );
    }

    #[test]
    fn context_cancel_flag_can_be_set_and_reset() {
        let context = AppContext::from_env();
        assert!(!context.is_cancelled());
        context.cancel();
        assert!(context.is_cancelled());
        context.reset_cancel();
        assert!(!context.is_cancelled());
    }

    #[test]
    fn explicit_snapshot_path_overrides_env() {
        let context = AppContext::from_env().with_snapshot_path(PathBuf::from("topo.json"));
        assert_eq!(
            context.snapshot_path(),
            Some(std::path::Path::new("topo.json"))
        );
    }

    #[tokio::test]
    async fn run_with_context_parses_and_emits_version() {
        let (context, lines) = capturing_context();
        run_with_context(["nexus-topology", "--version"], &context)
            .await
            .expect("version should run");

        let lines = lines.lock().expect("output lock should not be poisoned");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn run_with_context_rejects_unknown_command_without_output() {
        let (context, lines) = capturing_context();
        let err = run_with_context(["nexus-topology", "traceroute"], &context)
            .await
            .expect_err("unknown command should fail");

        assert!(err.to_string().contains("traceroute"));
        assert!(lines.lock().expect("output lock should not be poisoned").is_empty());
    }

    #[tokio::test]
    async fn ctrl_c_guard_listens_until_dropped_without_cancelling() {
        let context = AppContext::from_env();
        let guard = context.cancel_on_ctrl_c();
        tokio::task::yield_now().await;

        assert!(guard.is_listening());
        assert!(!context.is_cancelled());

        drop(guard);
        tokio::task::yield_now().await;
        assert!(!context.is_cancelled());
    }
}
