//! Continuous reachability monitoring
//!
//! Each continuous probe is its own tokio task that re-runs `check` every interval
//! until cancelled. Events go out through a callback.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::events::{ProbeEvent, ProbeState, ProbeStatus};
use super::probe::{ReachabilityProbe, ReachabilityQuery, ReachabilityResult};
use crate::error::Result;

/// Event callback type
pub type EventCallback = Arc<dyn Fn(ProbeEvent) + Send + Sync>;

/// Handle to a running continuous probe. Dropping it cancels the probe.
#[derive(Debug)]
pub struct ContinuousProbe {
    cancel_tx: watch::Sender<bool>,
    state: Arc<Mutex<ProbeState>>,
    latest: Arc<RwLock<Option<ReachabilityResult>>>,
    tick_count: Arc<AtomicU32>,
    interval_seconds: u64,
    task: Option<JoinHandle<()>>,
}

impl ContinuousProbe {
    /// Request a stop. The current check finishes; no further tick starts.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn state(&self) -> ProbeState {
        *self.state.lock()
    }

    /// Most recent completed check.
    pub fn latest(&self) -> Option<ReachabilityResult> {
        self.latest.read().clone()
    }

    pub fn status(&self) -> ProbeStatus {
        let latest = self.latest.read();
        ProbeStatus {
            state: self.state(),
            interval_seconds: self.interval_seconds,
            tick_count: self.tick_count.load(Ordering::SeqCst),
            last_check_time: latest.as_ref().map(|r| r.checked_at),
            last_reachable: latest.as_ref().map(|r| r.is_reachable),
        }
    }

    /// Wait for the task to finish after `cancel`.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("[MONITOR] Continuous probe task failed: {}", e);
            }
        }
    }
}

impl Drop for ContinuousProbe {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl ReachabilityProbe {
    /// Re-run `check` every `check_interval` until the returned handle is cancelled
    /// or dropped. Must be called from within a tokio runtime.
    pub fn start_continuous<F>(&self, query: ReachabilityQuery, callback: F) -> Result<ContinuousProbe>
    where
        F: Fn(ProbeEvent) + Send + Sync + 'static,
    {
        query.validate()?;
        let snapshot = self.store().snapshot();
        snapshot.endpoint_device(&query.source)?;
        snapshot.endpoint_device(&query.target)?;

        let interval = query.options.check_interval();
        let interval_seconds = query.options.check_interval_secs;
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(ProbeState::Running));
        let latest: Arc<RwLock<Option<ReachabilityResult>>> = Arc::new(RwLock::new(None));
        let tick_count = Arc::new(AtomicU32::new(0));

        let callback: EventCallback = Arc::new(callback);
        callback(ProbeEvent::MonitoringStarted {
            source: query.source.clone(),
            target: query.target.clone(),
            interval_seconds,
        });

        let probe = self.clone();
        let task_state = Arc::clone(&state);
        let task_latest = Arc::clone(&latest);
        let task_ticks = Arc::clone(&tick_count);
        let cb = Arc::clone(&callback);

        let task = tokio::spawn(async move {
            tracing::info!(
                "[MONITOR] Continuous probe {} -> {} started (interval: {}s)",
                query.source,
                query.target,
                interval_seconds
            );

            let mut previous: Option<bool> = None;
            loop {
                if *cancel_rx.borrow() {
                    break;
                }
                let tick = task_ticks.fetch_add(1, Ordering::SeqCst) + 1;

                match probe.check(&query).await {
                    Ok(result) => {
                        detect_and_emit_transition(&*cb, tick, previous, &result);
                        previous = Some(result.is_reachable);
                        *task_latest.write() = Some(result.clone());
                        (*cb)(ProbeEvent::CheckCompleted { tick, result });
                    }
                    Err(e) => {
                        tracing::warn!("[MONITOR] Tick #{} failed: {}", tick, e);
                        (*cb)(ProbeEvent::MonitoringError {
                            tick,
                            message: e.to_string(),
                        });
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = cancel_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            *task_state.lock() = ProbeState::Idle;
            let ticks = task_ticks.load(Ordering::SeqCst);
            tracing::info!(
                "[MONITOR] Continuous probe {} -> {} stopped after {} tick(s)",
                query.source,
                query.target,
                ticks
            );
            (*cb)(ProbeEvent::MonitoringStopped { ticks });
        });

        Ok(ContinuousProbe {
            cancel_tx,
            state,
            latest,
            tick_count,
            interval_seconds,
            task: Some(task),
        })
    }
}

/// Emit lost/restored events when reachability changes between ticks
fn detect_and_emit_transition<F>(
    callback: &F,
    tick: u32,
    previous: Option<bool>,
    current: &ReachabilityResult,
) where
    F: Fn(ProbeEvent) + ?Sized,
{
    match (previous, current.is_reachable) {
        (Some(false), true) => {
            tracing::debug!("[MONITOR] {} reachable again", current.target);
            callback(ProbeEvent::ReachabilityRestored {
                tick,
                latency_ms: current.latency_ms,
            });
        }
        (None | Some(true), false) => {
            tracing::debug!("[MONITOR] {} became unreachable", current.target);
            callback(ProbeEvent::ReachabilityLost {
                tick,
                failure_reason: current.failure_reason,
                suppressed_by: current.suppressed_by.clone(),
                escalate: current.escalate,
            });
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, DeviceStatus, Endpoint};
    use crate::monitor::prober::{LivenessProber, ProbeFailure};
    use crate::topology::{TopologyDocument, TopologySnapshot, TopologyStore};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Answers according to a switch the test flips
    struct Switch(Arc<AtomicBool>);

    #[async_trait]
    impl LivenessProber for Switch {
        async fn probe(
            &self,
            _snapshot: &TopologySnapshot,
            _source: &Endpoint,
            _target: &Endpoint,
        ) -> std::result::Result<f64, ProbeFailure> {
            if self.0.load(Ordering::SeqCst) {
                Ok(2.0)
            } else {
                Err(ProbeFailure::NoAnswer)
            }
        }
    }

    fn probe(up: Arc<AtomicBool>) -> ReachabilityProbe {
        let doc = TopologyDocument::new(chrono::Utc::now())
            .device(Device::new("a").with_status(DeviceStatus::Up))
            .device(Device::new("b").with_status(DeviceStatus::Up));
        let store = Arc::new(TopologyStore::from_document(&doc).unwrap());
        ReachabilityProbe::new(store, Arc::new(Switch(up)))
    }

    fn query() -> ReachabilityQuery {
        ReachabilityQuery::between_devices("a", "b")
            .check_interval(Duration::from_secs(10))
            .timeout(Duration::from_millis(100))
            .max_retries(0)
    }

    fn recorder() -> (Arc<Mutex<Vec<ProbeEvent>>>, impl Fn(ProbeEvent) + Send + Sync + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event: ProbeEvent| sink.lock().push(event))
    }

    fn checks(events: &Mutex<Vec<ProbeEvent>>) -> usize {
        events
            .lock()
            .iter()
            .filter(|e| matches!(e, ProbeEvent::CheckCompleted { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_repeat_until_cancelled() {
        let (events, callback) = recorder();
        let handle = probe(Arc::new(AtomicBool::new(true)))
            .start_continuous(query(), callback)
            .unwrap();
        assert_eq!(handle.state(), ProbeState::Running);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(checks(&events), 3);
        assert_eq!(handle.status().tick_count, 3);
        assert_eq!(handle.latest().map(|r| r.is_reachable), Some(true));

        handle.cancel();
        let state = Arc::clone(&handle.state);
        handle.wait().await;
        assert_eq!(*state.lock(), ProbeState::Idle);

        let events = events.lock();
        assert!(matches!(events.first(), Some(ProbeEvent::MonitoringStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(ProbeEvent::MonitoringStopped { ticks: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let (events, callback) = recorder();
        let handle = probe(Arc::new(AtomicBool::new(true)))
            .start_continuous(query().check_interval(Duration::from_secs(3600)), callback)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        handle.cancel();
        handle.wait().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(checks(&events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_task() {
        let (events, callback) = recorder();
        let handle = probe(Arc::new(AtomicBool::new(true)))
            .start_continuous(query(), callback)
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(checks(&events), 1);
        assert!(matches!(
            events.lock().last(),
            Some(ProbeEvent::MonitoringStopped { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transitions_are_reported_once() {
        let up = Arc::new(AtomicBool::new(true));
        let (events, callback) = recorder();
        let handle = probe(Arc::clone(&up))
            .start_continuous(query(), callback)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        up.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        up.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.cancel();
        handle.wait().await;

        let events = events.lock();
        let lost = events
            .iter()
            .filter(|e| matches!(e, ProbeEvent::ReachabilityLost { .. }))
            .count();
        let restored: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ProbeEvent::ReachabilityRestored { tick, .. } => Some(*tick),
                _ => None,
            })
            .collect();
        assert_eq!(lost, 1);
        assert_eq!(restored, vec![4]);
    }

    #[tokio::test]
    async fn unknown_endpoint_fails_before_spawning() {
        let result = probe(Arc::new(AtomicBool::new(true)))
            .start_continuous(ReachabilityQuery::between_devices("a", "ghost"), |_| {});
        assert!(result.is_err());
    }
}
