//! Polling loop that reconciles radio detections against the name table.
//!
//! One loop instance owns one radio session. `start()` spawns a periodic poll
//! task whose handle lives in the loop state; `stop()` takes that handle back,
//! cancels it and commands the radio to stop. Ticks never overlap: a tick that
//! fires while another is still awaiting the radio or the store is skipped.
//! Every tick is tagged with the generation it started in, and results that
//! come back after the session ended are dropped instead of applied.

use crate::prelude::{
    ReconError, ReconResult, ReconciliationView, ScanConfig, ViewInput, ViewMetadata,
};
use crate::store::{Assignments, NameStoreAdapter};
use crate::tag_interface::{
    AccumulatedDetectionSet, DetectionSnapshot, RadioInterface, TagId,
};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, ScanMetrics};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    /// The radio start command is outstanding.
    Starting,
    Scanning,
    Stopping,
}

/// Notifications published to subscribers of a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconEvent {
    PhaseChanged(ScanPhase),
    TickApplied {
        session: u64,
        detected: usize,
        new_tags: usize,
    },
    /// Objects that turned present this cycle; fires once per transition.
    NewlyPresent(Vec<String>),
    TickFailed(String),
}

/// What happened to a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Applied(TickSummary),
    /// The previous tick was still in flight.
    Skipped,
    /// The session ended while the tick was awaiting the radio.
    Discarded,
    Failed(ReconError),
    NotScanning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub snapshot: DetectionSnapshot,
    pub new_tags: Vec<TagId>,
    pub newly_present: Vec<String>,
}

/// Copy of the loop state for display.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus<T> {
    pub phase: ScanPhase,
    pub session: u64,
    pub accumulated: Vec<TagId>,
    pub view: T,
    pub tag_count: u64,
    pub last_snapshot: DetectionSnapshot,
    pub last_error: Option<String>,
    pub metrics: ScanMetrics,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct LoopState<V: ReconciliationView> {
    phase: ScanPhase,
    session: u64,
    generation: u64,
    accumulated: AccumulatedDetectionSet,
    view: V,
    output: V::Output,
    tag_count: u64,
    last_snapshot: DetectionSnapshot,
    last_error: Option<String>,
    poll: Option<PollTask>,
}

impl<V: ReconciliationView> LoopState<V> {
    fn is_current(&self, generation: u64) -> bool {
        self.phase == ScanPhase::Scanning && self.generation == generation
    }

    fn recompute(&mut self, assignments: &Assignments) -> ReconResult<ViewMetadata> {
        let output = self.view.execute(ViewInput {
            accumulated: &self.accumulated,
            assignments,
        })?;
        self.output = output.view;
        Ok(output.metadata)
    }
}

struct LoopShared<V: ReconciliationView> {
    radio: Arc<dyn RadioInterface>,
    store: NameStoreAdapter,
    config: ScanConfig,
    state: Mutex<LoopState<V>>,
    busy: AtomicBool,
    metrics: MetricsRecorder,
    events: broadcast::Sender<ReconEvent>,
    logger: LogManager,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a [`ReconciliationView`] from periodic radio polls.
pub struct ReconciliationLoop<V: ReconciliationView> {
    inner: Arc<LoopShared<V>>,
}

impl<V: ReconciliationView> Clone for ReconciliationLoop<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: ReconciliationView + 'static> ReconciliationLoop<V> {
    pub fn new(
        radio: Arc<dyn RadioInterface>,
        store: NameStoreAdapter,
        mut view: V,
        config: ScanConfig,
    ) -> ReconResult<Self> {
        view.initialize(&config)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = LoopState {
            phase: ScanPhase::Idle,
            session: 0,
            generation: 0,
            accumulated: AccumulatedDetectionSet::new(),
            view,
            output: V::Output::default(),
            tag_count: 0,
            last_snapshot: DetectionSnapshot::default(),
            last_error: None,
            poll: None,
        };

        Ok(Self {
            inner: Arc::new(LoopShared {
                radio,
                store,
                config,
                state: Mutex::new(state),
                busy: AtomicBool::new(false),
                metrics: MetricsRecorder::new(),
                events,
                logger: LogManager::for_component("reconcile"),
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> ScanMetrics {
        self.inner.metrics.snapshot()
    }

    pub async fn phase(&self) -> ScanPhase {
        self.inner.state.lock().await.phase
    }

    pub async fn status(&self) -> LoopStatus<V::Output> {
        let state = self.inner.state.lock().await;
        LoopStatus {
            phase: state.phase,
            session: state.session,
            accumulated: state.accumulated.to_vec(),
            view: state.output.clone(),
            tag_count: state.tag_count,
            last_snapshot: state.last_snapshot.clone(),
            last_error: state.last_error.clone(),
            metrics: self.inner.metrics.snapshot(),
        }
    }

    /// Current derived view, e.g. the unassigned list or the presence report.
    pub async fn view(&self) -> V::Output {
        self.inner.state.lock().await.output.clone()
    }

    /// Acquires the radio for this loop.
    pub async fn open(&self) -> ReconResult<String> {
        let message = self.inner.radio.open().await.map_err(command_error)?;
        self.inner.logger.record(&message);
        Ok(message)
    }

    /// Commands the radio to scan and spawns the poll task.
    ///
    /// The loop sits in `Starting` while the radio call is outstanding, so
    /// readers are not held up and a concurrent `start()` is rejected.
    pub async fn start(&self) -> ReconResult<()> {
        {
            let mut state = self.inner.state.lock().await;
            if state.phase != ScanPhase::Idle {
                return Err(ReconError::AlreadyScanning);
            }
            state.phase = ScanPhase::Starting;
        }

        let started = self.inner.radio.start_scan().await;

        let mut state = self.inner.state.lock().await;
        match started {
            Ok(message) => self.inner.logger.record(&message),
            Err(err) => {
                let err = command_error(err);
                self.inner.logger.warn(&err.to_string());
                state.phase = ScanPhase::Idle;
                state.last_error = Some(err.to_string());
                return Err(err);
            }
        }

        state.session += 1;
        state.generation += 1;
        state.phase = ScanPhase::Scanning;
        state.last_error = None;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(
            Arc::downgrade(&self.inner),
            state.generation,
            self.inner.config.poll_interval(),
            cancel.clone(),
        ));
        state.poll = Some(PollTask { cancel, handle });

        self.inner.logger.record(&format!(
            "session {} polling every {} ms",
            state.session, self.inner.config.poll_interval_ms
        ));
        drop(state);
        self.emit(ReconEvent::PhaseChanged(ScanPhase::Scanning));
        Ok(())
    }

    /// Stops polling and the radio scan. No-op unless scanning.
    pub async fn stop(&self) -> ReconResult<()> {
        let poll = {
            let mut state = self.inner.state.lock().await;
            if state.phase != ScanPhase::Scanning {
                return Ok(());
            }
            state.phase = ScanPhase::Stopping;
            state.generation += 1;
            state.poll.take()
        };

        if let Some(PollTask { cancel, mut handle }) = poll {
            cancel.cancel();
            if time::timeout(self.inner.config.stop_grace(), &mut handle)
                .await
                .is_err()
            {
                self.inner
                    .logger
                    .warn("poll task still busy after grace period; aborting");
                handle.abort();
            }
        }

        let result = match self.inner.radio.stop_scan().await {
            Ok(message) => {
                self.inner.logger.record(&message);
                Ok(())
            }
            Err(err) => {
                let err = command_error(err);
                self.inner.logger.warn(&format!("error stopping scan: {}", err));
                Err(err)
            }
        };

        let mut state = self.inner.state.lock().await;
        state.phase = ScanPhase::Idle;
        if let Err(err) = &result {
            state.last_error = Some(err.to_string());
        }
        drop(state);

        self.emit(ReconEvent::PhaseChanged(ScanPhase::Idle));
        result
    }

    /// Stops, then empties the accumulated detections and the derived view.
    pub async fn clear(&self) -> ReconResult<()> {
        let stopped = self.stop().await;

        let mut state = self.inner.state.lock().await;
        state.accumulated.clear();
        state.view.cleanup();
        state.view.initialize(&self.inner.config)?;
        state.output = V::Output::default();
        state.tag_count = 0;
        state.last_snapshot = DetectionSnapshot::default();
        self.inner.logger.record("cleared detections");

        stopped
    }

    /// Runs one tick now, under the same rules as timer-driven ticks.
    pub async fn poll_once(&self) -> TickOutcome {
        let generation = {
            let state = self.inner.state.lock().await;
            if state.phase != ScanPhase::Scanning {
                return TickOutcome::NotScanning;
            }
            state.generation
        };
        self.inner.run_tick(generation).await
    }

    /// Recomputes the view from the stored assignments without polling.
    ///
    /// An unreadable name table leaves the current view in place.
    pub async fn refresh_view(&self) -> ReconResult<()> {
        let assignments = self.inner.store.try_load_assignments().await?;
        let mut state = self.inner.state.lock().await;
        let metadata = state.recompute(&assignments)?;
        drop(state);

        if !metadata.newly_present.is_empty() {
            self.emit(ReconEvent::NewlyPresent(metadata.newly_present));
        }
        Ok(())
    }

    /// Stops unconditionally and releases the radio.
    pub async fn shutdown(&self) -> ReconResult<()> {
        let stopped = self.stop().await;
        let closed = match self.inner.radio.close().await {
            Ok(message) => {
                self.inner.logger.record(&message);
                Ok(())
            }
            Err(err) => {
                let err = command_error(err);
                self.inner
                    .logger
                    .warn(&format!("failed to close radio: {}", err));
                Err(err)
            }
        };
        stopped.and(closed)
    }

    fn emit(&self, event: ReconEvent) {
        self.inner.emit(event);
    }
}

impl<V: ReconciliationView> LoopShared<V> {
    fn emit(&self, event: ReconEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn run_tick(&self, generation: u64) -> TickOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.record_skipped();
            self.logger.detail("previous tick still running; skipping");
            return TickOutcome::Skipped;
        }
        let _busy = BusyGuard(&self.busy);

        let raw_ids = match self.radio.detected_tag_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                let err = read_error(err);
                self.metrics.record_error();
                self.logger.warn(&format!("tick read failed: {}", err));
                let mut state = self.state.lock().await;
                if state.is_current(generation) {
                    state.last_error = Some(err.to_string());
                }
                drop(state);
                self.emit(ReconEvent::TickFailed(err.to_string()));
                return TickOutcome::Failed(err);
            }
        };

        let snapshot = DetectionSnapshot::from_raw(&raw_ids);
        let assignments = match self.store.try_load_assignments().await {
            Ok(assignments) => assignments,
            Err(err) => {
                self.metrics.record_error();
                self.logger
                    .warn(&format!("tick skipped, name table unreadable: {}", err));
                let mut state = self.state.lock().await;
                if state.is_current(generation) {
                    state.last_error = Some(err.to_string());
                }
                drop(state);
                self.emit(ReconEvent::TickFailed(err.to_string()));
                return TickOutcome::Failed(err);
            }
        };

        let (session, new_tags, metadata) = {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                self.metrics.record_discarded();
                self.logger.detail("dropping tick result from ended session");
                return TickOutcome::Discarded;
            }

            let new_tags = state.accumulated.merge(&snapshot);
            let metadata = match state.recompute(&assignments) {
                Ok(metadata) => metadata,
                Err(err) => {
                    self.metrics.record_error();
                    self.logger.warn(&format!("view update failed: {}", err));
                    state.last_error = Some(err.to_string());
                    return TickOutcome::Failed(err);
                }
            };
            state.last_snapshot = snapshot.clone();
            state.last_error = None;
            (state.session, new_tags, metadata)
        };

        match self.radio.detected_tag_count().await {
            Ok(count) => {
                let mut state = self.state.lock().await;
                if state.is_current(generation) {
                    state.tag_count = count;
                }
            }
            Err(err) => self
                .logger
                .warn(&format!("failed to read tag count: {}", err)),
        }

        self.metrics.record_tick();
        self.logger.detail(&format!(
            "tick: {} detected ({} raw), {} new",
            snapshot.len(),
            snapshot.raw_count,
            new_tags.len()
        ));
        self.emit(ReconEvent::TickApplied {
            session,
            detected: snapshot.len(),
            new_tags: new_tags.len(),
        });
        if !metadata.newly_present.is_empty() {
            self.emit(ReconEvent::NewlyPresent(metadata.newly_present.clone()));
        }

        TickOutcome::Applied(TickSummary {
            snapshot,
            new_tags,
            newly_present: metadata.newly_present,
        })
    }
}

impl<V: ReconciliationView> Drop for LoopShared<V> {
    fn drop(&mut self) {
        if let Some(poll) = self.state.get_mut().poll.take() {
            poll.cancel.cancel();
            self.logger
                .warn("loop dropped while scanning; call shutdown() to stop the radio");
        }
    }
}

async fn poll_task<V: ReconciliationView + 'static>(
    shared: Weak<LoopShared<V>>,
    generation: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                shared.run_tick(generation).await;
            }
        }
    }
}

/// Opens the radio, runs `body`, and always tears the session down.
///
/// The radio is stopped and closed whether `body` succeeds or fails. An error
/// from `body` takes precedence over a teardown error.
pub async fn run_session<V, F, Fut, T, E>(recon: &ReconciliationLoop<V>, body: F) -> Result<T, E>
where
    V: ReconciliationView + 'static,
    F: FnOnce(ReconciliationLoop<V>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ReconError>,
{
    recon.open().await?;
    let result = body(recon.clone()).await;
    let teardown = recon.shutdown().await;

    match (result, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), teardown) => {
            if let Err(teardown_err) = teardown {
                recon
                    .inner
                    .logger
                    .warn(&format!("teardown after failure also failed: {}", teardown_err));
            }
            Err(err)
        }
    }
}

fn command_error(err: ReconError) -> ReconError {
    match err {
        ReconError::RadioCommand(_) => err,
        other => ReconError::RadioCommand(other.to_string()),
    }
}

fn read_error(err: ReconError) -> ReconError {
    match err {
        ReconError::RadioRead(_) => err,
        other => ReconError::RadioRead(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::classifier::{PresenceReport, PresenceStatus};
    use crate::processing::view::{PresenceView, UnassignedView};
    use crate::store::{MemoryStore, NameStore};
    use crate::tag_interface::ScriptedRadio;

    fn tags(ids: &[&str]) -> Vec<TagId> {
        ids.iter().map(|id| TagId::from(*id)).collect()
    }

    fn unassigned_loop(
        radio: &Arc<ScriptedRadio>,
        store: &Arc<MemoryStore>,
    ) -> ReconciliationLoop<UnassignedView> {
        ReconciliationLoop::new(
            radio.clone(),
            NameStoreAdapter::new(store.clone()),
            UnassignedView::new(),
            ScanConfig::default(),
        )
        .unwrap()
    }

    fn presence_loop(
        radio: &Arc<ScriptedRadio>,
        store: &Arc<MemoryStore>,
    ) -> ReconciliationLoop<PresenceView> {
        ReconciliationLoop::new(
            radio.clone(),
            NameStoreAdapter::new(store.clone()),
            PresenceView::new(),
            ScanConfig::default(),
        )
        .unwrap()
    }

    async fn opened() -> (Arc<ScriptedRadio>, Arc<MemoryStore>) {
        let radio = Arc::new(ScriptedRadio::new());
        radio.open().await.unwrap();
        (radio, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn unassigned_list_accumulates_across_ticks() {
        let (radio, store) = opened().await;
        radio
            .push_detections(&["AA00", "BB00"])
            .push_detections(&["BB00", "CC00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        recon.poll_once().await;
        assert_eq!(recon.view().await, tags(&["AA", "BB"]));
        recon.poll_once().await;
        assert_eq!(recon.view().await, tags(&["AA", "BB", "CC"]));

        recon.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn assigned_tags_are_excluded_from_unassigned_list() {
        let (radio, store) = opened().await;
        store.set("assignedTags", r#"{"BB":"Wallet"}"#).await.unwrap();
        radio.push_detections(&["AA00", "BB00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        recon.poll_once().await;
        let status = recon.status().await;
        assert_eq!(status.view, tags(&["AA"]));
        assert_eq!(status.accumulated, tags(&["AA", "BB"]));
        assert_eq!(status.tag_count, 2);

        recon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn presence_report_tracks_assignments() {
        let (radio, store) = opened().await;
        store.set("assignedTags", r#"{"1A2B":"Laptop"}"#).await.unwrap();
        radio.push_detections::<&str>(&[]).push_detections(&["1A2B0000"]);
        let recon = presence_loop(&radio, &store);
        let mut events = recon.subscribe();

        recon.start().await.unwrap();
        recon.poll_once().await;
        let report: PresenceReport = recon.view().await;
        assert_eq!(report.entries[0].status, PresenceStatus::Missing);

        match recon.poll_once().await {
            TickOutcome::Applied(summary) => assert_eq!(summary.newly_present, vec!["Laptop"]),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(recon.view().await.entries[0].status, PresenceStatus::Present);

        let mut saw_arrival = false;
        while let Ok(event) = events.try_recv() {
            if event == ReconEvent::NewlyPresent(vec!["Laptop".into()]) {
                saw_arrival = true;
            }
        }
        assert!(saw_arrival);
        recon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn read_failure_does_not_stop_the_loop() {
        let (radio, store) = opened().await;
        radio.push_read_failure("antenna busy").push_detections(&["AA00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        assert!(matches!(
            recon.poll_once().await,
            TickOutcome::Failed(ReconError::RadioRead(_))
        ));
        assert_eq!(recon.phase().await, ScanPhase::Scanning);
        assert!(matches!(recon.poll_once().await, TickOutcome::Applied(_)));
        assert_eq!(recon.view().await, tags(&["AA"]));
        assert_eq!(recon.metrics().errors, 1);

        recon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_leaves_loop_idle() {
        let (radio, store) = opened().await;
        radio.fail_start(true);
        let recon = unassigned_loop(&radio, &store);

        assert!(matches!(
            recon.start().await,
            Err(ReconError::RadioCommand(_))
        ));
        assert_eq!(recon.phase().await, ScanPhase::Idle);
        assert_eq!(recon.poll_once().await, TickOutcome::NotScanning);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_scanning() {
        let (radio, store) = opened().await;
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        assert_eq!(recon.start().await, Err(ReconError::AlreadyScanning));
        assert_eq!(radio.calls().start_scan, 1);
        recon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (radio, store) = opened().await;
        let recon = unassigned_loop(&radio, &store);

        recon.stop().await.unwrap();
        recon.start().await.unwrap();
        recon.stop().await.unwrap();
        recon.stop().await.unwrap();

        assert_eq!(radio.calls().stop_scan, 1);
        assert!(!radio.is_scanning());
        assert_eq!(recon.phase().await, ScanPhase::Idle);
    }

    #[tokio::test]
    async fn failed_stop_still_returns_to_idle() {
        let (radio, store) = opened().await;
        let recon = unassigned_loop(&radio, &store);
        recon.start().await.unwrap();
        radio.fail_stop(true);

        assert!(matches!(recon.stop().await, Err(ReconError::RadioCommand(_))));
        assert_eq!(recon.phase().await, ScanPhase::Idle);
    }

    #[tokio::test]
    async fn clear_resets_detections_but_keeps_assignments() {
        let (radio, store) = opened().await;
        store.set("assignedTags", r#"{"AA":"Keys"}"#).await.unwrap();
        radio.push_detections(&["AA00", "BB00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        recon.poll_once().await;
        recon.clear().await.unwrap();

        let status = recon.status().await;
        assert_eq!(status.phase, ScanPhase::Idle);
        assert!(status.accumulated.is_empty());
        assert!(status.view.is_empty());
        assert_eq!(status.tag_count, 0);
        assert_eq!(store.raw("assignedTags").as_deref(), Some(r#"{"AA":"Keys"}"#));
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let (radio, store) = opened().await;
        radio
            .set_read_delay(Duration::from_millis(50))
            .push_detections(&["AA00"])
            .push_detections(&["BB00"]);
        let recon = unassigned_loop(&radio, &store);
        recon.start().await.unwrap();

        let (first, second) = tokio::join!(recon.poll_once(), recon.poll_once());
        assert!(matches!(first, TickOutcome::Applied(_)));
        assert_eq!(second, TickOutcome::Skipped);
        assert_eq!(recon.metrics().skipped, 1);
        assert_eq!(radio.calls().reads, 1);

        recon.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timer_polls_at_fixed_period() {
        let (radio, store) = opened().await;
        radio
            .push_detections(&["AA00"])
            .push_detections(&["BB00"])
            .push_detections(&["CC00"])
            .push_detections(&["DD00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        time::sleep(Duration::from_millis(1_600)).await;
        recon.stop().await.unwrap();

        assert_eq!(recon.metrics().ticks, 3);
        assert_eq!(recon.view().await, tags(&["AA", "BB", "CC"]));
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_after_stop_is_discarded() {
        let (radio, store) = opened().await;
        radio
            .set_read_delay(Duration::from_millis(200))
            .push_detections(&["AA00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        // First tick fires at 500 ms and waits on the radio until 700 ms.
        time::sleep(Duration::from_millis(600)).await;
        recon.stop().await.unwrap();

        assert_eq!(recon.metrics().discarded, 1);
        assert!(recon.status().await.accumulated.is_empty());
        assert_eq!(recon.phase().await, ScanPhase::Idle);
    }

    #[tokio::test]
    async fn restart_continues_accumulating_until_cleared() {
        let (radio, store) = opened().await;
        radio.push_detections(&["AA00"]).push_detections(&["BB00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        recon.poll_once().await;
        recon.stop().await.unwrap();
        recon.start().await.unwrap();
        recon.poll_once().await;

        let status = recon.status().await;
        assert_eq!(status.session, 2);
        assert_eq!(status.view, tags(&["AA", "BB"]));
        recon.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_session_releases_radio_when_body_fails() {
        let radio = Arc::new(ScriptedRadio::new());
        let store = Arc::new(MemoryStore::new());
        let recon = unassigned_loop(&radio, &store);

        let result: ReconResult<()> = run_session(&recon, |recon| async move {
            recon.start().await?;
            Err::<(), ReconError>(ReconError::InvalidInput("operator cancelled".into()))
        })
        .await;

        assert_eq!(
            result,
            Err(ReconError::InvalidInput("operator cancelled".into()))
        );
        let calls = radio.calls();
        assert_eq!(calls.open, 1);
        assert_eq!(calls.stop_scan, 1);
        assert_eq!(calls.close, 1);
        assert!(!radio.is_scanning());
    }

    #[tokio::test]
    async fn run_session_reports_open_failure_without_body() {
        let radio = Arc::new(ScriptedRadio::new());
        radio.fail_open(true);
        let store = Arc::new(MemoryStore::new());
        let recon = unassigned_loop(&radio, &store);

        let result: ReconResult<u32> = run_session(&recon, |_| async { Ok(7) }).await;
        assert!(matches!(result, Err(ReconError::RadioCommand(_))));
        assert_eq!(radio.calls().close, 0);
    }

    #[tokio::test]
    async fn unreadable_name_table_leaves_presence_report_alone() {
        let (radio, store) = opened().await;
        store.set("assignedTags", r#"{"1A2B":"Laptop"}"#).await.unwrap();
        radio
            .push_detections(&["1A2B0000"])
            .push_detections(&["1A2B0000", "CC00"])
            .push_detections(&["1A2B0000"]);
        let recon = presence_loop(&radio, &store);
        let mut events = recon.subscribe();

        recon.start().await.unwrap();
        assert!(matches!(recon.poll_once().await, TickOutcome::Applied(_)));

        store.fail_reads(true);
        assert!(matches!(
            recon.poll_once().await,
            TickOutcome::Failed(ReconError::StoreRead(_))
        ));
        let status = recon.status().await;
        assert_eq!(status.view.len(), 1);
        assert_eq!(status.view.entries[0].status, PresenceStatus::Present);
        assert_eq!(status.accumulated, tags(&["1A2B"]));
        assert!(status.last_error.is_some());
        assert!(matches!(
            recon.refresh_view().await,
            Err(ReconError::StoreRead(_))
        ));
        assert_eq!(recon.view().await.len(), 1);

        store.fail_reads(false);
        match recon.poll_once().await {
            TickOutcome::Applied(summary) => assert!(summary.newly_present.is_empty()),
            other => panic!("unexpected outcome {:?}", other),
        }

        let mut arrivals = 0;
        while let Ok(event) = events.try_recv() {
            if let ReconEvent::NewlyPresent(_) = event {
                arrivals += 1;
            }
        }
        assert_eq!(arrivals, 1);
        recon.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_name_table_keeps_assigned_tags_out_of_unassigned_list() {
        let (radio, store) = opened().await;
        store.set("assignedTags", r#"{"BB":"Wallet"}"#).await.unwrap();
        radio
            .push_detections(&["AA00", "BB00"])
            .push_detections(&["AA00", "BB00"]);
        let recon = unassigned_loop(&radio, &store);

        recon.start().await.unwrap();
        recon.poll_once().await;
        store.fail_reads(true);
        recon.poll_once().await;

        assert_eq!(recon.view().await, tags(&["AA"]));
        assert_eq!(recon.metrics().errors, 1);
        recon.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_radio_start_does_not_block_status() {
        let (radio, store) = opened().await;
        radio.set_start_delay(Duration::from_millis(300));
        let recon = unassigned_loop(&radio, &store);

        let starting = tokio::spawn({
            let recon = recon.clone();
            async move { recon.start().await }
        });
        time::sleep(Duration::from_millis(100)).await;

        let status = time::timeout(Duration::from_millis(10), recon.status())
            .await
            .expect("status blocked behind start");
        assert_eq!(status.phase, ScanPhase::Starting);
        assert_eq!(recon.start().await, Err(ReconError::AlreadyScanning));

        starting.await.unwrap().unwrap();
        assert_eq!(recon.phase().await, ScanPhase::Scanning);
        recon.stop().await.unwrap();
    }
}
