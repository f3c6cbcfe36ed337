// ABOUTME: Recording lifecycle: idle -> recording -> processing -> idle
// ABOUTME: Drives periodic and event-triggered captures, then hands the trace to the explain workflow

use crate::report::StopReport;
use crate::workflow::ExplainWorkflow;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracemap_ai::AiService;
use tracemap_capture::{
    CaptureDiagnostics, CaptureEngine, CaptureOutcome, DebugEvent, DebugSession,
};
use tracemap_core::{FunctionSourceMap, TraceMapConfig};
use tracemap_knowledge::KnowledgeStore;
use tracemap_locator::SourceLocator;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingPhase {
    Idle,
    Recording,
    Processing,
}

struct ControllerState {
    phase: RecordingPhase,
    active_session: Option<Arc<dyn DebugSession>>,
    /// Cancels the ticker and, through child tokens, every event hook
    recording: Option<CancellationToken>,
    hook: Option<CancellationToken>,
    disposed: bool,
}

struct Inner {
    engine: Arc<CaptureEngine>,
    workflow: ExplainWorkflow,
    tick_interval: Duration,
    state: Mutex<ControllerState>,
}

/// Returns the controller to idle when processing ends, including on early return
struct BackToIdle<'a>(&'a Mutex<ControllerState>);

impl Drop for BackToIdle<'_> {
    fn drop(&mut self) {
        self.0.lock().phase = RecordingPhase::Idle;
    }
}

pub struct TraceSessionController {
    inner: Arc<Inner>,
}

impl TraceSessionController {
    pub fn new(engine: Arc<CaptureEngine>, workflow: ExplainWorkflow, tick_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                workflow,
                tick_interval,
                state: Mutex::new(ControllerState {
                    phase: RecordingPhase::Idle,
                    active_session: None,
                    recording: None,
                    hook: None,
                    disposed: false,
                }),
            }),
        }
    }

    /// Wire engine, locator and AI service from `config`, sharing one source map
    /// between capture and lookup.
    pub fn from_config(
        config: &TraceMapConfig,
        workspace_roots: Vec<PathBuf>,
        store: Arc<dyn KnowledgeStore>,
    ) -> tracemap_core::Result<Self> {
        let source_map = FunctionSourceMap::new();
        let engine = Arc::new(CaptureEngine::new(
            &config.capture,
            &workspace_roots,
            source_map.clone(),
        ));
        let locator = Arc::new(SourceLocator::new(
            source_map,
            workspace_roots,
            config.locator.clone(),
        ));
        let ai = AiService::from_config(&config.ai)?;
        Ok(Self::new(
            engine,
            ExplainWorkflow::new(ai, store, locator),
            Duration::from_millis(config.capture.tick_interval_ms),
        ))
    }

    pub fn engine(&self) -> &Arc<CaptureEngine> {
        &self.inner.engine
    }

    pub fn workflow(&self) -> &ExplainWorkflow {
        &self.inner.workflow
    }

    pub fn phase(&self) -> RecordingPhase {
        self.inner.state.lock().phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase() == RecordingPhase::Recording
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.inner.engine.diagnostics()
    }

    /// Begin recording. Returns false if already recording, still processing
    /// the previous trace, or disposed.
    pub fn start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.disposed {
            warn!("Controller disposed, cannot start recording");
            return false;
        }
        if state.phase != RecordingPhase::Idle {
            warn!("Already recording or processing ({:?})", state.phase);
            return false;
        }

        self.inner.engine.reset();
        let token = CancellationToken::new();
        self.spawn_ticker(token.clone());
        if let Some(session) = state.active_session.clone() {
            state.hook = self.spawn_event_hook(session, token.child_token());
        } else {
            debug!("No active debug session yet, ticks will be skipped until one is set");
        }
        state.recording = Some(token);
        state.phase = RecordingPhase::Recording;
        info!(
            "Recording started (tick every {} ms)",
            self.inner.tick_interval.as_millis()
        );
        true
    }

    /// Stop recording and explain the trace.
    ///
    /// Returns an empty report when not recording. Captures still in flight
    /// may finish, but their frames land after the snapshot and are ignored.
    pub async fn stop(&self) -> StopReport {
        {
            let mut state = self.inner.state.lock();
            if state.phase != RecordingPhase::Recording {
                warn!("Not currently recording");
                return StopReport::default();
            }
            state.phase = RecordingPhase::Processing;
            if let Some(hook) = state.hook.take() {
                hook.cancel();
            }
            if let Some(token) = state.recording.take() {
                token.cancel();
            }
        }
        let _idle = BackToIdle(&self.inner.state);

        let functions = self.inner.engine.snapshot();
        let diagnostics = self.inner.engine.diagnostics();
        self.inner.engine.clear_thread_cache();
        info!("Recording stopped: {}", diagnostics.summary());

        let mut report = StopReport {
            count: functions.len(),
            diagnostics,
            ..StopReport::default()
        };
        if functions.is_empty() {
            info!("No application functions were traced");
            return report;
        }

        let outcome = self.inner.workflow.run(&functions).await;
        report.reused = outcome.reused;
        report.trace_id = outcome.trace_id;
        report.failed_functions = outcome.failed_functions;
        report.persist_error = outcome.persist_error;
        info!(
            "Trace of {} functions processed{}",
            report.count,
            if report.reused { " (reused)" } else { "" }
        );
        report
    }

    /// Use `session` for captures. Rehooks its events if recording.
    pub fn set_active_session(&self, session: Arc<dyn DebugSession>) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        if let Some(hook) = state.hook.take() {
            hook.cancel();
        }
        if let Some(token) = state.recording.as_ref().map(CancellationToken::child_token) {
            state.hook = self.spawn_event_hook(Arc::clone(&session), token);
        }
        info!("Active debug session: {}", session.name());
        state.active_session = Some(session);
    }

    pub fn clear_active_session(&self) {
        let mut state = self.inner.state.lock();
        if let Some(hook) = state.hook.take() {
            hook.cancel();
        }
        if state.active_session.take().is_some() {
            info!("Active debug session cleared");
        }
    }

    /// One manual capture attempt. `None` when not recording or no session is active.
    pub async fn capture_now(&self) -> Option<CaptureOutcome> {
        let session = {
            let state = self.inner.state.lock();
            if state.phase != RecordingPhase::Recording {
                warn!("Not currently recording");
                return None;
            }
            state.active_session.clone()
        };
        let Some(session) = session else {
            warn!("No active debug session");
            return None;
        };
        Some(self.inner.engine.capture(session.as_ref()).await)
    }

    /// Cancel everything and refuse further recordings
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(hook) = state.hook.take() {
            hook.cancel();
        }
        if let Some(token) = state.recording.take() {
            token.cancel();
        }
        state.active_session = None;
        if state.phase == RecordingPhase::Recording {
            state.phase = RecordingPhase::Idle;
        }
        debug!("Trace session controller disposed");
    }

    fn spawn_ticker(&self, token: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = interval(inner.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let session = inner.state.lock().active_session.clone();
                        if let Some(session) = session {
                            spawn_capture(Arc::clone(&inner.engine), session, token.clone());
                        }
                    }
                }
            }
            debug!("Capture ticker stopped");
        });
    }

    fn spawn_event_hook(
        &self,
        session: Arc<dyn DebugSession>,
        token: CancellationToken,
    ) -> Option<CancellationToken> {
        let Some(mut events) = session.subscribe() else {
            debug!("{} offers no event stream", session.name());
            return None;
        };
        let engine = Arc::clone(&self.inner.engine);
        let hook = token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(DebugEvent::Terminated) => {
                        info!("Debug session terminated");
                        break;
                    }
                    Ok(event) => {
                        debug!("Debug event {:?}, capturing", event);
                        spawn_capture(Arc::clone(&engine), Arc::clone(&session), token.clone());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Event hook lagged, {} events dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Event hook stopped");
        });
        Some(hook)
    }
}

impl Drop for TraceSessionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn spawn_capture(engine: Arc<CaptureEngine>, session: Arc<dyn DebugSession>, token: CancellationToken) {
    tokio::spawn(async move {
        if token.is_cancelled() {
            return;
        }
        engine.capture(session.as_ref()).await;
    });
}
