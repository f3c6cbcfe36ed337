// ABOUTME: One capture attempt: enumerate threads, fetch stacks concurrently, classify, dedup
// ABOUTME: Owns the per-session trace, thread cache and diagnostics behind an overlap guard

use crate::classify::{FrameClass, FrameClassifier};
use crate::diagnostics::{CaptureDiagnostics, CaptureOutcome};
use crate::session::{DebugSession, SessionResult, StackFrame, ThreadDescriptor};
use crate::thread_cache::ThreadCache;
use crate::trace::FunctionTrace;
use futures::future::join_all;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracemap_core::{CaptureConfig, FunctionSourceMap};
use tracing::{debug, info, warn};

/// Clears the in-flight flag even if the attempt future is dropped midway
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CaptureEngine {
    classifier: FrameClassifier,
    thread_cache: ThreadCache,
    source_map: FunctionSourceMap,
    trace: Mutex<FunctionTrace>,
    diagnostics: Mutex<CaptureDiagnostics>,
    in_flight: AtomicBool,
    /// Epoch of the attempt holding `in_flight`
    in_flight_epoch: AtomicU64,
    /// Bumped on reset so attempts started in an earlier session are discarded
    epoch: AtomicU64,
    max_frames: usize,
}

impl CaptureEngine {
    pub fn new(
        config: &CaptureConfig,
        workspace_roots: &[PathBuf],
        source_map: FunctionSourceMap,
    ) -> Self {
        Self::with_classifier(
            config,
            FrameClassifier::new(config, workspace_roots),
            source_map,
        )
    }

    pub fn with_classifier(
        config: &CaptureConfig,
        classifier: FrameClassifier,
        source_map: FunctionSourceMap,
    ) -> Self {
        Self {
            classifier,
            thread_cache: ThreadCache::new(Duration::from_millis(config.thread_cache_ttl_ms)),
            source_map,
            trace: Mutex::new(FunctionTrace::new()),
            diagnostics: Mutex::new(CaptureDiagnostics::default()),
            in_flight: AtomicBool::new(false),
            in_flight_epoch: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            max_frames: config.max_frames as usize,
        }
    }

    /// Start a fresh recording session
    pub fn reset(&self) {
        // Held across the bump so no attempt applies between epoch and clear
        let mut trace = self.trace.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        trace.clear();
        self.source_map.clear();
        self.thread_cache.clear();
        *self.diagnostics.lock() = CaptureDiagnostics::started_now();
        debug!("Capture state reset");
    }

    pub fn clear_thread_cache(&self) {
        self.thread_cache.clear();
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.trace.lock().snapshot()
    }

    pub fn trace_len(&self) -> usize {
        self.trace.lock().len()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        self.diagnostics.lock().clone()
    }

    pub fn source_map(&self) -> &FunctionSourceMap {
        &self.source_map
    }

    pub fn is_capturing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one capture attempt against `session`.
    ///
    /// Never fails: enumeration and per-thread errors are logged and degrade
    /// the attempt to "no data". Returns immediately with
    /// [`CaptureOutcome::Skipped`] if another attempt is in flight.
    pub async fn capture(&self, session: &dyn DebugSession) -> CaptureOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            if self.in_flight_epoch.load(Ordering::SeqCst) == self.epoch.load(Ordering::SeqCst) {
                debug!("Capture already in flight, skipping tick");
                self.diagnostics.lock().record(CaptureOutcome::Skipped);
            } else {
                debug!("Attempt from a previous recording session still in flight, skipping tick");
            }
            return CaptureOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.in_flight_epoch.store(epoch, Ordering::SeqCst);

        let threads = self.threads(session).await;
        let stacks = self.fetch_stacks(session, &threads).await;

        match self.apply(epoch, &threads, stacks) {
            Some(outcome) => outcome,
            None => {
                debug!("Discarding capture from a previous recording session");
                CaptureOutcome::Skipped
            }
        }
    }

    async fn threads(&self, session: &dyn DebugSession) -> Arc<Vec<ThreadDescriptor>> {
        if let Some(threads) = self.thread_cache.fresh() {
            return threads;
        }
        match session.list_threads().await {
            Ok(threads) => {
                debug!("Enumerated {} threads", threads.len());
                self.thread_cache.store(threads)
            }
            Err(e) => {
                warn!("Failed to list threads: {}", e);
                Arc::new(Vec::new())
            }
        }
    }

    /// All stack requests are issued together and awaited as one batch
    async fn fetch_stacks(
        &self,
        session: &dyn DebugSession,
        threads: &[ThreadDescriptor],
    ) -> Vec<SessionResult<Vec<StackFrame>>> {
        join_all(
            threads
                .iter()
                .map(|thread| session.stack_trace(thread.id, self.max_frames)),
        )
        .await
    }

    /// Fold settled results in thread order, then frame order.
    /// `None` when the engine was reset after the attempt started.
    fn apply(
        &self,
        epoch: u64,
        threads: &[ThreadDescriptor],
        stacks: Vec<SessionResult<Vec<StackFrame>>>,
    ) -> Option<CaptureOutcome> {
        let mut trace = self.trace.lock();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return None;
        }
        let mut saw_frames = false;
        let mut saw_app_code = false;

        for (thread, result) in threads.iter().zip(stacks) {
            let frames = match result {
                Ok(frames) => frames,
                Err(e) => {
                    warn!("Stack trace failed for thread {} ({}): {}", thread.id, thread.name, e);
                    continue;
                }
            };
            saw_frames |= !frames.is_empty();

            for frame in &frames {
                match self.classifier.classify(frame) {
                    FrameClass::Library => {}
                    FrameClass::ModuleEntry => saw_app_code = true,
                    FrameClass::Application => {
                        saw_app_code = true;
                        if frame.name.is_empty() {
                            continue;
                        }
                        self.source_map.record(&frame.name, frame.source_path());
                        if trace.observe(&frame.name) {
                            info!(
                                "Traced function #{}: {} ({})",
                                trace.len(),
                                frame.name,
                                frame.source_path()
                            );
                        }
                    }
                }
            }
        }

        let outcome = if saw_app_code {
            CaptureOutcome::FoundAppCode
        } else if saw_frames {
            CaptureOutcome::OnlyLibraryFrames
        } else {
            CaptureOutcome::EmptyStacks
        };
        self.diagnostics.lock().record(outcome);
        Some(outcome)
    }
}
