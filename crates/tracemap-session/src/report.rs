use serde::Serialize;
use tracemap_capture::CaptureDiagnostics;
use tracemap_core::TraceId;

/// Stored in place of an explanation the AI endpoint could not produce
pub const EXPLANATION_FAILED: &str = "(Failed to retrieve AI explanation)";

/// Shown for a function with neither a trace nor an index explanation
pub const NO_EXPLANATION: &str = "(No explanation available)";

/// Result of stopping a recording
#[derive(Debug, Clone, Default, Serialize)]
pub struct StopReport {
    /// Distinct functions captured
    pub count: usize,
    /// Explanations were taken from an identical stored trace
    pub reused: bool,
    pub trace_id: Option<TraceId>,
    /// Functions that received the failure placeholder
    pub failed_functions: Vec<String>,
    /// Set when the trace could not be written to the knowledge store
    pub persist_error: Option<String>,
    pub diagnostics: CaptureDiagnostics,
}

impl StopReport {
    pub fn diagnostics_summary(&self) -> String {
        self.diagnostics.summary()
    }
}
