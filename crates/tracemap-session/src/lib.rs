pub mod controller;
pub mod report;
pub mod review;
pub mod workflow;

pub use controller::{RecordingPhase, TraceSessionController};
pub use report::{StopReport, EXPLANATION_FAILED, NO_EXPLANATION};
pub use review::{ExplainedFunction, TraceDetail, TraceReview};
pub use workflow::{ExplainWorkflow, WorkflowOutcome};
