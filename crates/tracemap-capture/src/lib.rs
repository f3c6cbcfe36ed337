pub mod classify;
pub mod dap;
pub mod diagnostics;
pub mod engine;
pub mod session;
pub mod thread_cache;
pub mod trace;

pub use classify::{FrameClass, FrameClassifier, MODULE_FRAME_NAME};
pub use dap::{DapConfig, DapSession};
pub use diagnostics::{CaptureDiagnostics, CaptureOutcome};
pub use engine::CaptureEngine;
pub use session::*;
pub use thread_cache::ThreadCache;
pub use trace::FunctionTrace;
