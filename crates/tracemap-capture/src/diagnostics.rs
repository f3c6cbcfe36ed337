use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureOutcome {
    /// Another attempt was still in flight
    Skipped,
    /// No thread returned any frame
    EmptyStacks,
    /// Frames existed but none were application code
    OnlyLibraryFrames,
    /// At least one application frame was seen
    FoundAppCode,
}

/// Per-session capture counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDiagnostics {
    pub total_attempts: u64,
    pub overlap_skips: u64,
    pub empty_stacks: u64,
    pub only_library_frames: u64,
    pub found_app_code: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl CaptureDiagnostics {
    pub fn started_now() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: CaptureOutcome) {
        self.total_attempts += 1;
        match outcome {
            CaptureOutcome::Skipped => self.overlap_skips += 1,
            CaptureOutcome::EmptyStacks => self.empty_stacks += 1,
            CaptureOutcome::OnlyLibraryFrames => self.only_library_frames += 1,
            CaptureOutcome::FoundAppCode => self.found_app_code += 1,
        }
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.started_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
    }

    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CaptureDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} attempts: {} found app code, {} only library frames, {} empty stacks, {} skipped (overlap)",
            self.total_attempts,
            self.found_app_code,
            self.only_library_frames,
            self.empty_stacks,
            self.overlap_skips
        )?;
        if let Some(secs) = self.elapsed_secs() {
            write!(f, " over {:.1}s", secs)?;
        }
        Ok(())
    }
}
