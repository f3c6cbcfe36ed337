use crate::session::StackFrame;
use std::path::{Path, PathBuf};
use tracemap_core::CaptureConfig;

/// Python's name for top-level module code
pub const MODULE_FRAME_NAME: &str = "<module>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// User code with a callable function name
    Application,
    /// User code executing at module level; counted but never traced
    ModuleEntry,
    /// Library, runtime or virtual environment code
    Library,
}

impl FrameClass {
    pub fn is_application(self) -> bool {
        !matches!(self, FrameClass::Library)
    }
}

/// Decides whether a frame belongs to the user's project.
///
/// A path is application code when it lies under a workspace root, contains
/// a configured project marker, or ends in a known source extension, and it
/// contains none of the exclusion markers. The extension rule is a heuristic:
/// a library shipped as plain source outside the usual package directories is
/// treated as user code.
#[derive(Debug, Clone)]
pub struct FrameClassifier {
    workspace_roots: Vec<String>,
    project_markers: Vec<String>,
    exclude_markers: Vec<String>,
    source_extensions: Vec<String>,
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

impl FrameClassifier {
    pub fn new(config: &CaptureConfig, workspace_roots: &[PathBuf]) -> Self {
        Self {
            workspace_roots: workspace_roots
                .iter()
                .map(|root| {
                    let mut root = normalize(&root.to_string_lossy());
                    if !root.ends_with('/') {
                        root.push('/');
                    }
                    root
                })
                .collect(),
            project_markers: config.project_markers.iter().map(|m| normalize(m)).collect(),
            exclude_markers: config.exclude_markers.clone(),
            source_extensions: config
                .source_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_application_path(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        let path = normalize(path);

        if self.exclude_markers.iter().any(|m| path.contains(m.as_str())) {
            return false;
        }

        self.workspace_roots.iter().any(|root| path.starts_with(root.as_str()))
            || self.project_markers.iter().any(|m| path.contains(m.as_str()))
            || self.has_source_extension(&path)
    }

    fn has_source_extension(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.source_extensions.iter().any(|s| *s == e)
            })
            .unwrap_or(false)
    }

    pub fn classify(&self, frame: &StackFrame) -> FrameClass {
        if !self.is_application_path(frame.source_path()) {
            return FrameClass::Library;
        }
        if frame.name == MODULE_FRAME_NAME {
            FrameClass::ModuleEntry
        } else {
            FrameClass::Application
        }
    }
}
