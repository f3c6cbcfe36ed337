// ABOUTME: Debug session capability consumed by the capture engine
// ABOUTME: Typed thread and frame records validated at the protocol boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request '{command}' failed: {message}")]
    RequestFailed { command: String, message: String },

    #[error("Timed out waiting for '{0}' response")]
    Timeout(String),

    #[error("Debug session closed")]
    Closed,
}

/// A live thread as reported by the debugger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDescriptor {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSource {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub source: Option<FrameSource>,
    #[serde(default)]
    pub line: i64,
}

impl StackFrame {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            source: Some(FrameSource {
                path: Some(path.into()),
                name: None,
            }),
            line: 0,
        }
    }

    /// `source.path`, else `source.name`, else empty
    pub fn source_path(&self) -> &str {
        self.source
            .as_ref()
            .and_then(|s| s.path.as_deref().or(s.name.as_deref()))
            .unwrap_or("")
    }
}

/// Notifications pushed by the debugger, used as opportunistic capture triggers
#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    Stopped {
        reason: String,
        thread_id: Option<i64>,
    },
    Continued {
        thread_id: Option<i64>,
    },
    BreakpointsChanged,
    Terminated,
    Custom {
        event: String,
        body: Value,
    },
}

impl DebugEvent {
    /// Map a raw protocol event onto the typed variants
    pub fn from_protocol(event: &str, body: Value) -> Self {
        let thread_id = body.get("threadId").and_then(Value::as_i64);
        match event {
            "stopped" => DebugEvent::Stopped {
                reason: body
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                thread_id,
            },
            "continued" => DebugEvent::Continued { thread_id },
            "breakpoint" => DebugEvent::BreakpointsChanged,
            "terminated" | "exited" => DebugEvent::Terminated,
            other => DebugEvent::Custom {
                event: other.to_string(),
                body,
            },
        }
    }
}

/// Capability surface of a live debug session.
#[async_trait]
pub trait DebugSession: Send + Sync {
    async fn list_threads(&self) -> SessionResult<Vec<ThreadDescriptor>>;

    /// Top `max_frames` frames of `thread_id`, innermost first
    async fn stack_trace(&self, thread_id: i64, max_frames: usize)
        -> SessionResult<Vec<StackFrame>>;

    /// Event stream, if the session offers one
    fn subscribe(&self) -> Option<broadcast::Receiver<DebugEvent>> {
        None
    }

    fn name(&self) -> &str {
        "debug-session"
    }
}
