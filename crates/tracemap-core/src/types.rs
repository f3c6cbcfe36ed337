use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

pub type TraceId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
    CSharp,
    Cpp,
    C,
    Other(String),
}

/// Buckets used to cap the workspace search per kind of language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileCategory {
    Scripting,
    Web,
    Compiled,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "java" => Language::Java,
            "cs" => Language::CSharp,
            "cpp" | "cxx" | "cc" | "hpp" | "hxx" => Language::Cpp,
            "c" | "h" => Language::C,
            other => Language::Other(other.to_string()),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or_else(|| Language::Other(String::new()))
    }

    pub fn category(&self) -> Option<FileCategory> {
        match self {
            Language::Python => Some(FileCategory::Scripting),
            Language::JavaScript | Language::TypeScript => Some(FileCategory::Web),
            Language::Java | Language::CSharp | Language::Cpp | Language::C => {
                Some(FileCategory::Compiled)
            }
            Language::Other(_) => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
            Language::CSharp => "csharp",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

/// One entry of the cumulative function-explanation index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionExplanation {
    pub function_name: String,
    pub explanation: String,
}

/// A persisted recording: call order plus the explanation of every function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: TraceId,
    pub functions: Vec<String>,
    #[serde(default)]
    pub explanations: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn new(functions: Vec<String>, explanations: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            functions,
            explanations,
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            id: self.id,
            functions: self.functions.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub id: TraceId,
    pub functions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TraceSummary {
    /// `"<local time> (<n> functions)"`
    pub fn label(&self) -> String {
        format!(
            "{} ({} functions)",
            self.created_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S"),
            self.functions.len()
        )
    }

    /// Call order rendered as `a -> b -> c`
    pub fn description(&self) -> String {
        self.functions.join(" -> ")
    }
}
