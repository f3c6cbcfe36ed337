// ABOUTME: Import-level dependency extraction for JavaScript/TypeScript and Python files
// ABOUTME: Renders a per-file overview used to enrich the project overview prompt

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s+(?:[\w\s{},*]+)\s+from\s+['"]([^'"]+)['"]"#).expect("valid regex")
});
static JS_REQUIRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"require\(['"]([^'"]+)['"]\)"#).expect("valid regex"));
static JS_DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"import\(['"]([^'"]+)['"]\)"#).expect("valid regex"));
static PY_FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^from\s+([\w.]+)\s+import").expect("valid regex"));
static PY_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^import\s+([\w.]+)").expect("valid regex"));

const ANALYZED_EXTENSIONS: [&str; 5] = ["ts", "tsx", "js", "jsx", "py"];

fn captures(re: &Regex, text: &str, out: &mut Vec<String>) {
    out.extend(re.captures_iter(text).map(|c| c[1].to_string()));
}

/// Modules imported by a JavaScript or TypeScript source
pub fn extract_js_dependencies(text: &str) -> Vec<String> {
    let mut deps = Vec::new();
    captures(&JS_IMPORT, text, &mut deps);
    captures(&JS_REQUIRE, text, &mut deps);
    captures(&JS_DYNAMIC_IMPORT, text, &mut deps);
    dedup(deps)
}

/// Modules imported by a Python source
pub fn extract_python_dependencies(text: &str) -> Vec<String> {
    let mut deps = Vec::new();
    captures(&PY_FROM_IMPORT, text, &mut deps);
    captures(&PY_IMPORT, text, &mut deps);
    dedup(deps)
}

fn dedup(deps: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    deps.into_iter().filter(|d| seen.insert(d.clone())).collect()
}

/// File-level import graph of a workspace
#[derive(Debug, Default, Clone)]
pub struct DependencyAnalyzer {
    nodes: BTreeMap<String, Vec<String>>,
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_analyzable(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| ANALYZED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Record the imports of one file, keyed by its workspace-relative id
    pub fn add_file(&mut self, id: impl Into<String>, path: &Path, text: &str) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let deps = match ext.as_str() {
            "py" => extract_python_dependencies(text),
            "ts" | "tsx" | "js" | "jsx" => extract_js_dependencies(text),
            _ => Vec::new(),
        };
        self.nodes.insert(id.into(), deps);
    }

    /// Read and analyze `files`, ids relative to `root`. Unreadable files are skipped.
    pub fn analyze_files(&mut self, root: &Path, files: &[PathBuf]) {
        for path in files.iter().filter(|p| Self::is_analyzable(p)) {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let id = path
                        .strip_prefix(root)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    self.add_file(id, path, &text);
                }
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
    }

    pub fn dependencies_of(&self, id: &str) -> Option<&[String]> {
        self.nodes.get(id).map(|d| d.as_slice())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn overview_text(&self) -> String {
        let mut out = String::from("# Project Overview & Dependencies\n\n");
        for (id, deps) in &self.nodes {
            out.push_str(&format!("## {}\n", id));
            if deps.is_empty() {
                out.push_str("No detected dependencies.\n");
            } else {
                out.push_str(&format!("Depends on: {}\n", deps.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_imports() {
        let text = r#"
import React, { useState } from 'react';
import * as path from "path";
const fs = require('fs');
const lazy = await import('./lazy');
const again = require('fs');
"#;
        assert_eq!(
            extract_js_dependencies(text),
            vec!["react", "path", "fs", "./lazy"]
        );
    }

    #[test]
    fn test_python_imports() {
        let text = "import os\nfrom models.user import User\nimport os.path\n    import nested\n";
        assert_eq!(
            extract_python_dependencies(text),
            vec!["models.user", "os", "os.path"]
        );
    }

    #[test]
    fn test_overview_text_sorted_by_file() {
        let mut analyzer = DependencyAnalyzer::new();
        analyzer.add_file("src/b.py", Path::new("src/b.py"), "import json\n");
        analyzer.add_file("src/a.js", Path::new("src/a.js"), "console.log(1)\n");
        analyzer.add_file("notes.md", Path::new("notes.md"), "import x");

        let text = analyzer.overview_text();
        let a = text.find("## src/a.js\nNo detected dependencies.").unwrap();
        let b = text.find("## src/b.py\nDepends on: json").unwrap();
        assert!(a < b);
        assert!(analyzer.dependencies_of("notes.md").unwrap().is_empty());
    }
}
