use crate::dependencies::DependencyAnalyzer;
use crate::matchers::StrategyTable;
use crate::reader::{FsSourceReader, SourceReader};
use crate::workspace::{collect_candidate_files, collect_dependencies, collect_workspace_structure};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracemap_core::{FunctionSourceMap, LocatorConfig};
use tracing::{debug, info, warn};

/// Finds the source of traced functions.
///
/// Lookup first scans the file the function was observed executing in, then
/// a bounded set of workspace files. Misses are not errors.
pub struct SourceLocator {
    reader: Arc<dyn SourceReader>,
    source_map: FunctionSourceMap,
    strategies: StrategyTable,
    workspace_roots: Vec<PathBuf>,
    config: LocatorConfig,
}

impl SourceLocator {
    pub fn new(
        source_map: FunctionSourceMap,
        workspace_roots: Vec<PathBuf>,
        config: LocatorConfig,
    ) -> Self {
        Self::with_reader(Arc::new(FsSourceReader), source_map, workspace_roots, config)
    }

    pub fn with_reader(
        reader: Arc<dyn SourceReader>,
        source_map: FunctionSourceMap,
        workspace_roots: Vec<PathBuf>,
        config: LocatorConfig,
    ) -> Self {
        Self {
            reader,
            source_map,
            strategies: StrategyTable::new(),
            workspace_roots,
            config,
        }
    }

    pub fn workspace_roots(&self) -> &[PathBuf] {
        &self.workspace_roots
    }

    pub fn has_workspace(&self) -> bool {
        !self.workspace_roots.is_empty()
    }

    /// Up to `snippet_lines` lines starting at the definition of `function_name`
    pub async fn find_function_code(&self, function_name: &str) -> Option<String> {
        if function_name.is_empty() {
            return None;
        }

        let remembered = self.source_map.get(function_name).map(PathBuf::from);
        if let Some(path) = &remembered {
            if let Some(snippet) = self.search_file(path, function_name).await {
                return Some(snippet);
            }
            debug!(
                "{} not found in remembered file {}, searching workspace",
                function_name,
                path.display()
            );
        }

        if !self.has_workspace() {
            debug!("No workspace to search for {}", function_name);
            return None;
        }

        let candidates = self.candidate_files().await;
        debug!(
            "Searching {} workspace files for {}",
            candidates.len(),
            function_name
        );
        for path in candidates
            .iter()
            .filter(|p| remembered.as_deref() != Some(p.as_path()))
        {
            if let Some(snippet) = self.search_file(path, function_name).await {
                return Some(snippet);
            }
        }

        info!("No source found for {}", function_name);
        None
    }

    async fn search_file(&self, path: &Path, function_name: &str) -> Option<String> {
        match self.reader.read_to_string(path).await {
            Ok(text) => self.find_in_text(path, &text, function_name),
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Scan `text` top to bottom with the strategy for `path`'s extension
    pub fn find_in_text(&self, path: &Path, text: &str, function_name: &str) -> Option<String> {
        let is_definition = self.strategies.matcher_for(path, function_name);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.iter().position(|&line| is_definition(line))?;
        let end = (start + self.config.snippet_lines).min(lines.len());
        debug!(
            "Found {} in {} at line {}",
            function_name,
            path.display(),
            start + 1
        );
        Some(lines[start..end].join("\n"))
    }

    async fn candidate_files(&self) -> Vec<PathBuf> {
        let roots = self.workspace_roots.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || collect_candidate_files(&roots, &config))
            .await
            .unwrap_or_else(|e| {
                warn!("Workspace scan failed: {}", e);
                Vec::new()
            })
    }

    /// Root name -> relative file list, used for the project overview
    pub async fn workspace_structure(&self) -> Value {
        let roots = self.workspace_roots.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || collect_workspace_structure(&roots, &config))
            .await
            .unwrap_or_else(|e| {
                warn!("Workspace scan failed: {}", e);
                Value::Object(Default::default())
            })
    }

    /// Declared manifests plus a per-file import overview under `imports`
    pub async fn project_dependencies(&self) -> Value {
        let roots = self.workspace_roots.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut deps = collect_dependencies(&roots, &config);
            let mut analyzer = DependencyAnalyzer::new();
            for root in &roots {
                let files = collect_candidate_files(std::slice::from_ref(root), &config);
                analyzer.analyze_files(root, &files);
            }
            if let (Value::Object(map), false) = (&mut deps, analyzer.is_empty()) {
                map.insert("imports".to_string(), Value::String(analyzer.overview_text()));
            }
            deps
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Dependency scan failed: {}", e);
            Value::Object(Default::default())
        })
    }
}
