// ABOUTME: Knowledge store kept in memory and mirrored to a single JSON file
// ABOUTME: Every mutation rewrites the file atomically through a temp file and rename

use crate::store::{KnowledgeStore, StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracemap_core::{FunctionExplanation, TraceId, TraceRecord, TraceSummary};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KnowledgeData {
    #[serde(default)]
    project_overview: String,
    #[serde(default)]
    function_explanations: BTreeMap<String, String>,
    #[serde(default)]
    traces: Vec<TraceRecord>,
}

pub struct JsonKnowledgeStore {
    path: Option<PathBuf>,
    data: RwLock<KnowledgeData>,
    /// Serializes mutate-then-write so files land in mutation order
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonKnowledgeStore {
    /// Load `path` if it exists, otherwise start empty. The file is created on first write.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No knowledge file at {}, starting empty", path.display());
                KnowledgeData::default()
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            "Knowledge store {} loaded ({} traces)",
            path.display(),
            data.traces.len()
        );

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(KnowledgeData::default()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `f` to a copy, persist the copy, then publish it. On a failed
    /// write the in-memory state is left as it was.
    async fn mutate<T>(&self, f: impl FnOnce(&mut KnowledgeData) -> T) -> StoreResult<T> {
        let _write = self.write_lock.lock().await;
        let Some(path) = &self.path else {
            return Ok(f(&mut self.data.write()));
        };

        let mut next = self.data.read().clone();
        let result = f(&mut next);
        let bytes = serde_json::to_vec_pretty(&next)?;
        persist(path, &bytes).await?;

        *self.data.write() = next;
        Ok(result)
    }
}

async fn persist(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            debug!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(e.into());
    }
    debug!("Knowledge written to {}", path.display());
    Ok(())
}

#[async_trait]
impl KnowledgeStore for JsonKnowledgeStore {
    async fn project_overview(&self) -> StoreResult<Option<String>> {
        let data = self.data.read();
        Ok(Some(data.project_overview.clone()).filter(|o| !o.is_empty()))
    }

    async fn save_project_overview(&self, overview: &str) -> StoreResult<()> {
        let overview = overview.to_string();
        self.mutate(move |data| data.project_overview = overview).await
    }

    async fn find_matching_trace(
        &self,
        functions: &[String],
    ) -> StoreResult<Option<TraceRecord>> {
        let data = self.data.read();
        Ok(data
            .traces
            .iter()
            .rev()
            .find(|t| t.functions.as_slice() == functions)
            .cloned())
    }

    async fn add_trace(
        &self,
        functions: &[String],
        explanations: &HashMap<String, String>,
    ) -> StoreResult<TraceId> {
        let record = TraceRecord::new(functions.to_vec(), explanations.clone());
        let id = record.id;
        self.mutate(move |data| data.traces.push(record)).await?;
        info!("Stored trace {} ({} functions)", id, functions.len());
        Ok(id)
    }

    async fn save_function_explanations(
        &self,
        entries: &[FunctionExplanation],
    ) -> StoreResult<()> {
        let entries = entries.to_vec();
        self.mutate(move |data| {
            for entry in entries {
                data.function_explanations
                    .insert(entry.function_name, entry.explanation);
            }
        })
        .await
    }

    async fn list_traces(&self) -> StoreResult<Vec<TraceSummary>> {
        let mut summaries: Vec<TraceSummary> =
            self.data.read().traces.iter().map(TraceRecord::summary).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn get_trace(&self, id: TraceId) -> StoreResult<Option<TraceRecord>> {
        Ok(self.data.read().traces.iter().find(|t| t.id == id).cloned())
    }

    async fn function_explanation(&self, function_name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .data
            .read()
            .function_explanations
            .get(function_name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overview_absent_until_saved() {
        let store = JsonKnowledgeStore::in_memory();
        assert_eq!(store.project_overview().await.unwrap(), None);
        store.save_project_overview("# Project Overview").await.unwrap();
        assert_eq!(
            store.project_overview().await.unwrap().as_deref(),
            Some("# Project Overview")
        );
    }

    #[tokio::test]
    async fn test_matching_requires_same_order() {
        let store = JsonKnowledgeStore::in_memory();
        let functions = vec!["a".to_string(), "b".to_string()];
        store.add_trace(&functions, &HashMap::new()).await.unwrap();

        assert!(store.find_matching_trace(&functions).await.unwrap().is_some());
        let reversed = vec!["b".to_string(), "a".to_string()];
        assert!(store.find_matching_trace(&reversed).await.unwrap().is_none());
        assert!(store.find_matching_trace(&functions[..1]).await.unwrap().is_none());
    }
}
