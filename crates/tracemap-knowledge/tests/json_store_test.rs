use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;
use tracemap_core::FunctionExplanation;
use tracemap_knowledge::*;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("knowledge.json");

    let id = {
        let store = JsonKnowledgeStore::open(&path).await.unwrap();
        store.save_project_overview("overview text").await.unwrap();
        store
            .save_function_explanations(&[FunctionExplanation {
                function_name: "main".into(),
                explanation: "entry point".into(),
            }])
            .await
            .unwrap();
        let explanations = HashMap::from([("main".to_string(), "entry point".to_string())]);
        store.add_trace(&names(&["main"]), &explanations).await.unwrap()
    };

    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let store = JsonKnowledgeStore::open(&path).await.unwrap();
    assert_eq!(
        store.project_overview().await.unwrap().as_deref(),
        Some("overview text")
    );
    assert_eq!(
        store.function_explanation("main").await.unwrap().as_deref(),
        Some("entry point")
    );
    let trace = store.get_trace(id).await.unwrap().unwrap();
    assert_eq!(trace.functions, names(&["main"]));
    assert_eq!(trace.explanations["main"], "entry point");
}

#[tokio::test]
async fn test_corrupt_file_is_reported_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("knowledge.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = JsonKnowledgeStore::open(&path).await.err().unwrap();
    assert!(matches!(err, StoreError::Corrupt { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_list_traces_newest_first() {
    let store = JsonKnowledgeStore::in_memory();
    let older = store
        .add_trace(&names(&["a", "b"]), &HashMap::new())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = store
        .add_trace(&names(&["c"]), &HashMap::new())
        .await
        .unwrap();

    let traces = store.list_traces().await.unwrap();
    assert_eq!(traces.len(), 2);
    assert_eq!(traces[0].id, newer);
    assert_eq!(traces[1].id, older);
    assert_eq!(traces[1].description(), "a -> b");
}

#[tokio::test]
async fn test_function_index_later_entries_win() {
    let store = JsonKnowledgeStore::in_memory();
    store
        .save_function_explanations(&[
            FunctionExplanation {
                function_name: "parse".into(),
                explanation: "v1".into(),
            },
            FunctionExplanation {
                function_name: "load".into(),
                explanation: "loads".into(),
            },
        ])
        .await
        .unwrap();
    store
        .save_function_explanations(&[FunctionExplanation {
            function_name: "parse".into(),
            explanation: "v2".into(),
        }])
        .await
        .unwrap();

    assert_eq!(
        store.function_explanation("parse").await.unwrap().as_deref(),
        Some("v2")
    );
    assert_eq!(
        store.function_explanation("load").await.unwrap().as_deref(),
        Some("loads")
    );
    assert!(store.function_explanation("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_most_recent_identical_trace_is_matched() {
    let store = JsonKnowledgeStore::in_memory();
    let functions = names(&["x", "y"]);
    store
        .add_trace(
            &functions,
            &HashMap::from([("x".to_string(), "old".to_string())]),
        )
        .await
        .unwrap();
    let latest = store
        .add_trace(
            &functions,
            &HashMap::from([("x".to_string(), "new".to_string())]),
        )
        .await
        .unwrap();

    let found = store.find_matching_trace(&functions).await.unwrap().unwrap();
    assert_eq!(found.id, latest);
    assert_eq!(found.explanations["x"], "new");
}

#[tokio::test]
async fn test_failed_write_leaves_memory_unchanged() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    let store = JsonKnowledgeStore::open(blocker.join("knowledge.json"))
        .await
        .unwrap();
    // A regular file where the parent directory should be
    std::fs::write(&blocker, "not a directory").unwrap();

    let functions = names(&["a", "b"]);
    assert!(store.add_trace(&functions, &HashMap::new()).await.is_err());
    assert!(store.save_project_overview("overview").await.is_err());

    assert!(store.find_matching_trace(&functions).await.unwrap().is_none());
    assert!(store.list_traces().await.unwrap().is_empty());
    assert!(store.project_overview().await.unwrap().is_none());

    std::fs::remove_file(&blocker).unwrap();
    let id = store.add_trace(&functions, &HashMap::new()).await.unwrap();
    assert_eq!(
        store.find_matching_trace(&functions).await.unwrap().unwrap().id,
        id
    );
    assert!(!blocker.join("knowledge.json.tmp").exists());
}

#[tokio::test]
async fn test_failed_rename_removes_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("knowledge.json");
    let store = JsonKnowledgeStore::open(&path).await.unwrap();
    // Renaming a file over a directory fails
    std::fs::create_dir(&path).unwrap();

    assert!(store.save_project_overview("overview").await.is_err());
    assert!(!path.with_extension("json.tmp").exists());
    assert!(store.project_overview().await.unwrap().is_none());
}
