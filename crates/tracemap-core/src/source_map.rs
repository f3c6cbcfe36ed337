// ABOUTME: Shared map from function name to the file it was first observed executing in
// ABOUTME: Written by the capture engine, read by the source locator to bias lookups

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Function name -> source path, first writer wins.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct FunctionSourceMap {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl FunctionSourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `path` for `function` unless a path is already known.
    /// Returns true when the entry was inserted.
    pub fn record(&self, function: &str, path: &str) -> bool {
        if self.inner.read().contains_key(function) {
            return false;
        }
        let mut map = self.inner.write();
        if map.contains_key(function) {
            return false;
        }
        map.insert(function.to_string(), path.to_string());
        true
    }

    pub fn get(&self, function: &str) -> Option<String> {
        self.inner.read().get(function).cloned()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let map = FunctionSourceMap::new();
        assert!(map.record("handle", "/proj/a.py"));
        assert!(!map.record("handle", "/proj/b.py"));
        assert_eq!(map.get("handle").as_deref(), Some("/proj/a.py"));
    }

    #[test]
    fn test_clones_share_state() {
        let map = FunctionSourceMap::new();
        let reader = map.clone();
        map.record("parse", "/proj/parse.py");
        assert_eq!(reader.len(), 1);
        reader.clear();
        assert!(map.is_empty());
    }
}
