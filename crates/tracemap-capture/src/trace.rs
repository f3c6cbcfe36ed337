use std::collections::HashSet;

/// Distinct function names in order of first observation
#[derive(Debug, Clone, Default)]
pub struct FunctionTrace {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl FunctionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `name` unless it was already observed. Returns true when appended.
    pub fn observe(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.order.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn functions(&self) -> &[String] {
        &self.order
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}
