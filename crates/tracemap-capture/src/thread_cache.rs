use crate::session::ThreadDescriptor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct ThreadSnapshot {
    threads: Arc<Vec<ThreadDescriptor>>,
    captured_at: Instant,
}

/// Recently enumerated thread list, reusable for `ttl`
#[derive(Debug)]
pub struct ThreadCache {
    ttl: Duration,
    snapshot: Mutex<Option<ThreadSnapshot>>,
}

impl ThreadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    /// Cached threads if younger than the ttl
    pub fn fresh(&self) -> Option<Arc<Vec<ThreadDescriptor>>> {
        let snapshot = self.snapshot.lock();
        snapshot
            .as_ref()
            .filter(|s| s.captured_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.threads))
    }

    pub fn store(&self, threads: Vec<ThreadDescriptor>) -> Arc<Vec<ThreadDescriptor>> {
        let threads = Arc::new(threads);
        *self.snapshot.lock() = Some(ThreadSnapshot {
            threads: Arc::clone(&threads),
            captured_at: Instant::now(),
        });
        threads
    }

    pub fn clear(&self) {
        *self.snapshot.lock() = None;
    }
}
