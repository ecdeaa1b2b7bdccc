//! Per-analysis in-process memoization map: scoped to a single tracing
//! request, never evicts, eliminates duplicate fetches within one BFS.
//! Never shared across analyses.

use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Default)]
pub struct Memo {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl Memo {
    pub fn new() -> Self {
        Memo {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().await.get(key).cloned()
    }

    pub async fn put(&self, key: String, value: Vec<u8>) {
        self.inner.lock().await.insert(key, value);
    }
}
