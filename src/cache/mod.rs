use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Tags found by one successful scan of an image location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub canonical_image_name: String,
    /// Sorted, de-duplicated
    pub tags: Vec<String>,
    pub tag_count: usize,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(canonical_image_name: impl Into<String>, tags: impl IntoIterator<Item = String>) -> Self {
        let mut tags: Vec<String> = tags.into_iter().collect();
        tags.sort();
        tags.dedup();

        Self {
            canonical_image_name: canonical_image_name.into(),
            tag_count: tags.len(),
            tags,
            scanned_at: Utc::now(),
        }
    }
}

/// Latest scan per canonical image location.
///
/// Cloning the handle shares the underlying map. Entries are replaced
/// wholesale, so a reader holds either the previous or the new snapshot.
#[derive(Clone, Default)]
pub struct ScanCache {
    entries: Arc<RwLock<HashMap<String, Arc<ScanResult>>>>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, result: ScanResult) {
        debug!(
            "Caching {} tags for {}",
            result.tag_count, result.canonical_image_name
        );
        let mut entries = self.entries.write().await;
        entries.insert(result.canonical_image_name.clone(), Arc::new(result));
    }

    pub async fn get(&self, canonical_image_name: &str) -> Option<Arc<ScanResult>> {
        let entries = self.entries.read().await;
        entries.get(canonical_image_name).cloned()
    }

    pub async fn remove(&self, canonical_image_name: &str) -> Option<Arc<ScanResult>> {
        let mut entries = self.entries.write().await;
        entries.remove(canonical_image_name)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
