//! Provision watcher collection.

use std::collections::HashMap;

use tokio::sync::RwLock;

use edgekit_core::ProvisionWatcher;

/// Watchers fetched from metadata, deduplicated by id.
#[derive(Default)]
pub struct WatchList {
    inner: RwLock<HashMap<String, ProvisionWatcher>>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge watchers into the list. Returns how many were newly added;
    /// watchers already present (by id) are left untouched.
    pub async fn populate(&self, watchers: Vec<ProvisionWatcher>) -> usize {
        let mut inner = self.inner.write().await;
        let mut added = 0;
        for watcher in watchers {
            let key = if watcher.id.is_empty() {
                watcher.name.clone()
            } else {
                watcher.id.clone()
            };
            if let std::collections::hash_map::Entry::Vacant(entry) = inner.entry(key) {
                entry.insert(watcher);
                added += 1;
            }
        }
        added
    }

    pub async fn snapshot(&self) -> Vec<ProvisionWatcher> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watcher(id: &str, name: &str) -> ProvisionWatcher {
        ProvisionWatcher {
            id: id.into(),
            name: name.into(),
            profile_name: "Counter".into(),
            identifiers: Default::default(),
            blocking: false,
        }
    }

    #[tokio::test]
    async fn populate_deduplicates_by_id() {
        let list = WatchList::new();
        assert_eq!(
            list.populate(vec![watcher("w1", "a"), watcher("w2", "b")]).await,
            2
        );
        assert_eq!(
            list.populate(vec![watcher("w1", "a"), watcher("w3", "c")]).await,
            1
        );
        assert_eq!(list.len().await, 3);
    }
}
