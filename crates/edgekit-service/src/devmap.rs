//! Concurrent in-memory device index.
//!
//! Devices are indexed by metadata id and by name. Lookups hand out
//! `Arc<Device>` handles: a handle held across a concurrent removal stays
//! valid, and the device (with its shared profile) is reclaimed only when
//! the last handle drops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use edgekit_core::Device;

#[derive(Default)]
struct Indexes {
    by_id: HashMap<String, Arc<Device>>,
    name_to_id: HashMap<String, String>,
}

/// Map of managed devices.
#[derive(Default)]
pub struct DeviceMap {
    inner: RwLock<Indexes>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a device, keyed by its metadata id.
    pub async fn insert(&self, device: Device) -> Arc<Device> {
        let device = Arc::new(device);
        let mut inner = self.inner.write().await;
        if let Some(old) = inner.by_id.insert(device.id.clone(), device.clone()) {
            if old.name != device.name {
                inner.name_to_id.remove(&old.name);
            }
        }
        inner
            .name_to_id
            .insert(device.name.clone(), device.id.clone());
        device
    }

    /// Remove a device by metadata id, returning the removed handle.
    pub async fn remove_by_id(&self, id: &str) -> Option<Arc<Device>> {
        let mut inner = self.inner.write().await;
        let device = inner.by_id.remove(id)?;
        inner.name_to_id.remove(&device.name);
        Some(device)
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Arc<Device>> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Arc<Device>> {
        let inner = self.inner.read().await;
        let id = inner.name_to_id.get(name)?;
        inner.by_id.get(id).cloned()
    }

    /// Bulk-insert devices fetched from metadata. Returns how many entered
    /// the map.
    pub async fn populate(&self, devices: Vec<Device>) -> usize {
        let mut count = 0;
        for device in devices {
            self.insert(device).await;
            count += 1;
        }
        count
    }

    /// A point-in-time list of handles to every mapped device.
    pub async fn snapshot(&self) -> Vec<Arc<Device>> {
        self.inner.read().await.by_id.values().cloned().collect()
    }

    /// Drop every entry. Held handles stay valid until released.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.by_id.clear();
        inner.name_to_id.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::DeviceProfile;

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            admin_state: Default::default(),
            operating_state: Default::default(),
            labels: Vec::new(),
            protocols: Default::default(),
            auto_events: Vec::new(),
            profile: Arc::new(DeviceProfile {
                name: "Counter".into(),
                ..Default::default()
            }),
        }
    }

    #[tokio::test]
    async fn lookup_by_both_keys() {
        let map = DeviceMap::new();
        map.insert(device("d1", "Counter01")).await;
        assert!(map.get_by_id("d1").await.is_some());
        assert!(map.get_by_name("Counter01").await.is_some());
        assert!(map.get_by_name("d1").await.is_none());
    }

    #[tokio::test]
    async fn handle_survives_removal() {
        let map = DeviceMap::new();
        map.insert(device("d1", "Counter01")).await;

        let handle = map.get_by_name("Counter01").await.unwrap();
        let removed = map.remove_by_id("d1").await.unwrap();

        assert!(map.get_by_name("Counter01").await.is_none());
        assert_eq!(handle.name, "Counter01");
        assert_eq!(handle.profile.name, "Counter");
        drop(removed);
        assert_eq!(handle.id, "d1");
    }

    #[tokio::test]
    async fn populate_matches_input_exactly() {
        let map = DeviceMap::new();
        let count = map
            .populate(vec![device("d1", "a"), device("d2", "b")])
            .await;
        assert_eq!(count, 2);
        assert_eq!(map.len().await, 2);
        let mut names: Vec<_> = map
            .snapshot()
            .await
            .into_iter()
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn replace_updates_name_index() {
        let map = DeviceMap::new();
        map.insert(device("d1", "old")).await;
        map.insert(device("d1", "new")).await;
        assert!(map.get_by_name("old").await.is_none());
        assert!(map.get_by_name("new").await.is_some());
        assert_eq!(map.len().await, 1);
    }

    #[tokio::test]
    async fn clear_empties_the_map() {
        let map = DeviceMap::new();
        map.insert(device("d1", "a")).await;
        let handle = map.get_by_id("d1").await.unwrap();
        map.clear().await;
        assert!(map.is_empty().await);
        assert_eq!(handle.name, "a");
    }
}
