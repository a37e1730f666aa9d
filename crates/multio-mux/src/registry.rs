use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::handoff::Handoff;

/// Map from stream identifier to its handoff queue, created lazily.
///
/// Lookups take the read lock; creation re-checks under the write lock so
/// concurrent first references to an id agree on one queue. Once
/// [`seal`](Registry::seal)ed, the registry hands out closed queues and
/// stores nothing.
pub struct Registry {
    name: &'static str,
    lanes: RwLock<Lanes>,
}

#[derive(Default)]
struct Lanes {
    map: HashMap<u32, Arc<Handoff>>,
    sealed: bool,
}

impl Registry {
    /// `name` labels the registry in log events (`data`, `ack`).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lanes: RwLock::new(Lanes::default()),
        }
    }

    /// The queue for `id`, creating it if needed. Closed if the registry is
    /// sealed.
    pub fn get_or_create(&self, id: u32) -> Arc<Handoff> {
        if let Some(lane) = self.get(id) {
            return lane;
        }

        let mut lanes = self.write();
        if lanes.sealed {
            return Arc::new(Handoff::closed());
        }
        Arc::clone(lanes.map.entry(id).or_insert_with(|| {
            trace!(registry = self.name, stream_id = id, "lane created");
            Arc::new(Handoff::new())
        }))
    }

    /// Make sure `id` has a queue. Returns `true` if this call created it.
    pub fn create_if_absent(&self, id: u32) -> bool {
        if self.contains(id) {
            return false;
        }

        let mut lanes = self.write();
        if lanes.sealed || lanes.map.contains_key(&id) {
            return false;
        }
        lanes.map.insert(id, Arc::new(Handoff::new()));
        trace!(registry = self.name, stream_id = id, "lane created");
        true
    }

    pub fn get(&self, id: u32) -> Option<Arc<Handoff>> {
        self.read().map.get(&id).cloned()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.read().map.contains_key(&id)
    }

    /// Remove `id`'s entry. The queue itself is left open.
    pub fn remove(&self, id: u32) -> Option<Arc<Handoff>> {
        self.write().map.remove(&id)
    }

    /// Remove every entry.
    pub fn drain(&self) -> Vec<(u32, Arc<Handoff>)> {
        self.write().map.drain().collect()
    }

    /// Remove every entry and refuse to create new ones.
    pub fn seal(&self) -> Vec<(u32, Arc<Handoff>)> {
        let mut lanes = self.write();
        lanes.sealed = true;
        lanes.map.drain().collect()
    }

    pub fn is_sealed(&self) -> bool {
        self.read().sealed
    }

    /// Identifiers with a live entry, unordered.
    pub fn ids(&self) -> Vec<u32> {
        self.read().map.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, Lanes> {
        self.lanes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Lanes> {
        self.lanes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("lanes", &self.len())
            .finish()
    }
}
