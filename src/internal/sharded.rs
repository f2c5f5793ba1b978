//! Sharded concurrent maps keyed by reference identity.
//!
//! Both shared mutable structures in this crate (the descriptor/gate caches
//! and the pending-local table) shard their entries across independent
//! `RwLock`ed maps so unrelated identities never contend on one lock. The
//! once-map additionally holds an `Arc<OnceCell>` per entry, cloned out and
//! initialized after the shard lock is dropped, so exactly one initializer
//! succeeds per key while the factory runs without holding any lock.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::identity::ReferenceIdentity;

#[cfg(feature = "ahash")]
type Shard<V> = HashMap<ReferenceIdentity, V, ahash::RandomState>;
#[cfg(not(feature = "ahash"))]
type Shard<V> = HashMap<ReferenceIdentity, V>;

/// Powers of 2 distribute identity hashes best.
const SHARD_COUNT: usize = 16;

fn shard_index(identity: &ReferenceIdentity) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    identity.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

/// Sharded map with exactly-once initialization per key.
pub(crate) struct ShardedOnceMap<V: Clone> {
    shards: Box<[RwLock<Shard<Arc<OnceCell<V>>>>]>,
}

impl<V: Clone> ShardedOnceMap<V> {
    pub(crate) fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    /// Returns the initialized value for `identity`, if any.
    pub(crate) fn get(&self, identity: &ReferenceIdentity) -> Option<V> {
        let shard = &self.shards[shard_index(identity)];
        let guard = shard.read().unwrap();
        guard.get(identity).and_then(|cell| cell.get().cloned())
    }

    /// Returns the value for `identity`, initializing it through `init` if
    /// absent.
    ///
    /// The boolean is true when this call ran the initializer. Concurrent
    /// callers for the same identity serialize on the entry's cell, never on
    /// the shard lock; a failed `init` leaves the cell empty so a later call
    /// retries.
    pub(crate) fn get_or_try_init<E, F>(
        &self,
        identity: &ReferenceIdentity,
        init: F,
    ) -> Result<(V, bool), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let shard = &self.shards[shard_index(identity)];

        let cell = {
            let guard = shard.read().unwrap();
            guard.get(identity).cloned()
        };
        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut guard = shard.write().unwrap();
                guard
                    .entry(identity.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        // Initialize outside the shard lock.
        let mut ran = false;
        let value = cell
            .get_or_try_init(|| {
                ran = true;
                init()
            })?
            .clone();
        Ok((value, ran))
    }

    /// Number of initialized entries.
    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let guard = shard.read().unwrap();
                guard.values().filter(|cell| cell.get().is_some()).count()
            })
            .sum()
    }

    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().unwrap().clear();
        }
    }
}

/// Sharded insert/remove table without once semantics.
pub(crate) struct ShardedTable<V: Clone> {
    shards: Box<[RwLock<Shard<V>>]>,
}

impl<V: Clone> ShardedTable<V> {
    pub(crate) fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    /// Inserts `value` under `identity`, returning any replaced entry.
    pub(crate) fn insert(&self, identity: ReferenceIdentity, value: V) -> Option<V> {
        let shard = &self.shards[shard_index(&identity)];
        shard.write().unwrap().insert(identity, value)
    }

    /// Removes and returns the entry for `identity`.
    pub(crate) fn remove(&self, identity: &ReferenceIdentity) -> Option<V> {
        let shard = &self.shards[shard_index(identity)];
        shard.write().unwrap().remove(identity)
    }

    pub(crate) fn contains(&self, identity: &ReferenceIdentity) -> bool {
        let shard = &self.shards[shard_index(identity)];
        shard.read().unwrap().contains_key(identity)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap().len())
            .sum()
    }

    pub(crate) fn clear(&self) {
        for shard in self.shards.iter() {
            shard.write().unwrap().clear();
        }
    }
}
