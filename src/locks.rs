//! Per-resource mutual exclusion
//!
//! Backup and restore operations that touch the same archive or the same live
//! component must not overlap. Each operation acquires every lock it needs up
//! front, in sorted key order, so two operations can never wait on each other
//! in a cycle. Operations on disjoint resources run concurrently. A key's
//! mutex is dropped from the registry once no lock set holds or awaits it.
//!
//! Lock keys used by the managers:
//!
//! - `archive:<name>` while a backup with that name is being written
//! - `backup:<id>` while a backup is deleted or read for restore
//! - `live:<component>` while a component is captured or overwritten
//! - `restore:<id>` while a restore record is rolled back

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::ComponentKind;

/// Key for an archive name being written
pub fn archive_key(name: &str) -> String {
    format!("archive:{}", name)
}

/// Key for an existing backup
pub fn backup_key(id: &str) -> String {
    format!("backup:{}", id)
}

/// Key for a live component
pub fn live_key(kind: ComponentKind) -> String {
    format!("live:{}", kind)
}

/// Key for a restore record
pub fn restore_key(id: &str) -> String {
    format!("restore:{}", id)
}

type Registry = DashMap<String, Arc<Mutex<()>>>;

/// Registry of named async mutexes
#[derive(Debug, Default)]
pub struct ResourceLocks {
    locks: Arc<Registry>,
}

/// Guards held for the duration of one operation
///
/// Dropping the set releases every lock it holds.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
    registry: Arc<Registry>,
}

impl LockSet {
    fn new(keys: Vec<String>, registry: Arc<Registry>) -> Self {
        Self {
            guards: Vec::with_capacity(keys.len()),
            keys,
            registry,
        }
    }

    /// Keys held by this set, in acquisition order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.guards.clear();

        // The registry's own Arc is the last one when nobody holds or awaits the key
        for key in &self.keys {
            self.registry
                .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently registered
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn mutex_for(&self, key: &str) -> Arc<Mutex<()>> {
        // Clone the Arc out so the shard lock is not held across an await
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Acquire every key, waiting for conflicting operations to finish
    ///
    /// Duplicate keys are acquired once.
    pub async fn acquire<I, S>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut set = LockSet::new(sorted.into_iter().collect(), Arc::clone(&self.locks));

        for i in 0..set.keys.len() {
            let mutex = self.mutex_for(&set.keys[i]);
            tracing::trace!(lock = %set.keys[i], "Acquiring lock");
            set.guards.push(mutex.lock_owned().await);
        }

        set
    }

    /// Try to acquire every key without waiting
    ///
    /// Returns `None` if any key is currently held.
    pub fn try_acquire<I, S>(&self, keys: I) -> Option<LockSet>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        let mut set = LockSet::new(sorted.into_iter().collect(), Arc::clone(&self.locks));

        // On failure the partial set is dropped, releasing what it took
        for i in 0..set.keys.len() {
            let guard = self.mutex_for(&set.keys[i]).try_lock_owned().ok()?;
            set.guards.push(guard);
        }

        Some(set)
    }
}
