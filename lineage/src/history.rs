
mod record;
pub use record::*;

pub mod store;
pub use store::{HistoryStore, MemoryStore, SpillStore};

use crate::identity::{ProcessIdentity, ProcessKey};
use crate::Result;

use std::collections::{HashMap, HashSet};

/// Durable process history plus the in-memory indices over the live processes.
pub struct ProcessTable<S> {
    store: S,
    active: HashMap<String, ProcessKey>,
    thread_groups: HashMap<String, HashSet<ProcessKey>>,
}

impl<S: HistoryStore> ProcessTable<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            active: HashMap::new(),
            thread_groups: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn active_key(&self, pid: &str) -> Option<&ProcessKey> {
        self.active.get(pid)
    }

    pub fn key_for(&self, identity: &ProcessIdentity) -> ProcessKey {
        ProcessKey::for_identity(identity, self.active.get(&identity.pid))
    }

    pub fn get(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.store.get(key)
    }

    /// The record of the process currently running as `pid`.
    pub fn active_record(&mut self, pid: &str) -> Result<Option<(ProcessKey, ProcessRecord)>> {
        let key = match self.active.get(pid) {
            Some(key) => key.clone(),
            None => return Ok(None),
        };
        Ok(self.store.get(&key)?.map(|record| (key, record)))
    }

    pub fn put(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        self.store.put(key, record)
    }

    /// Stores the record and makes it the active one for its pid.
    pub fn insert(&mut self, key: ProcessKey, record: ProcessRecord) -> Result<()> {
        self.active.insert(key.pid.clone(), key.clone());
        self.store.put(key, record)
    }

    pub fn remove(&mut self, key: &ProcessKey) -> Result<Option<ProcessRecord>> {
        self.store.remove(key)
    }

    pub fn deactivate(&mut self, pid: &str) -> Option<ProcessKey> {
        self.active.remove(pid)
    }

    pub fn is_active(&self, key: &ProcessKey) -> bool {
        self.active.get(&key.pid) == Some(key)
    }

    pub fn thread_group(&self, tgid: &str) -> Option<&HashSet<ProcessKey>> {
        self.thread_groups.get(tgid)
    }

    pub fn join_thread_group(&mut self, tgid: &str, key: ProcessKey) {
        self.thread_groups
            .entry(tgid.to_string())
            .or_insert_with(HashSet::new)
            .insert(key);
    }

    /// Returns whether the group still has members afterwards.
    pub fn leave_thread_group(&mut self, tgid: &str, key: &ProcessKey) -> bool {
        let empty = match self.thread_groups.get_mut(tgid) {
            Some(members) => {
                members.remove(key);
                members.is_empty()
            }
            None => return false,
        };
        if empty {
            self.thread_groups.remove(tgid);
        }
        !empty
    }

    pub fn take_thread_group(&mut self, tgid: &str) -> Option<HashSet<ProcessKey>> {
        self.thread_groups.remove(tgid)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.active.clear();
        self.thread_groups.clear();
        self.store.clear()
    }

    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }
}
